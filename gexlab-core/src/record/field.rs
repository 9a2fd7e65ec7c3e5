//! Typed leaf wrapper with explicit missing state.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::validity::{is_valid, is_valid_number, NUMERIC_SENTINEL, TEXT_SENTINEL};

/// A single record leaf: either observed or not yet observed.
///
/// Serializes `Missing` back to the sentinel external producers understand
/// (`-999` for numbers, `"N/A"` for everything else).
#[derive(Debug, Clone, PartialEq)]
pub enum Field<T> {
    Missing,
    Valid(T),
}

// Manual impl: a missing leaf needs no `T: Default`.
impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

impl<T> Field<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Field::Valid(_))
    }

    pub fn valid(&self) -> Option<&T> {
        match self {
            Field::Valid(v) => Some(v),
            Field::Missing => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Field<U> {
        match self {
            Field::Valid(v) => Field::Valid(f(v)),
            Field::Missing => Field::Missing,
        }
    }
}

impl<T: Copy> Field<T> {
    pub fn get(&self) -> Option<T> {
        self.valid().copied()
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Valid(v),
            None => Field::Missing,
        }
    }
}

/// A value that can sit inside a [`Field`].
pub trait Leaf: Sized + Clone + PartialEq {
    /// JSON written in place of a missing value.
    fn sentinel() -> Value;

    /// Parses a non-sentinel JSON value.
    fn from_json(value: &Value) -> Result<Self, String>;

    fn to_json(&self) -> Value;

    /// Whether a parsed value is a real measurement. Catches sentinels that
    /// only show up after parsing, like a quoted `"-999"`.
    fn is_measurement(&self) -> bool {
        true
    }
}

impl<T: Leaf> Field<T> {
    /// Sentinels become `Missing`; anything else must parse as `T`.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        if !is_valid(value) {
            return Ok(Field::Missing);
        }
        let parsed = T::from_json(value)?;
        Ok(if parsed.is_measurement() {
            Field::Valid(parsed)
        } else {
            Field::Missing
        })
    }

    pub fn to_json(&self) -> Value {
        match self {
            Field::Valid(v) => v.to_json(),
            Field::Missing => T::sentinel(),
        }
    }
}

impl<T: Leaf> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de, T: Leaf> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Field::from_json(&value).map_err(de::Error::custom)
    }
}

impl<T: fmt::Display> fmt::Display for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Valid(v) => write!(f, "{v}"),
            Field::Missing => write!(f, "{TEXT_SENTINEL}"),
        }
    }
}

// ── Scalar leaves ───────────────────────────────────────────────────

impl Leaf for f64 {
    fn sentinel() -> Value {
        json!(NUMERIC_SENTINEL)
    }

    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Number(n) => n.as_f64().ok_or_else(|| format!("number {n} out of range")),
            // Extractors sometimes quote numbers ("5805.2").
            Value::String(s) => s
                .trim()
                .trim_start_matches('$')
                .replace(',', "")
                .parse::<f64>()
                .map_err(|_| format!("expected a number, got \"{s}\"")),
            other => Err(format!("expected a number, got {other}")),
        }
    }

    fn to_json(&self) -> Value {
        json!(self)
    }

    fn is_measurement(&self) -> bool {
        is_valid_number(*self)
    }
}

impl Leaf for bool {
    fn sentinel() -> Value {
        json!(TEXT_SENTINEL)
    }

    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" => Ok(true),
                "false" | "no" => Ok(false),
                _ => Err(format!("expected a boolean, got \"{s}\"")),
            },
            other => Err(format!("expected a boolean, got {other}")),
        }
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

impl Leaf for String {
    fn sentinel() -> Value {
        json!(TEXT_SENTINEL)
    }

    fn from_json(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(s) => Ok(s.trim().to_string()),
            other => Err(format!("expected a string, got {other}")),
        }
    }

    fn to_json(&self) -> Value {
        json!(self)
    }
}

/// Declares a closed categorical leaf.
///
/// The first token of each variant is its canonical spelling (also used by
/// serde); the rest are accepted aliases. Matching is case-insensitive.
macro_rules! categorical {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $canon:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $canon)] $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $canon, )+
                }
            }

            pub fn parse(token: &str) -> Option<Self> {
                let lowered = token.trim().to_ascii_lowercase();
                match lowered.as_str() {
                    $( $canon $(| $alias)* => Some($name::$variant), )+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl $crate::record::field::Leaf for $name {
            fn sentinel() -> serde_json::Value {
                serde_json::json!($crate::validity::TEXT_SENTINEL)
            }

            fn from_json(value: &serde_json::Value) -> Result<Self, String> {
                match value {
                    serde_json::Value::String(s) => $name::parse(s).ok_or_else(|| {
                        format!(
                            "unknown {} \"{}\" (expected one of: {})",
                            stringify!($name),
                            s,
                            [$($canon),+].join(", ")
                        )
                    }),
                    other => Err(format!("expected a {} string, got {}", stringify!($name), other)),
                }
            }

            fn to_json(&self) -> serde_json::Value {
                serde_json::json!(self.as_str())
            }
        }
    };
}

pub(crate) use categorical;
