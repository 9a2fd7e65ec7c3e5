//! Strategy archetypes and their strike ladders.
//!
//! Strikes come from fixed EM-unit offsets off spot or the nearest wall;
//! there is no search.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calc::round_to;
use crate::config::StrikeOffsets;
use crate::record::TargetRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    IronCondor,
    IronButterfly,
    BullCallSpread,
    BearPutSpread,
    LongCall,
    LongPut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Conservative,
    Balanced,
    Aggressive,
}

/// How a structure is priced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pricing {
    /// Net premium received; short vega.
    Credit,
    /// Net premium paid for a spread; long vega.
    DebitSpread,
    /// Outright option purchase.
    SingleLeg,
}

impl Archetype {
    pub const ALL: [Archetype; 6] = [
        Archetype::IronCondor,
        Archetype::IronButterfly,
        Archetype::BullCallSpread,
        Archetype::BearPutSpread,
        Archetype::LongCall,
        Archetype::LongPut,
    ];

    pub fn tier(self) -> RiskTier {
        match self {
            Archetype::IronCondor | Archetype::IronButterfly => RiskTier::Conservative,
            Archetype::BullCallSpread | Archetype::BearPutSpread => RiskTier::Balanced,
            Archetype::LongCall | Archetype::LongPut => RiskTier::Aggressive,
        }
    }

    pub fn pricing(self) -> Pricing {
        match self {
            Archetype::IronCondor | Archetype::IronButterfly => Pricing::Credit,
            Archetype::BullCallSpread | Archetype::BearPutSpread => Pricing::DebitSpread,
            Archetype::LongCall | Archetype::LongPut => Pricing::SingleLeg,
        }
    }

    /// Bets on a direction rather than on a range.
    pub fn is_directional(self) -> bool {
        !matches!(self, Archetype::IronCondor | Archetype::IronButterfly)
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, Archetype::BullCallSpread | Archetype::LongCall)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, Archetype::BearPutSpread | Archetype::LongPut)
    }

    pub fn name(self) -> &'static str {
        match self {
            Archetype::IronCondor => "iron condor",
            Archetype::IronButterfly => "iron butterfly",
            Archetype::BullCallSpread => "bull call spread",
            Archetype::BearPutSpread => "bear put spread",
            Archetype::LongCall => "long call",
            Archetype::LongPut => "long put",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionType {
    Call,
    Put,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub side: Side,
    pub option_type: OptionType,
    pub strike: f64,
    pub rationale: String,
}

impl Leg {
    fn new(side: Side, option_type: OptionType, strike: f64, rationale: impl Into<String>) -> Self {
        Self {
            side,
            option_type,
            strike: round_to(strike, 2),
            rationale: rationale.into(),
        }
    }
}

/// Legs plus the dollar width used for pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    pub legs: Vec<Leg>,
    pub width: f64,
    /// Wall a single-leg position targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<f64>,
}

/// Spot, expected move and the wall levels a ladder is built from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Anchors {
    pub spot: f64,
    pub em1: f64,
    pub call_wall: f64,
    pub put_wall: f64,
    pub major_wall: Option<f64>,
}

impl Anchors {
    /// `None` without spot or expected move. Missing walls fall back to a
    /// fixed percentage around spot.
    pub fn from_record(record: &TargetRecord, offsets: &StrikeOffsets) -> Option<Self> {
        let spot = record.spot_price.get()?;
        let em1 = record.em1_dollar.get()?;
        let w = &record.walls;
        Some(Self {
            spot,
            em1,
            call_wall: w.call_wall.get().unwrap_or(spot * (1.0 + offsets.wall_fallback_pct)),
            put_wall: w.put_wall.get().unwrap_or(spot * (1.0 - offsets.wall_fallback_pct)),
            major_wall: w.major_wall.get(),
        })
    }
}

/// Builds the ladder for `archetype`; `Err` when the walls leave no room.
pub fn ladder(archetype: Archetype, a: &Anchors, o: &StrikeOffsets) -> Result<Ladder, String> {
    use OptionType::{Call, Put};
    use Side::{Buy, Sell};

    let em = a.em1;
    let ladder = match archetype {
        Archetype::IronCondor => {
            let wing = o.conservative_long * em;
            Ladder {
                legs: vec![
                    Leg::new(Sell, Call, a.call_wall, "short call at call wall"),
                    Leg::new(Buy, Call, a.call_wall + wing, format!("wing +{} EM", o.conservative_long)),
                    Leg::new(Sell, Put, a.put_wall, "short put at put wall"),
                    Leg::new(Buy, Put, a.put_wall - wing, format!("wing -{} EM", o.conservative_long)),
                ],
                width: wing,
                target: None,
            }
        }
        Archetype::IronButterfly => {
            let (body, anchor) = match a.major_wall {
                Some(w) => (w, "major wall"),
                None => (a.spot, "spot"),
            };
            let wing = o.balanced_wing * em;
            Ladder {
                legs: vec![
                    Leg::new(Sell, Call, body, format!("body at {anchor}")),
                    Leg::new(Sell, Put, body, format!("body at {anchor}")),
                    Leg::new(Buy, Call, body + wing, format!("wing +{} EM", o.balanced_wing)),
                    Leg::new(Buy, Put, body - wing, format!("wing -{} EM", o.balanced_wing)),
                ],
                width: wing,
                target: None,
            }
        }
        Archetype::BullCallSpread => {
            let long = a.spot + o.aggressive_long * em;
            let width = a.call_wall - long;
            if width <= 0.0 {
                return Err(format!("call wall {:.2} is not above long strike {long:.2}", a.call_wall));
            }
            Ladder {
                legs: vec![
                    Leg::new(Buy, Call, long, format!("spot +{} EM", o.aggressive_long)),
                    Leg::new(Sell, Call, a.call_wall, "short call at call wall"),
                ],
                width,
                target: Some(a.call_wall),
            }
        }
        Archetype::BearPutSpread => {
            let long = a.spot - o.aggressive_long * em;
            let width = long - a.put_wall;
            if width <= 0.0 {
                return Err(format!("put wall {:.2} is not below long strike {long:.2}", a.put_wall));
            }
            Ladder {
                legs: vec![
                    Leg::new(Buy, Put, long, format!("spot -{} EM", o.aggressive_long)),
                    Leg::new(Sell, Put, a.put_wall, "short put at put wall"),
                ],
                width,
                target: Some(a.put_wall),
            }
        }
        Archetype::LongCall => Ladder {
            legs: vec![Leg::new(
                Buy,
                Call,
                a.spot + o.aggressive_long * em,
                format!("spot +{} EM", o.aggressive_long),
            )],
            width: 0.0,
            target: Some(a.call_wall),
        },
        Archetype::LongPut => Ladder {
            legs: vec![Leg::new(
                Buy,
                Put,
                a.spot - o.aggressive_long * em,
                format!("spot -{} EM", o.aggressive_long),
            )],
            width: 0.0,
            target: Some(a.put_wall),
        },
    };
    Ok(ladder)
}
