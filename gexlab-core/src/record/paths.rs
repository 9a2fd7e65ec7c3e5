//! The 22 canonical leaves that decide readiness.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::TargetRecord;

/// A required leaf of the target record, addressed by its dotted path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    SpotPrice,
    Em1Dollar,
    CallWall,
    PutWall,
    MajorWall,
    MajorWallType,
    GapDistanceDollar,
    GapDistanceEm1Multiple,
    ClusterStrengthRatio,
    NetGex,
    NetGexSign,
    VolTrigger,
    SpotVsTrigger,
    MonthlyClusterOverride,
    DexSameDirPct,
    VannaDir,
    VannaConfidence,
    IvPath,
    IvPathConfidence,
    Iv7d,
    Iv14d,
    IvSource,
}

pub const REQUIRED_FIELD_COUNT: usize = 22;

impl CanonicalField {
    pub const ALL: [CanonicalField; REQUIRED_FIELD_COUNT] = [
        CanonicalField::SpotPrice,
        CanonicalField::Em1Dollar,
        CanonicalField::CallWall,
        CanonicalField::PutWall,
        CanonicalField::MajorWall,
        CanonicalField::MajorWallType,
        CanonicalField::GapDistanceDollar,
        CanonicalField::GapDistanceEm1Multiple,
        CanonicalField::ClusterStrengthRatio,
        CanonicalField::NetGex,
        CanonicalField::NetGexSign,
        CanonicalField::VolTrigger,
        CanonicalField::SpotVsTrigger,
        CanonicalField::MonthlyClusterOverride,
        CanonicalField::DexSameDirPct,
        CanonicalField::VannaDir,
        CanonicalField::VannaConfidence,
        CanonicalField::IvPath,
        CanonicalField::IvPathConfidence,
        CanonicalField::Iv7d,
        CanonicalField::Iv14d,
        CanonicalField::IvSource,
    ];

    pub fn path(self) -> &'static str {
        match self {
            CanonicalField::SpotPrice => "spot_price",
            CanonicalField::Em1Dollar => "em1_dollar",
            CanonicalField::CallWall => "walls.call_wall",
            CanonicalField::PutWall => "walls.put_wall",
            CanonicalField::MajorWall => "walls.major_wall",
            CanonicalField::MajorWallType => "walls.major_wall_type",
            CanonicalField::GapDistanceDollar => "gamma_metrics.gap_distance_dollar",
            CanonicalField::GapDistanceEm1Multiple => "gamma_metrics.gap_distance_em1_multiple",
            CanonicalField::ClusterStrengthRatio => "gamma_metrics.cluster_strength_ratio",
            CanonicalField::NetGex => "gamma_metrics.net_gex",
            CanonicalField::NetGexSign => "gamma_metrics.net_gex_sign",
            CanonicalField::VolTrigger => "gamma_metrics.vol_trigger",
            CanonicalField::SpotVsTrigger => "gamma_metrics.spot_vs_trigger",
            CanonicalField::MonthlyClusterOverride => "gamma_metrics.monthly_cluster_override",
            CanonicalField::DexSameDirPct => "directional_metrics.dex_same_dir_pct",
            CanonicalField::VannaDir => "directional_metrics.vanna_dir",
            CanonicalField::VannaConfidence => "directional_metrics.vanna_confidence",
            CanonicalField::IvPath => "directional_metrics.iv_path",
            CanonicalField::IvPathConfidence => "directional_metrics.iv_path_confidence",
            CanonicalField::Iv7d => "atm_iv.iv_7d",
            CanonicalField::Iv14d => "atm_iv.iv_14d",
            CanonicalField::IvSource => "atm_iv.iv_source",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.path() == path)
    }

    /// Whether `record` holds a valid measurement for this leaf.
    pub fn is_present(self, record: &TargetRecord) -> bool {
        let (w, g, d, iv) = (
            &record.walls,
            &record.gamma_metrics,
            &record.directional_metrics,
            &record.atm_iv,
        );
        match self {
            CanonicalField::SpotPrice => record.spot_price.is_valid(),
            CanonicalField::Em1Dollar => record.em1_dollar.is_valid(),
            CanonicalField::CallWall => w.call_wall.is_valid(),
            CanonicalField::PutWall => w.put_wall.is_valid(),
            CanonicalField::MajorWall => w.major_wall.is_valid(),
            CanonicalField::MajorWallType => w.major_wall_type.is_valid(),
            CanonicalField::GapDistanceDollar => g.gap_distance_dollar.is_valid(),
            CanonicalField::GapDistanceEm1Multiple => g.gap_distance_em1_multiple.is_valid(),
            CanonicalField::ClusterStrengthRatio => g.cluster_strength_ratio.is_valid(),
            CanonicalField::NetGex => g.net_gex.is_valid(),
            CanonicalField::NetGexSign => g.net_gex_sign.is_valid(),
            CanonicalField::VolTrigger => g.vol_trigger.is_valid(),
            CanonicalField::SpotVsTrigger => g.spot_vs_trigger.is_valid(),
            CanonicalField::MonthlyClusterOverride => g.monthly_cluster_override.is_valid(),
            CanonicalField::DexSameDirPct => d.dex_same_dir_pct.is_valid(),
            CanonicalField::VannaDir => d.vanna_dir.is_valid(),
            CanonicalField::VannaConfidence => d.vanna_confidence.is_valid(),
            CanonicalField::IvPath => d.iv_path.is_valid(),
            CanonicalField::IvPathConfidence => d.iv_path_confidence.is_valid(),
            CanonicalField::Iv7d => iv.iv_7d.is_valid(),
            CanonicalField::Iv14d => iv.iv_14d.is_valid(),
            CanonicalField::IvSource => iv.iv_source.is_valid(),
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn paths_are_unique_and_resolvable() {
        let paths: HashSet<_> = CanonicalField::ALL.iter().map(|f| f.path()).collect();
        assert_eq!(paths.len(), REQUIRED_FIELD_COUNT);
        for field in CanonicalField::ALL {
            assert_eq!(CanonicalField::from_path(field.path()), Some(field));
        }
    }

    #[test]
    fn every_path_is_addressable_on_a_record() {
        let record = TargetRecord::default();
        for field in CanonicalField::ALL {
            assert!(record.get(field.path()).is_ok(), "{field} not addressable");
        }
    }
}
