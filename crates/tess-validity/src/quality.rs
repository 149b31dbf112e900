use serde::{Deserialize, Serialize};
use tess_schemas::ZP_SCALE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZpQuality {
    /// Far below any real calibration; typically a firmware regeneration artefact.
    Absurd,
    Plausible,
    Suspicious,
}

impl ZpQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZpQuality::Absurd => "absurd",
            ZpQuality::Plausible => "plausible",
            ZpQuality::Suspicious => "suspicious",
        }
    }
}

/// Thresholds in thousandths of a magnitude.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZpQualityBands {
    pub absurd_below: i64,
    pub plausible_min: i64,
    pub plausible_max: i64,
}

impl Default for ZpQualityBands {
    fn default() -> Self {
        Self {
            absurd_below: 10 * ZP_SCALE,
            plausible_min: 18 * ZP_SCALE + 500,
            plausible_max: 20 * ZP_SCALE + 500,
        }
    }
}

pub fn zero_point_quality(bands: &ZpQualityBands, zp_milli: i64) -> ZpQuality {
    if zp_milli < bands.absurd_below {
        ZpQuality::Absurd
    } else if zp_milli >= bands.plausible_min && zp_milli <= bands.plausible_max {
        ZpQuality::Plausible
    } else {
        ZpQuality::Suspicious
    }
}
