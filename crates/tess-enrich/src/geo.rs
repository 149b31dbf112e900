use std::fmt;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tess_schemas::TemporalError;

/// Mean Earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_009.0;

/// Two sites closer than this are the same site with retyped coordinates.
pub const NEARBY_DISTANCE_M: f64 = 200.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, TemporalError> {
        if !(-180.0..=180.0).contains(&longitude) || !(-90.0..=90.0).contains(&latitude) {
            return Err(TemporalError::constraint(format!(
                "coordinates out of range: lon={longitude} lat={latitude}"
            )));
        }
        Ok(Self {
            longitude,
            latitude,
        })
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(lon={}, lat={})", self.longitude, self.latitude)
    }
}

/// Equirectangular approximation of the arc between `a` and `b`, in whole
/// metres. Accurate for short distances only.
pub fn distance(a: Coordinates, b: Coordinates) -> f64 {
    let d_lon = (a.longitude - b.longitude).to_radians();
    let d_lat = (a.latitude - b.latitude).to_radians();
    let mean_lat = ((a.latitude + b.latitude) / 2.0).to_radians();
    (EARTH_RADIUS_M * (d_lat.powi(2) + (mean_lat.cos() * d_lon).powi(2)).sqrt()).round()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relocation {
    Same,
    /// Within the nearby radius; usually a coordinate correction.
    Nearby,
    /// A real relocation: a new location version is due.
    Moved,
}

impl Relocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relocation::Same => "same",
            Relocation::Nearby => "nearby",
            Relocation::Moved => "moved",
        }
    }
}

pub fn classify_relocation(from: Coordinates, to: Coordinates, nearby_m: f64) -> Relocation {
    let d = distance(from, to);
    if d == 0.0 {
        Relocation::Same
    } else if d <= nearby_m {
        Relocation::Nearby
    } else {
        Relocation::Moved
    }
}

/// Parse an IANA timezone name.
pub fn check_timezone(name: &str) -> Result<Tz, TemporalError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| TemporalError::constraint(format!("unknown timezone '{name}'")))
}
