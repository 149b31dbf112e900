use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tess_schemas::TemporalError;
use tracing::{info, warn};

use crate::geo::Coordinates;

pub const NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

const USER_AGENT: &str = "tess-metadata/0.0.1 (STARS4ALL photometer network)";

/// Place metadata proposed for a photometer site.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationInfo {
    pub place: Option<String>,
    /// Which address component `place` came from (`leisure`, `road + house_number`, ...).
    pub place_type: Option<String>,
    pub town: Option<String>,
    pub town_type: Option<String>,
    pub sub_region: Option<String>,
    pub region: Option<String>,
    pub zipcode: Option<String>,
    pub country: Option<String>,
}

/// Reverse geocoding contract.
#[async_trait::async_trait]
pub trait Geocoder: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn resolve(&self, at: Coordinates) -> Result<LocationInfo, TemporalError>;
}

fn unavailable(reason: impl Into<String>) -> TemporalError {
    TemporalError::EnrichmentUnavailable {
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Nominatim
// ---------------------------------------------------------------------------

/// OpenStreetMap Nominatim reverse geocoder.
#[derive(Debug, Clone)]
pub struct NominatimGeocoder {
    http: reqwest::Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new() -> Result<Self, TemporalError> {
        Self::new_with_base_url(NOMINATIM_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Result<Self, TemporalError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| unavailable(format!("http client: {e}")))?;
        Ok(Self { http, base_url })
    }

    fn reverse_url(&self) -> String {
        format!("{}/reverse", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl Geocoder for NominatimGeocoder {
    fn source_name(&self) -> &'static str {
        "nominatim"
    }

    async fn resolve(&self, at: Coordinates) -> Result<LocationInfo, TemporalError> {
        let lat = at.latitude.to_string();
        let lon = at.longitude.to_string();
        let resp = self
            .http
            .get(self.reverse_url())
            .query(&[
                ("format", "jsonv2"),
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("accept-language", "en"),
                ("addressdetails", "1"),
            ])
            .send()
            .await
            .map_err(|e| unavailable(format!("nominatim request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(unavailable(format!(
                "nominatim http error status={} at {at}",
                status.as_u16()
            )));
        }
        let body: ReverseResponse = resp
            .json()
            .await
            .map_err(|e| unavailable(format!("nominatim response decode failed: {e}")))?;

        if let Some(err) = body.error {
            return Err(unavailable(format!("nominatim: {err} at {at}")));
        }
        let address = body
            .address
            .ok_or_else(|| unavailable(format!("nominatim returned no address at {at}")))?;
        Ok(location_from_address(&address))
    }
}

#[derive(Debug, Deserialize)]
struct ReverseResponse {
    error: Option<String>,
    address: Option<BTreeMap<String, String>>,
}

fn first_of(address: &BTreeMap<String, String>, keys: &[&str]) -> Option<(String, String)> {
    keys.iter()
        .find_map(|k| address.get(*k).map(|v| (v.clone(), k.to_string())))
}

/// Pick the most specific place name Nominatim offers.
fn location_from_address(address: &BTreeMap<String, String>) -> LocationInfo {
    let place = first_of(
        address,
        &["leisure", "amenity", "tourism", "building", "road", "hamlet"],
    )
    .map(|(name, kind)| match (kind.as_str(), address.get("house_number")) {
        ("road", Some(number)) => (format!("{name}, {number}"), "road + house_number".to_string()),
        _ => (name, kind),
    });
    let town = first_of(address, &["village", "town", "city", "municipality"]);
    let sub_region = first_of(address, &["state_district", "province"]);

    let (place, place_type) = place.unzip();
    let (town, town_type) = town.unzip();
    LocationInfo {
        place,
        place_type,
        town,
        town_type,
        sub_region: sub_region.map(|(name, _)| name),
        region: address.get("state").cloned(),
        zipcode: address.get("postcode").cloned(),
        country: address.get("country").cloned(),
    }
}

/// Resolve many sites one after another. A failed lookup is kept as an error
/// for that site and does not stop the rest.
pub async fn resolve_all<K: Clone>(
    geocoder: &dyn Geocoder,
    sites: &[(K, Coordinates)],
) -> Vec<(K, Result<LocationInfo, TemporalError>)> {
    let mut out = Vec::with_capacity(sites.len());
    for (id, at) in sites {
        let res = geocoder.resolve(*at).await;
        match &res {
            Ok(info) => info!(
                source = geocoder.source_name(),
                place = info.place.as_deref().unwrap_or("-"),
                "enrich: resolved {at}"
            ),
            Err(e) => warn!(source = geocoder.source_name(), error = %e, "enrich: lookup failed for {at}"),
        }
        out.push((id.clone(), res));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn road_with_house_number_is_joined() {
        let info = location_from_address(&addr(&[
            ("road", "Calle Mayor"),
            ("house_number", "12"),
            ("town", "Villaviciosa"),
        ]));
        assert_eq!(info.place.as_deref(), Some("Calle Mayor, 12"));
        assert_eq!(info.place_type.as_deref(), Some("road + house_number"));
        assert_eq!(info.town.as_deref(), Some("Villaviciosa"));
        assert_eq!(info.town_type.as_deref(), Some("town"));
    }

    #[test]
    fn leisure_wins_over_road() {
        let info = location_from_address(&addr(&[
            ("road", "Camino"),
            ("leisure", "Observatory Park"),
        ]));
        assert_eq!(info.place.as_deref(), Some("Observatory Park"));
        assert_eq!(info.place_type.as_deref(), Some("leisure"));
    }

    #[test]
    fn no_place_component_leaves_place_empty() {
        let info = location_from_address(&addr(&[("country", "Spain"), ("province", "Madrid")]));
        assert_eq!(info.place, None);
        assert_eq!(info.sub_region.as_deref(), Some("Madrid"));
        assert_eq!(info.country.as_deref(), Some("Spain"));
    }
}
