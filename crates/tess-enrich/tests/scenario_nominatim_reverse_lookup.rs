use httpmock::prelude::*;
use serde_json::json;
use tess_enrich::{resolve_all, Coordinates, Geocoder, NominatimGeocoder};
use tess_schemas::TemporalError;

fn site() -> Coordinates {
    Coordinates::new(-3.7038, 40.4168).unwrap()
}

#[tokio::test]
async fn scenario_reverse_lookup_builds_location_info() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET)
                .path("/reverse")
                .query_param("format", "jsonv2")
                .query_param("lat", "40.4168")
                .query_param("lon", "-3.7038")
                .query_param("accept-language", "en");
            then.status(200).json_body(json!({
                "display_name": "Observatorio, Madrid, Spain",
                "address": {
                    "amenity": "Observatorio",
                    "road": "Calle Alfonso XII",
                    "city": "Madrid",
                    "state": "Community of Madrid",
                    "postcode": "28014",
                    "country": "Spain"
                }
            }));
        })
        .await;

    let geocoder = NominatimGeocoder::new_with_base_url(server.base_url()).unwrap();
    let info = geocoder.resolve(site()).await.unwrap();
    mock.assert_async().await;

    assert_eq!(info.place.as_deref(), Some("Observatorio"));
    assert_eq!(info.place_type.as_deref(), Some("amenity"));
    assert_eq!(info.town.as_deref(), Some("Madrid"));
    assert_eq!(info.town_type.as_deref(), Some("city"));
    assert_eq!(info.region.as_deref(), Some("Community of Madrid"));
    assert_eq!(info.zipcode.as_deref(), Some("28014"));
    assert_eq!(info.country.as_deref(), Some("Spain"));
}

#[tokio::test]
async fn scenario_lookup_failures_are_enrichment_unavailable() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reverse").query_param("lat", "40.4168");
            then.status(200).json_body(json!({ "error": "Unable to geocode" }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reverse").query_param("lat", "0");
            then.status(503);
        })
        .await;

    let geocoder = NominatimGeocoder::new_with_base_url(server.base_url()).unwrap();
    let err = geocoder.resolve(site()).await.unwrap_err();
    assert!(matches!(err, TemporalError::EnrichmentUnavailable { .. }));

    let err = geocoder
        .resolve(Coordinates::new(0.0, 0.0).unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, TemporalError::EnrichmentUnavailable { .. }));
}

#[tokio::test]
async fn scenario_one_failed_site_does_not_stop_the_batch() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reverse").query_param("lat", "40.4168");
            then.status(200)
                .json_body(json!({ "address": { "hamlet": "El Escorial", "country": "Spain" } }));
        })
        .await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/reverse").query_param("lat", "0");
            then.status(500);
        })
        .await;

    let geocoder = NominatimGeocoder::new_with_base_url(server.base_url()).unwrap();
    let sites = vec![
        ("stars1", Coordinates::new(0.0, 0.0).unwrap()),
        ("stars2", site()),
    ];
    let out = resolve_all(&geocoder, &sites).await;

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].0, "stars1");
    assert!(out[0].1.is_err());
    let info = out[1].1.as_ref().unwrap();
    assert_eq!(info.place.as_deref(), Some("El Escorial"));
    assert_eq!(info.place_type.as_deref(), Some("hamlet"));
}
