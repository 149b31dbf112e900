//! Site listings: photometers grouped by where they are deployed.
//!
//! Two stores that describe the same network drift apart in location data
//! the same way they drift in names. These helpers find the symptoms: one
//! coordinate pair carrying different place metadata, one place name spread
//! over different coordinates, and distinct coordinate pairs so close they
//! are probably the same site typed twice.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::geo::{distance, Coordinates};

/// One photometer's deployment as listed by a store export.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Which store listed it.
    #[serde(default)]
    pub source: Option<String>,
    pub name: String,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub place: Option<String>,
    pub town: Option<String>,
    pub sub_region: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub timezone: Option<String>,
}

impl Site {
    /// `None` when either coordinate is missing or out of range.
    pub fn coordinates(&self) -> Option<Coordinates> {
        Coordinates::new(self.longitude?, self.latitude?).ok()
    }
}

/// Sites deployed at exactly the same coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct SiteGroup {
    pub coordinates: Coordinates,
    pub sites: Vec<Site>,
}

impl SiteGroup {
    /// Metadata that should agree across the group but does not.
    ///
    /// `duplicated_name` means the same photometer is listed more than once.
    pub fn inconsistencies(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.sites.len() < 2 {
            return out;
        }
        let first = &self.sites[0];
        if self.sites.iter().all(|s| s.name == first.name) {
            out.push("duplicated_name");
        }
        let sites = &self.sites;
        if disagree(sites, |s| s.place.as_deref()) {
            out.push("place");
        }
        if disagree(sites, |s| s.town.as_deref()) {
            out.push("town");
        }
        if disagree(sites, |s| s.sub_region.as_deref()) {
            out.push("sub_region");
        }
        if disagree(sites, |s| s.region.as_deref()) {
            out.push("region");
        }
        if disagree(sites, |s| s.country.as_deref()) {
            out.push("country");
        }
        if disagree(sites, |s| s.timezone.as_deref()) {
            out.push("timezone");
        }
        out
    }

    pub fn names(&self) -> Vec<&str> {
        self.sites.iter().map(|s| s.name.as_str()).collect()
    }
}

fn disagree(sites: &[Site], get: impl Fn(&Site) -> Option<&str>) -> bool {
    sites.iter().any(|s| get(s) != get(&sites[0]))
}

/// Group sites by exact coordinates, in first-seen order. Sites without
/// usable coordinates are skipped.
pub fn group_by_coordinates(sites: &[Site]) -> Vec<SiteGroup> {
    let mut groups: Vec<SiteGroup> = Vec::new();
    for site in sites {
        let Some(at) = site.coordinates() else {
            warn!(name = %site.name, "sites: skipping entry without usable coordinates");
            continue;
        };
        match groups.iter_mut().find(|g| g.coordinates == at) {
            Some(g) => g.sites.push(site.clone()),
            None => groups.push(SiteGroup {
                coordinates: at,
                sites: vec![site.clone()],
            }),
        }
    }
    info!(
        entries = sites.len(),
        coordinates = groups.len(),
        "sites: grouped by coordinates"
    );
    groups
}

/// A place name whose photometers do not share one coordinate pair.
#[derive(Clone, Debug, PartialEq)]
pub struct SplitPlace {
    pub place: String,
    pub sites: Vec<Site>,
}

/// Places listed with more than one distinct longitude or latitude.
pub fn split_places(sites: &[Site]) -> Vec<SplitPlace> {
    let mut by_place: Vec<SplitPlace> = Vec::new();
    for site in sites {
        let Some(place) = site.place.as_deref() else {
            debug!(name = %site.name, "sites: no place defined");
            continue;
        };
        match by_place.iter_mut().find(|p| p.place == place) {
            Some(p) => p.sites.push(site.clone()),
            None => by_place.push(SplitPlace {
                place: place.to_string(),
                sites: vec![site.clone()],
            }),
        }
    }
    by_place.retain(|p| {
        let first = &p.sites[0];
        p.sites
            .iter()
            .any(|s| s.longitude != first.longitude || s.latitude != first.latitude)
    });
    by_place
}

/// Two distinct coordinate groups within the nearby radius of each other.
#[derive(Clone, Debug, PartialEq)]
pub struct NearbyPair {
    pub a: Site,
    pub b: Site,
    pub distance_m: f64,
}

/// Every pair of distinct groups at most `max_m` metres apart.
pub fn nearby_pairs(groups: &[SiteGroup], max_m: f64) -> Vec<NearbyPair> {
    let mut out = Vec::new();
    for (i, ga) in groups.iter().enumerate() {
        for gb in &groups[i + 1..] {
            let d = distance(ga.coordinates, gb.coordinates);
            if d <= max_m {
                out.push(NearbyPair {
                    a: ga.sites[0].clone(),
                    b: gb.sites[0].clone(),
                    distance_m: d,
                });
            }
        }
    }
    out
}

/// Sites whose distance to `center` lies in `[lower_m, upper_m]`.
pub fn sites_near(sites: &[Site], center: Coordinates, lower_m: f64, upper_m: f64) -> Vec<&Site> {
    sites
        .iter()
        .filter(|s| {
            s.coordinates()
                .map(|at| (lower_m..=upper_m).contains(&distance(at, center)))
                .unwrap_or(false)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// Read a site listing: `.json` is an array of sites, anything else is a
/// `;`-delimited CSV with a header row.
pub fn read_sites(path: &Path) -> Result<Vec<Site>> {
    if path.extension().is_some_and(|e| e == "json") {
        let body = std::fs::read_to_string(path)
            .with_context(|| format!("read sites json: {}", path.display()))?;
        return serde_json::from_str(&body)
            .with_context(|| format!("parse sites json: {}", path.display()));
    }
    let mut r = csv::ReaderBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("open sites csv: {}", path.display()))?;
    let mut out = Vec::new();
    for (i, row) in r.deserialize().enumerate() {
        let site: Site = row.with_context(|| format!("sites csv row {}", i + 1))?;
        out.push(site);
    }
    Ok(out)
}

/// Write sites as `;`-delimited CSV, one row per site.
pub fn write_sites_csv(path: &Path, sites: &[&Site]) -> Result<()> {
    let mut w = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .with_context(|| format!("open sites csv: {}", path.display()))?;
    for site in sites {
        w.serialize(site).context("write sites csv row")?;
    }
    w.flush().context("flush sites csv")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str, lon: f64, lat: f64, place: &str) -> Site {
        Site {
            name: name.to_string(),
            longitude: Some(lon),
            latitude: Some(lat),
            place: Some(place.to_string()),
            town: Some("Madrid".to_string()),
            timezone: Some("Europe/Madrid".to_string()),
            ..Site::default()
        }
    }

    #[test]
    fn exact_coordinates_group_together_and_report_disagreements() {
        let sites = vec![
            site("stars1", -3.7038, 40.4168, "Observatorio"),
            site("stars2", -3.7038, 40.4168, "Azotea"),
            site("stars3", -3.6000, 40.5000, "Campo"),
            Site {
                name: "stars4".to_string(),
                ..Site::default()
            },
        ];
        let groups = group_by_coordinates(&sites);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].names(), vec!["stars1", "stars2"]);
        assert_eq!(groups[0].inconsistencies(), vec!["place"]);
        assert!(groups[1].inconsistencies().is_empty());
    }

    #[test]
    fn same_photometer_listed_twice_is_a_duplicate() {
        let sites = vec![
            site("stars1", -3.7038, 40.4168, "Observatorio"),
            site("stars1", -3.7038, 40.4168, "Observatorio"),
        ];
        let groups = group_by_coordinates(&sites);
        assert_eq!(groups[0].inconsistencies(), vec!["duplicated_name"]);
    }

    #[test]
    fn place_spread_over_coordinates_is_split() {
        let sites = vec![
            site("stars1", -3.7038, 40.4168, "Observatorio"),
            site("stars2", -3.7039, 40.4168, "Observatorio"),
            site("stars3", -3.6000, 40.5000, "Campo"),
            site("stars4", -3.6000, 40.5000, "Campo"),
        ];
        let split = split_places(&sites);
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].place, "Observatorio");
        assert_eq!(split[0].sites.len(), 2);
    }

    #[test]
    fn nearby_pairs_only_within_radius() {
        let sites = vec![
            site("stars1", -3.7038, 40.4168, "Observatorio"),
            // ~111 m north.
            site("stars2", -3.7038, 40.4178, "Observatorio Norte"),
            // ~1.1 km north.
            site("stars3", -3.7038, 40.4268, "Lejos"),
        ];
        let groups = group_by_coordinates(&sites);
        let pairs = nearby_pairs(&groups, 200.0);
        assert_eq!(pairs.len(), 1);
        assert_eq!((pairs[0].a.name.as_str(), pairs[0].b.name.as_str()), ("stars1", "stars2"));
        assert!(pairs[0].distance_m > 100.0 && pairs[0].distance_m < 120.0);
    }

    #[test]
    fn sites_near_uses_an_inclusive_band() {
        let sites = vec![
            site("stars1", -3.7038, 40.4168, "A"),
            site("stars2", -3.7038, 40.4178, "B"),
            site("stars3", -3.7038, 40.4268, "C"),
        ];
        let center = Coordinates::new(-3.7038, 40.4168).unwrap();
        let names: Vec<&str> = sites_near(&sites, center, 0.0, 200.0)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["stars1", "stars2"]);
        let names: Vec<&str> = sites_near(&sites, center, 1.0, 200.0)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["stars2"]);
    }

    #[test]
    fn csv_listing_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sites.csv");
        let a = site("stars1", -3.7038, 40.4168, "Observatorio");
        let b = Site {
            source: Some("document".to_string()),
            name: "stars2".to_string(),
            ..Site::default()
        };
        write_sites_csv(&path, &[&a, &b]).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.starts_with(
            "source;name;longitude;latitude;place;town;sub_region;region;country;timezone"
        ));
        assert_eq!(read_sites(&path).unwrap(), vec![a, b]);
    }
}
