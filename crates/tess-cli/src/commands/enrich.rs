//! `locate`: reverse-geocode a site and compare it to a previous position.
//! `sites`: check a site listing for duplicated or inconsistent locations.

use std::path::Path;

use anyhow::Result;
use tess_config::ConfigMode;
use tess_enrich::{
    check_timezone, classify_relocation, distance, group_by_coordinates, nearby_pairs, read_sites,
    sites_near, split_places, write_sites_csv, Coordinates, Geocoder, NominatimGeocoder, Site,
};

use super::load_config;

pub struct LocateArgs<'a> {
    pub longitude: f64,
    pub latitude: f64,
    pub from: Option<(f64, f64)>,
    pub timezone: Option<&'a str>,
    /// Site listing to search for neighbours of the located point.
    pub sites: Option<&'a Path>,
    pub config: &'a [String],
}

pub async fn locate(args: LocateArgs<'_>) -> Result<()> {
    let (_, settings) = load_config(args.config, ConfigMode::Enrich)?;
    let site = Coordinates::new(args.longitude, args.latitude)?;

    if let Some((lon, lat)) = args.from {
        let previous = Coordinates::new(lon, lat)?;
        let moved = classify_relocation(previous, site, settings.enrich.nearby_distance_m);
        println!(
            "distance_m={} relocation={}",
            distance(previous, site),
            moved.as_str()
        );
    }
    if let Some(path) = args.sites {
        let listing = read_sites(path)?;
        let radius = settings.enrich.nearby_distance_m;
        for near in sites_near(&listing, site, 0.0, radius) {
            if let Some(at) = near.coordinates() {
                println!("near name={} distance_m={}", near.name, distance(at, site));
            }
        }
    }
    if let Some(tz) = args.timezone {
        match check_timezone(tz) {
            Ok(tz) => println!("timezone={} timezone_valid=true", tz.name()),
            Err(e) => println!("timezone={tz} timezone_valid=false reason={e}"),
        }
    }

    let geocoder = NominatimGeocoder::new_with_base_url(settings.enrich.base_url.clone())?;
    // A failed lookup is reported, not fatal: location data stays as it is.
    match geocoder.resolve(site).await {
        Ok(info) => {
            let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
            println!("source={} resolved=true", geocoder.source_name());
            println!("place={} place_type={}", show(&info.place), show(&info.place_type));
            println!("town={} town_type={}", show(&info.town), show(&info.town_type));
            println!("sub_region={} region={}", show(&info.sub_region), show(&info.region));
            println!("zipcode={} country={}", show(&info.zipcode), show(&info.country));
        }
        Err(e) => {
            println!("source={} resolved=false reason={e}", geocoder.source_name());
        }
    }
    Ok(())
}

pub struct SitesArgs<'a> {
    pub path: &'a Path,
    /// Overrides `enrich.nearby_distance_m`.
    pub nearby_m: Option<f64>,
    /// Write every flagged site here as `;`-delimited CSV.
    pub export: Option<&'a Path>,
    pub config: &'a [String],
}

pub fn sites(args: SitesArgs<'_>) -> Result<()> {
    let (_, settings) = load_config(args.config, ConfigMode::Enrich)?;
    let radius = args.nearby_m.unwrap_or(settings.enrich.nearby_distance_m);
    let listing = read_sites(args.path)?;

    let groups = group_by_coordinates(&listing);
    let split = split_places(&listing);
    let pairs = nearby_pairs(&groups, radius);

    let mut flagged: Vec<&Site> = Vec::new();
    let mut inconsistent = 0;
    for g in &groups {
        let issues = g.inconsistencies();
        if issues.is_empty() {
            continue;
        }
        inconsistent += 1;
        println!(
            "coordinates lon={} lat={} names={} issues={}",
            g.coordinates.longitude,
            g.coordinates.latitude,
            g.names().join(","),
            issues.join(",")
        );
        extend_unique(&mut flagged, g.sites.iter());
    }

    for p in &split {
        let names: Vec<&str> = p.sites.iter().map(|s| s.name.as_str()).collect();
        println!("split_place place={} names={}", p.place, names.join(","));
        extend_unique(&mut flagged, p.sites.iter());
    }

    for p in &pairs {
        println!(
            "nearby a={} b={} distance_m={}",
            p.a.name, p.b.name, p.distance_m
        );
        extend_unique(&mut flagged, [&p.a, &p.b]);
    }

    println!(
        "sites={} coordinates={} inconsistent={} split_places={} nearby={} nearby_m={}",
        listing.len(),
        groups.len(),
        inconsistent,
        split.len(),
        pairs.len(),
        radius
    );
    if let Some(path) = args.export {
        write_sites_csv(path, &flagged)?;
        println!("export={} rows={}", path.display(), flagged.len());
    }
    Ok(())
}

fn extend_unique<'a>(out: &mut Vec<&'a Site>, sites: impl IntoIterator<Item = &'a Site>) {
    for s in sites {
        if !out.contains(&s) {
            out.push(s);
        }
    }
}
