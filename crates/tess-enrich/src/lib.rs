//! tess-enrich
//!
//! Location enrichment boundary. Resolves coordinates into place metadata
//! through a pluggable [`Geocoder`], classifies how far a photometer moved
//! between two locations, and checks site listings for duplicated or
//! inconsistent locations.
//!
//! Lookups never touch a store; callers decide what to do with a proposal.
//! Every failure is an `EnrichmentUnavailable` error so location work can be
//! skipped without blocking name or zero-point streams.

mod geo;
mod nominatim;
mod sites;

pub use geo::{
    check_timezone, classify_relocation, distance, Coordinates, Relocation, EARTH_RADIUS_M,
    NEARBY_DISTANCE_M,
};
pub use nominatim::{resolve_all, Geocoder, LocationInfo, NominatimGeocoder, NOMINATIM_URL};
pub use sites::{
    group_by_coordinates, nearby_pairs, read_sites, sites_near, split_places, write_sites_csv,
    NearbyPair, Site, SiteGroup, SplitPlace,
};
