//! Great-circle distance for geofence checks.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Nearest site within `max_distance_meters` of `point`, if any.
pub fn nearest_within(point: GeoPoint, sites: &[GeoPoint], max_distance_meters: f64) -> Option<(GeoPoint, f64)> {
    sites
        .iter()
        .map(|site| (*site, haversine_meters(point, *site)))
        .filter(|(_, distance)| *distance <= max_distance_meters)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}
