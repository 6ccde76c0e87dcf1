//! Bounding-box geometry for area subdivision

use serde::{Deserialize, Serialize};

/// Mean Earth radius in metres
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Largest search radius the API accepts (metres)
pub const MAX_SEARCH_RADIUS_M: u32 = 40_000;

/// A latitude/longitude rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl BoundingBox {
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Returns true if the box is non-empty and within coordinate ranges
    pub fn is_valid(&self) -> bool {
        let finite = [self.south, self.west, self.north, self.east]
            .iter()
            .all(|v| v.is_finite());

        finite
            && -90.0 <= self.south
            && self.south < self.north
            && self.north <= 90.0
            && -180.0 <= self.west
            && self.west < self.east
            && self.east <= 180.0
    }

    /// Centre point as (latitude, longitude)
    pub fn center(&self) -> (f64, f64) {
        (
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Distance from the centre to the farthest corner, in metres
    pub fn circumradius_m(&self) -> f64 {
        let (lat, lon) = self.center();
        [
            (self.south, self.west),
            (self.south, self.east),
            (self.north, self.west),
            (self.north, self.east),
        ]
        .iter()
        .map(|&(clat, clon)| haversine_m(lat, lon, clat, clon))
        .fold(0.0, f64::max)
    }

    /// Search radius covering the whole box, capped at the API maximum
    pub fn search_radius_m(&self) -> u32 {
        let radius = self.circumradius_m().ceil();
        if radius >= MAX_SEARCH_RADIUS_M as f64 {
            MAX_SEARCH_RADIUS_M
        } else {
            (radius as u32).max(1)
        }
    }

    /// Returns true if one radius search can cover the whole box
    pub fn fits_single_search(&self) -> bool {
        self.circumradius_m() <= MAX_SEARCH_RADIUS_M as f64
    }

    /// Splits the box into four quadrants: SW, SE, NW, NE
    ///
    /// The order is fixed so repeated planning yields the same unit order.
    pub fn quadrants(&self) -> [BoundingBox; 4] {
        let (mid_lat, mid_lon) = self.center();
        [
            BoundingBox::new(self.south, self.west, mid_lat, mid_lon),
            BoundingBox::new(self.south, mid_lon, mid_lat, self.east),
            BoundingBox::new(mid_lat, self.west, self.north, mid_lon),
            BoundingBox::new(mid_lat, mid_lon, self.north, self.east),
        ]
    }

    /// Fixed-precision text form used in unit identifiers
    pub fn canonical(&self) -> String {
        format!(
            "{:.6},{:.6},{:.6},{:.6}",
            self.south, self.west, self.north, self.east
        )
    }
}

/// Great-circle distance between two points, in metres
fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().asin()
}
