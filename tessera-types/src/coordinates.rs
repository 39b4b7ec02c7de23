use crate::cartesian_point::CartesianPoint2d;
use serde::{Deserialize, Serialize};

/// Longitude/latitude pair in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct Coordinates {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl Coordinates {
    /// Creates a new pair. Note the order: longitude first.
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Creates coordinates from microdegree values as stored in binary map files.
    pub fn from_microdegrees(lon: i64, lat: i64) -> Self {
        Self {
            lon: lon as f64 / 1e6,
            lat: lat as f64 / 1e6,
        }
    }

    /// Returns true if both values are within `epsilon` degrees of each other's.
    pub fn approx_eq(&self, other: &Self, epsilon: f64) -> bool {
        (self.lon - other.lon).hypot(self.lat - other.lat) < epsilon
    }
}

impl CartesianPoint2d for Coordinates {
    type Num = f64;

    fn x(&self) -> f64 {
        self.lon
    }

    fn y(&self) -> f64 {
        self.lat
    }
}

impl approx::AbsDiffEq for Coordinates {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.lon.abs_diff_eq(&other.lon, epsilon) && self.lat.abs_diff_eq(&other.lat, epsilon)
    }
}
