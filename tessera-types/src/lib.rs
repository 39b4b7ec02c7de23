//! Geometry primitives shared by the mapsforge reader and the tile renderer.
//!
//! Geographic values use [`Coordinates`] (longitude/latitude in degrees), device values use
//! [`nalgebra::Point2`]. Both implement [`CartesianPoint2d`], so [`Rect`] and the contour
//! algorithms work over either space.

mod cartesian_point;
pub use cartesian_point::*;

mod coordinates;
pub use coordinates::*;

pub mod contour;
pub mod mercator;

mod polygon;
pub use polygon::*;

mod rect;
pub use rect::*;

mod size;
pub use size::*;

pub mod transform;
