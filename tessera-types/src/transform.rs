//! Conversion between geographic coordinates and device pixels.

use crate::coordinates::Coordinates;
use crate::mercator::{lat_to_tile_y, lon_to_tile_x, tile_x_to_lon, tile_y_to_lat};
use crate::rect::Rect;
use nalgebra::Point2;

/// Maps geographic coordinates to device pixels and back.
pub trait ScreenTransform: Send + Sync {
    /// Pixel position of the coordinates.
    fn ll2xy(&self, coordinates: &Coordinates) -> Point2<f64>;
    /// Coordinates of the pixel position.
    fn xy2ll(&self, point: &Point2<f64>) -> Coordinates;

    /// Geographic rectangle covered by the pixel rectangle.
    fn rect_to_geo(&self, rect: &Rect) -> Rect {
        let top_left = self.xy2ll(&Point2::new(rect.x_min, rect.y_min));
        let bottom_right = self.xy2ll(&Point2::new(rect.x_max, rect.y_max));
        Rect::new(top_left.lon, top_left.lat, bottom_right.lon, bottom_right.lat)
    }
}

/// Web-mercator world pixel space at a fixed zoom level.
///
/// The world at zoom `z` is `2^z * tile_size` pixels wide, with the origin at the north-west
/// corner of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercatorTransform {
    zoom: u8,
    tile_size: f64,
}

impl WebMercatorTransform {
    /// Creates a transform for the zoom level and tile pixel size.
    pub fn new(zoom: u8, tile_size: f64) -> Self {
        Self { zoom, tile_size }
    }

    /// Zoom level.
    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Tile size in pixels.
    pub fn tile_size(&self) -> f64 {
        self.tile_size
    }

    /// Pixel rectangle of the tile at this transform's zoom.
    pub fn tile_rect(&self, x: u32, y: u32) -> Rect {
        let x = x as f64 * self.tile_size;
        let y = y as f64 * self.tile_size;
        Rect::new(x, y, x + self.tile_size, y + self.tile_size)
    }
}

impl ScreenTransform for WebMercatorTransform {
    fn ll2xy(&self, coordinates: &Coordinates) -> Point2<f64> {
        Point2::new(
            lon_to_tile_x(coordinates.lon, self.zoom) * self.tile_size,
            lat_to_tile_y(coordinates.lat, self.zoom) * self.tile_size,
        )
    }

    fn xy2ll(&self, point: &Point2<f64>) -> Coordinates {
        Coordinates::new(
            tile_x_to_lon(point.x / self.tile_size, self.zoom),
            tile_y_to_lat(point.y / self.tile_size, self.zoom),
        )
    }
}
