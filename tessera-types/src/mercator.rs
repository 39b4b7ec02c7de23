//! Web-mercator tile grid used by binary map files.

use crate::coordinates::Coordinates;
use crate::rect::Rect;
use std::f64::consts::PI;

/// Maximum latitude representable in the web-mercator tile grid.
pub const MAX_LATITUDE: f64 = 85.0511287798066;

/// Longitude/latitude extent of the tile grid.
pub const WORLD_BOUNDS: Rect = Rect {
    x_min: -180.0,
    y_min: -MAX_LATITUDE,
    x_max: 180.0,
    y_max: MAX_LATITUDE,
};

/// Number of tiles along one axis at the given zoom.
pub fn tiles_per_axis(zoom: u8) -> u32 {
    1u32 << zoom.min(31)
}

/// Fractional tile column of the longitude.
pub fn lon_to_tile_x(lon: f64, zoom: u8) -> f64 {
    (lon + 180.0) / 360.0 * tiles_per_axis(zoom) as f64
}

/// Fractional tile row of the latitude.
pub fn lat_to_tile_y(lat: f64, zoom: u8) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * tiles_per_axis(zoom) as f64
}

/// Longitude of the western edge of the tile column.
pub fn tile_x_to_lon(x: f64, zoom: u8) -> f64 {
    x / tiles_per_axis(zoom) as f64 * 360.0 - 180.0
}

/// Latitude of the northern edge of the tile row.
pub fn tile_y_to_lat(y: f64, zoom: u8) -> f64 {
    let n = PI - 2.0 * PI * y / tiles_per_axis(zoom) as f64;
    n.sinh().atan().to_degrees()
}

/// Tile containing the coordinates, clamped to the grid.
pub fn ll2tile(coordinates: &Coordinates, zoom: u8) -> (u32, u32) {
    let max = (tiles_per_axis(zoom) - 1) as f64;
    let x = lon_to_tile_x(coordinates.lon, zoom).floor().clamp(0.0, max);
    let y = lat_to_tile_y(coordinates.lat, zoom).floor().clamp(0.0, max);
    (x as u32, y as u32)
}

/// North-west corner of the tile.
pub fn tile2ll(x: u32, y: u32, zoom: u8) -> Coordinates {
    Coordinates::new(tile_x_to_lon(x as f64, zoom), tile_y_to_lat(y as f64, zoom))
}

/// Geographic bounds of the tile.
pub fn tile_bounds(x: u32, y: u32, zoom: u8) -> Rect {
    let nw = tile2ll(x, y, zoom);
    let se = tile2ll(x + 1, y + 1, zoom);
    Rect::new(nw.lon, se.lat, se.lon, nw.lat)
}

/// Clamps a geographic rectangle to [`WORLD_BOUNDS`].
pub fn clamp_to_world(rect: &Rect) -> Rect {
    Rect::new(
        rect.x_min.clamp(WORLD_BOUNDS.x_min, WORLD_BOUNDS.x_max),
        rect.y_min.clamp(WORLD_BOUNDS.y_min, WORLD_BOUNDS.y_max),
        rect.x_max.clamp(WORLD_BOUNDS.x_min, WORLD_BOUNDS.x_max),
        rect.y_max.clamp(WORLD_BOUNDS.y_min, WORLD_BOUNDS.y_max),
    )
}
