use std::path::Path as FsPath;
use std::sync::Arc;

use quick_cache::sync::Cache;
use serde::{Deserialize, Serialize};
use tessera_types::mercator::{ll2tile, tile2ll};
use tessera_types::{Coordinates, Rect};

use crate::decoder::{read_paths, read_points};
use crate::entity::{Path, Point};
use crate::error::MapsforgeError;
use crate::header::{has_magic, MapHeader, MapInfo, SubFileInfo, MAGIC};
use crate::index::{BandIndex, IndexedTile};
use crate::source::{FileSource, MapSource, MemorySource};

/// Capacities of the decoded tile caches, in number of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapDataOptions {
    /// Tiles with decoded points.
    pub point_cache_capacity: usize,
    /// Tiles with decoded paths.
    pub path_cache_capacity: usize,
}

impl Default for MapDataOptions {
    fn default() -> Self {
        Self {
            point_cache_capacity: 256,
            path_cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct TileKey {
    band: usize,
    x: u32,
    y: u32,
    zoom: u8,
}

impl TileKey {
    fn new(band: usize, tile: &IndexedTile, zoom: u8) -> Self {
        Self {
            band,
            x: tile.x,
            y: tile.y,
            zoom,
        }
    }
}

struct MapContent {
    header: MapHeader,
    bands: Vec<BandIndex>,
}

impl MapContent {
    fn read(source: &dyn MapSource) -> Result<Self, MapsforgeError> {
        let header = MapHeader::read(source)?;
        let bands = header
            .info
            .subfiles
            .iter()
            .enumerate()
            .map(|(band, info)| BandIndex::read(source, band, info, &header.info.bounds))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { header, bands })
    }

    /// Band serving the zoom level: the first one whose max zoom is not below it.
    fn level(&self, zoom: u8) -> usize {
        let subfiles = &self.header.info.subfiles;
        subfiles
            .iter()
            .position(|info| zoom <= info.max)
            .unwrap_or(subfiles.len() - 1)
    }
}

/// Opened map file.
///
/// Construction reads the header and builds a spatial index of the tiles of every zoom band.
/// Tile contents are decoded on demand and kept in bounded caches. All methods take `&self` and
/// can be called from several threads.
///
/// A map that failed to open is still a valid object: [`MapData::is_valid`] returns false, the
/// reason is available from [`MapData::error_string`] and all queries return no data.
pub struct MapData {
    source: Box<dyn MapSource>,
    content: Result<MapContent, MapsforgeError>,
    points: Cache<TileKey, Arc<Vec<Point>>>,
    paths: Cache<TileKey, Arc<Vec<Path>>>,
}

impl std::fmt::Debug for MapData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapData")
            .field("info", &self.info())
            .field("error", &self.error())
            .finish()
    }
}

impl MapData {
    /// Opens the map file. Never fails, check [`MapData::is_valid`].
    pub fn open(path: impl AsRef<FsPath>) -> Self {
        let path = path.as_ref();
        if let Err(err) = std::fs::File::open(path) {
            log::error!("Failed to open map {}: {err}", path.display());
            return Self::with_content(
                Box::new(FileSource::new(path)),
                Err(err.into()),
                MapDataOptions::default(),
            );
        }

        Self::from_source(FileSource::new(path), MapDataOptions::default())
    }

    /// Opens the map file, returning an error if it cannot be used.
    pub fn try_open(path: impl AsRef<FsPath>) -> Result<Self, MapsforgeError> {
        std::fs::File::open(path.as_ref())?;
        Self::try_from_source(FileSource::new(path), MapDataOptions::default())
    }

    /// Opens a map held in memory. Never fails, check [`MapData::is_valid`].
    pub fn from_bytes(data: impl Into<bytes::Bytes>) -> Self {
        Self::from_source(MemorySource::new(data), MapDataOptions::default())
    }

    /// Opens a map from any source. Never fails, check [`MapData::is_valid`].
    pub fn from_source(source: impl MapSource + 'static, options: MapDataOptions) -> Self {
        let content = MapContent::read(&source);
        if let Err(err) = &content {
            log::error!("Failed to load map: {err}");
        }

        Self::with_content(Box::new(source), content, options)
    }

    /// Opens a map from any source, returning an error if it cannot be used.
    pub fn try_from_source(
        source: impl MapSource + 'static,
        options: MapDataOptions,
    ) -> Result<Self, MapsforgeError> {
        let content = MapContent::read(&source)?;
        Ok(Self::with_content(Box::new(source), Ok(content), options))
    }

    fn with_content(
        source: Box<dyn MapSource>,
        content: Result<MapContent, MapsforgeError>,
        options: MapDataOptions,
    ) -> Self {
        Self {
            source,
            content,
            points: Cache::new(options.point_cache_capacity.max(1)),
            paths: Cache::new(options.path_cache_capacity.max(1)),
        }
    }

    /// Returns true if the file starts with the map file signature.
    pub fn is_mapsforge(path: impl AsRef<FsPath>) -> bool {
        FileSource::new(path)
            .read_at(0, MAGIC.len())
            .is_ok_and(|data| has_magic(&data))
    }

    /// True if the map was opened successfully.
    pub fn is_valid(&self) -> bool {
        self.content.is_ok()
    }

    /// Reason the map could not be opened, or an empty string.
    pub fn error_string(&self) -> String {
        self.error().map(ToString::to_string).unwrap_or_default()
    }

    /// Error the map could not be opened with.
    pub fn error(&self) -> Option<&MapsforgeError> {
        self.content.as_ref().err()
    }

    /// Header metadata.
    pub fn info(&self) -> Option<&MapInfo> {
        self.content.as_ref().ok().map(|content| &content.header.info)
    }

    /// Tile size in pixels the map was made for.
    pub fn tile_size(&self) -> Option<u16> {
        self.info().map(|info| info.tile_size)
    }

    /// Lowest and highest zoom level with data.
    pub fn zooms(&self) -> Option<(u8, u8)> {
        let subfiles = &self.info()?.subfiles;
        Some((subfiles.first()?.min, subfiles.last()?.max))
    }

    /// Map bounds with the north-west corner aligned to the tile grid of the most detailed band.
    pub fn bounds(&self) -> Option<Rect> {
        let info = self.info()?;
        let zoom = info.subfiles.last()?.base;
        let (x, y) = ll2tile(&Coordinates::new(info.bounds.x_min, info.bounds.y_max), zoom);
        let top_left = tile2ll(x, y, zoom);

        Some(Rect::new(
            top_left.lon,
            info.bounds.y_min,
            info.bounds.x_max,
            top_left.lat,
        ))
    }

    /// Drops all decoded tiles. The tile index is kept.
    pub fn clear(&self) {
        self.points.clear();
        self.paths.clear();
    }

    /// Points inside the rectangle visible at the zoom level.
    pub fn points(&self, rect: &Rect, zoom: u8) -> Vec<Point> {
        let mut result = Vec::new();
        self.for_each_tile(rect, zoom, |band, info, tile| {
            if let Some(points) = self.tile_points(band, info, tile, zoom) {
                result.extend(points.iter().filter(|p| rect.contains(&p.coordinates)).cloned());
            }
        });

        result
    }

    /// Paths whose bounding rectangle intersects the rectangle, visible at the zoom level.
    pub fn paths(&self, rect: &Rect, zoom: u8) -> Vec<Path> {
        let mut result = Vec::new();
        self.for_each_tile(rect, zoom, |band, info, tile| {
            if let Some(paths) = self.tile_paths(band, info, tile, zoom) {
                result.extend(
                    paths
                        .iter()
                        .filter(|p| p.bounding_rect().is_some_and(|r| rect.intersects(&r)))
                        .cloned(),
                );
            }
        });

        result
    }

    /// Points and paths in the rectangle, see [`MapData::points`] and [`MapData::paths`].
    pub fn entities_in_rect(&self, rect: &Rect, zoom: u8) -> (Vec<Point>, Vec<Path>) {
        (self.points(rect, zoom), self.paths(rect, zoom))
    }

    fn for_each_tile(
        &self,
        rect: &Rect,
        zoom: u8,
        mut f: impl FnMut(usize, &SubFileInfo, &IndexedTile),
    ) {
        let Ok(content) = &self.content else {
            return;
        };

        let band = content.level(zoom);
        let info = &content.header.info.subfiles[band];
        for tile in content.bands[band].locate(rect) {
            f(band, info, tile);
        }
    }

    // Concurrent misses on the same tile wait for a single decode. Failed decodes are not cached.
    fn tile_points(
        &self,
        band: usize,
        info: &SubFileInfo,
        tile: &IndexedTile,
        zoom: u8,
    ) -> Option<Arc<Vec<Point>>> {
        let key = TileKey::new(band, tile, zoom);
        self.points
            .get_or_insert_with(&key, || {
                log::trace!("Decoding points of tile {key:?}");
                self.decode_points(info, tile, zoom).map(Arc::new)
            })
            .inspect_err(|err| log::warn!("Failed to decode points of tile {key:?}: {err}"))
            .ok()
    }

    fn tile_paths(
        &self,
        band: usize,
        info: &SubFileInfo,
        tile: &IndexedTile,
        zoom: u8,
    ) -> Option<Arc<Vec<Path>>> {
        let key = TileKey::new(band, tile, zoom);
        self.paths
            .get_or_insert_with(&key, || {
                log::trace!("Decoding paths of tile {key:?}");
                self.decode_paths(info, tile, zoom).map(Arc::new)
            })
            .inspect_err(|err| log::warn!("Failed to decode paths of tile {key:?}: {err}"))
            .ok()
    }

    fn tile_data(
        &self,
        info: &SubFileInfo,
        tile: &IndexedTile,
    ) -> Result<bytes::Bytes, MapsforgeError> {
        let size = usize::try_from(tile.size)
            .map_err(|_| MapsforgeError::InvalidRecord(format!("tile too large: {}", tile.size)))?;
        self.source.read_at(info.offset + tile.offset, size)
    }

    fn decode_points(
        &self,
        info: &SubFileInfo,
        tile: &IndexedTile,
        zoom: u8,
    ) -> Result<Vec<Point>, MapsforgeError> {
        let content = self.content.as_ref().map_err(Clone::clone)?;
        read_points(self.tile_data(info, tile)?, tile, info, zoom, &content.header.point_tags)
    }

    fn decode_paths(
        &self,
        info: &SubFileInfo,
        tile: &IndexedTile,
        zoom: u8,
    ) -> Result<Vec<Path>, MapsforgeError> {
        let content = self.content.as_ref().map_err(Clone::clone)?;
        read_paths(self.tile_data(info, tile)?, tile, info, zoom, &content.header.path_tags)
    }
}
