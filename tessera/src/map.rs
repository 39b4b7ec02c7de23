//! Map façade tying the reader, the theme and the scheduler together.

use std::sync::Arc;

use tessera_mapsforge::{MapData, Path, Point};
use tessera_types::transform::WebMercatorTransform;
use tessera_types::Rect;
use tokio::task::JoinHandle;

use crate::error::TesseraError;
use crate::render::{Pixmap, Renderer};
use crate::scheduler::{TileJob, TileKey, TileScheduler, TileSchedulerBuilder};
use crate::theme::RenderTheme;

/// Result of [`MapsforgeMap::draw`].
#[derive(Debug, Default)]
pub struct DrawResult {
    /// Cached tiles, ready to be drawn.
    pub ready: Vec<(TileJob, Pixmap)>,
    /// Batch producing the missing tiles. [`Messenger`](crate::Messenger) is notified when it
    /// is done.
    pub pending: Option<JoinHandle<Vec<TileKey>>>,
}

/// Offline raster map backed by a mapsforge file.
#[derive(Debug)]
pub struct MapsforgeMap {
    scheduler: TileScheduler,
}

impl MapsforgeMap {
    /// Creates a map with the default scheduler settings. Must be called within a tokio runtime.
    pub fn new(
        map: Arc<MapData>,
        theme: Arc<RenderTheme>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self, TesseraError> {
        Ok(Self::from_scheduler(
            TileSchedulerBuilder::new(map, theme, renderer).build()?,
        ))
    }

    /// Creates a map using the scheduler.
    pub fn from_scheduler(scheduler: TileScheduler) -> Self {
        Self { scheduler }
    }

    /// Underlying map data.
    pub fn data(&self) -> &MapData {
        self.scheduler.map()
    }

    /// Tile scheduler.
    pub fn scheduler(&self) -> &TileScheduler {
        &self.scheduler
    }

    /// Returns true if the map file was opened successfully.
    pub fn is_valid(&self) -> bool {
        self.data().is_valid()
    }

    /// Error that made the map invalid, or an empty string.
    pub fn error_string(&self) -> String {
        self.data().error_string()
    }

    /// Zoom levels the map has data for.
    pub fn zooms(&self) -> Option<(u8, u8)> {
        self.data().zooms()
    }

    /// Geographic bounds of the map.
    pub fn bounds(&self) -> Option<Rect> {
        self.data().bounds()
    }

    /// Entities inside the geographic rectangle.
    pub fn entities_in_rect(&self, rect: &Rect, zoom: u8) -> (Vec<Point>, Vec<Path>) {
        self.data().entities_in_rect(rect, zoom)
    }

    /// Tiles covering the rectangle in web-mercator pixels at the zoom level.
    pub fn tiles(&self, rect: &Rect, zoom: u8, ratio: f64) -> Vec<TileJob> {
        let tile_size = self.scheduler.tile_size();
        let transform = WebMercatorTransform::new(zoom, tile_size);
        let max_index = (1u64 << zoom.min(31)) as f64 - 1.0;
        let first = |v: f64| (v / tile_size).floor().clamp(0.0, max_index) as u32;
        // A rectangle ending exactly on a tile border does not include the next tile.
        let last = |v: f64| ((v / tile_size).ceil() - 1.0).clamp(0.0, max_index) as u32;

        let x_min = first(rect.x_min);
        let x_max = last(rect.x_max).max(x_min);
        let y_min = first(rect.y_min);
        let y_max = last(rect.y_max).max(y_min);

        let mut jobs = vec![];
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                jobs.push(TileJob::new(
                    TileKey::new(x, y, zoom, ratio),
                    transform.tile_rect(x, y),
                ));
            }
        }

        jobs
    }

    /// Returns cached tiles of the rectangle and starts composing the missing ones.
    ///
    /// Nothing is drawn for an invalid map or a zoom level outside of the map's zoom range.
    pub fn draw(&self, rect: &Rect, zoom: u8, ratio: f64) -> DrawResult {
        let Some((min_zoom, max_zoom)) = self.zooms() else {
            return DrawResult::default();
        };
        if !(min_zoom..=max_zoom).contains(&zoom) {
            log::debug!("Zoom {zoom} is outside of the map range {min_zoom}..={max_zoom}");
            return DrawResult::default();
        }

        let mut result = DrawResult::default();
        let mut missing = vec![];
        for job in self.tiles(rect, zoom, ratio) {
            match self.scheduler.tile(&job.key) {
                Some(pixmap) => result.ready.push((job, pixmap)),
                None => missing.push(job),
            }
        }

        if !missing.is_empty() {
            result.pending = self.scheduler.schedule(missing);
        }

        result
    }

    /// Composes the tile on the calling thread without caching it.
    pub fn compose_tile(&self, job: &TileJob) -> Pixmap {
        self.scheduler.compose_tile(job)
    }

    /// Drops cached tiles and decoded map data.
    pub fn clear(&self) {
        self.scheduler.clear();
        self.data().clear();
    }
}
