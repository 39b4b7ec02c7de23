//! Parallel composition of tile batches.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;

use parking_lot::Mutex;
use quick_cache::sync::Cache;
use tessera_mapsforge::MapData;
use tessera_types::transform::WebMercatorTransform;
use tessera_types::Rect;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::compositor::compose_tile;
use crate::error::TesseraError;
use crate::messenger::Messenger;
use crate::render::{Pixmap, Renderer};
use crate::theme::RenderTheme;

/// Default capacity of the pixmap cache.
pub const DEFAULT_TILE_CACHE_CAPACITY: usize = 1024;

/// Default tile size in logical pixels.
pub const DEFAULT_TILE_SIZE: f64 = 256.0;

/// Identifier of a composed tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileKey {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Zoom level.
    pub zoom: u8,
    ratio: u64,
}

impl TileKey {
    /// Creates a key for the tile composed with the device pixel ratio.
    pub fn new(x: u32, y: u32, zoom: u8, ratio: f64) -> Self {
        Self {
            x,
            y,
            zoom,
            ratio: ratio.to_bits(),
        }
    }

    /// Device pixel ratio.
    pub fn ratio(&self) -> f64 {
        f64::from_bits(self.ratio)
    }
}

/// Tile to compose: its key and pixel rectangle in the web-mercator pixel space of its zoom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileJob {
    /// Key the result is cached under.
    pub key: TileKey,
    /// Pixel rectangle.
    pub rect: Rect,
}

impl TileJob {
    /// Creates a job.
    pub fn new(key: TileKey, rect: Rect) -> Self {
        Self { key, rect }
    }
}

struct Composer {
    map: Arc<MapData>,
    theme: Arc<RenderTheme>,
    renderer: Arc<dyn Renderer>,
    tile_size: f64,
}

impl Composer {
    fn compose(&self, job: &TileJob) -> Pixmap {
        let zoom = job.key.zoom;
        let transform = WebMercatorTransform::new(zoom, self.tile_size);
        compose_tile(
            &self.map,
            &self.theme,
            &*self.renderer,
            &transform,
            job.rect,
            zoom,
            job.key.ratio(),
        )
    }
}

type KeySet = HashSet<TileKey, ahash::RandomState>;

/// Composes tile batches on a bounded pool of blocking workers.
///
/// Results are published to the tile cache when the whole batch is done. Tiles requested while
/// an earlier batch is still producing them are not scheduled again.
pub struct TileScheduler {
    composer: Arc<Composer>,
    tiles: Arc<Cache<TileKey, Pixmap>>,
    in_flight: Arc<Mutex<KeySet>>,
    workers: Arc<Semaphore>,
    worker_count: usize,
    messenger: Option<Arc<dyn Messenger>>,
    runtime: Handle,
}

impl std::fmt::Debug for TileScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileScheduler")
            .field("worker_count", &self.worker_count)
            .field("cached_tiles", &self.tiles.len())
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

impl TileScheduler {
    /// Cached pixmap of the tile.
    pub fn tile(&self, key: &TileKey) -> Option<Pixmap> {
        let tile = self.tiles.get(key);
        log::trace!("Tile cache {} for {key:?}", if tile.is_some() { "hit" } else { "miss" });
        tile
    }

    /// Returns true if a running batch is producing the tile.
    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.in_flight.lock().contains(key)
    }

    /// Map the tiles are composed from.
    pub fn map(&self) -> &Arc<MapData> {
        &self.composer.map
    }

    /// Theme the tiles are composed with.
    pub fn theme(&self) -> &Arc<RenderTheme> {
        &self.composer.theme
    }

    /// Tile size in logical pixels.
    pub fn tile_size(&self) -> f64 {
        self.composer.tile_size
    }

    /// Number of parallel workers.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Drops all cached pixmaps.
    pub fn clear(&self) {
        self.tiles.clear();
    }

    /// Composes a single tile on the calling thread, bypassing the cache.
    pub fn compose_tile(&self, job: &TileJob) -> Pixmap {
        self.composer.compose(job)
    }

    /// Starts composing a batch of tiles.
    ///
    /// Jobs for tiles that are already being produced are dropped. Returns `None` if nothing is
    /// left to do, otherwise a handle resolving to the keys of the batch once all its tiles
    /// are cached. Dropping the handle does not cancel the batch.
    pub fn schedule(&self, jobs: Vec<TileJob>) -> Option<JoinHandle<Vec<TileKey>>> {
        let jobs: Vec<TileJob> = {
            let mut in_flight = self.in_flight.lock();
            jobs.into_iter()
                .filter(|job| in_flight.insert(job.key))
                .collect()
        };
        if jobs.is_empty() {
            return None;
        }

        log::debug!("Scheduling a batch of {} tiles", jobs.len());

        let keys: Vec<TileKey> = jobs.iter().map(|job| job.key).collect();
        let composer = self.composer.clone();
        let workers = self.workers.clone();
        let tiles = self.tiles.clone();
        let in_flight = self.in_flight.clone();
        let messenger = self.messenger.clone();

        Some(self.runtime.spawn(async move {
            let tasks = jobs.into_iter().map(|job| {
                let composer = composer.clone();
                let workers = workers.clone();
                async move {
                    let _permit = workers.acquire_owned().await.ok()?;
                    let key = job.key;
                    match tokio::task::spawn_blocking(move || composer.compose(&job)).await {
                        Ok(pixmap) => Some((key, pixmap)),
                        Err(err) => {
                            log::error!("Composition of tile {key:?} failed: {err}");
                            None
                        }
                    }
                }
            });
            let results = futures::future::join_all(tasks).await;

            for (key, pixmap) in results.into_iter().flatten() {
                if !pixmap.is_empty() {
                    tiles.insert(key, pixmap);
                }
            }

            {
                let mut in_flight = in_flight.lock();
                for key in &keys {
                    in_flight.remove(key);
                }
            }

            log::debug!("Batch of {} tiles is ready", keys.len());
            if let Some(messenger) = messenger {
                messenger.request_redraw();
            }

            keys
        }))
    }
}

/// Constructor for a [`TileScheduler`].
pub struct TileSchedulerBuilder {
    map: Arc<MapData>,
    theme: Arc<RenderTheme>,
    renderer: Arc<dyn Renderer>,
    workers: Option<usize>,
    cache_capacity: usize,
    tile_size: f64,
    messenger: Option<Arc<dyn Messenger>>,
    runtime: Option<Handle>,
}

impl TileSchedulerBuilder {
    /// Starts a builder for the map, theme and renderer.
    pub fn new(map: Arc<MapData>, theme: Arc<RenderTheme>, renderer: Arc<dyn Renderer>) -> Self {
        Self {
            map,
            theme,
            renderer,
            workers: None,
            cache_capacity: DEFAULT_TILE_CACHE_CAPACITY,
            tile_size: DEFAULT_TILE_SIZE,
            messenger: None,
            runtime: None,
        }
    }

    /// Number of tiles composed in parallel. Defaults to the available parallelism.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Capacity of the pixmap cache.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Tile size in logical pixels.
    pub fn with_tile_size(mut self, tile_size: f64) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Messenger notified after every batch.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Arc::new(messenger));
        self
    }

    /// Runtime the batches run on. Defaults to the runtime `build` is called from.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Creates the scheduler.
    pub fn build(self) -> Result<TileScheduler, TesseraError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()
                .map_err(|err| TesseraError::Generic(format!("no tokio runtime: {err}")))?,
        };

        let worker_count = self
            .workers
            .or_else(|| std::thread::available_parallelism().ok().map(NonZeroUsize::get))
            .unwrap_or(1)
            .max(1);

        if self.tile_size.is_nan() || self.tile_size <= 0.0 {
            return Err(TesseraError::Generic(format!(
                "invalid tile size: {}",
                self.tile_size
            )));
        }

        Ok(TileScheduler {
            composer: Arc::new(Composer {
                map: self.map,
                theme: self.theme,
                renderer: self.renderer,
                tile_size: self.tile_size,
            }),
            tiles: Arc::new(Cache::new(self.cache_capacity.max(1))),
            in_flight: Arc::new(Mutex::new(KeySet::default())),
            workers: Arc::new(Semaphore::new(worker_count)),
            worker_count,
            messenger: self.messenger,
            runtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recording::RecordingRenderer;
    use crate::render::Canvas;
    use crate::test_utils::prague_map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Blocks canvas creation while the gate is locked.
    #[derive(Clone)]
    struct GatedRenderer {
        inner: RecordingRenderer,
        gate: Arc<Mutex<()>>,
    }

    impl Renderer for GatedRenderer {
        fn create_canvas(&self, width: u32, height: u32, ratio: f64) -> Box<dyn Canvas> {
            let _open = self.gate.lock();
            self.inner.create_canvas(width, height, ratio)
        }
    }

    fn job(x: u32, y: u32) -> TileJob {
        let rect = WebMercatorTransform::new(14, DEFAULT_TILE_SIZE).tile_rect(x, y);
        TileJob::new(TileKey::new(x, y, 14, 1.0), rect)
    }

    #[test]
    fn tile_key_keeps_ratio() {
        let key = TileKey::new(1, 2, 3, 1.5);
        assert_eq!(key.ratio(), 1.5);
        assert_ne!(key, TileKey::new(1, 2, 3, 2.0));
    }

    #[test]
    fn build_requires_runtime() {
        let builder = TileSchedulerBuilder::new(
            prague_map(),
            Arc::new(RenderTheme::builtin()),
            Arc::new(RecordingRenderer::new()),
        );
        assert!(builder.build().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_tiles_are_composed_once() {
        let renderer = GatedRenderer {
            inner: RecordingRenderer::new(),
            gate: Arc::new(Mutex::new(())),
        };
        let redraws = Arc::new(AtomicUsize::new(0));
        let counter = redraws.clone();
        let scheduler = TileSchedulerBuilder::new(
            prague_map(),
            Arc::new(RenderTheme::builtin()),
            Arc::new(renderer.clone()),
        )
        .with_workers(2)
        .with_messenger(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .build()
        .unwrap();

        let tile = job(8848, 5550);
        let gate = renderer.gate.lock();
        let batch = scheduler.schedule(vec![tile, tile]).unwrap();
        assert!(scheduler.is_in_flight(&tile.key));
        assert!(scheduler.schedule(vec![tile]).is_none());
        assert!(scheduler.tile(&tile.key).is_none());
        drop(gate);

        let keys = batch.await.unwrap();
        assert_eq!(keys, [tile.key]);
        assert_eq!(renderer.inner.finished_count(), 1);
        assert_eq!(redraws.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_in_flight(&tile.key));

        let pixmap = scheduler.tile(&tile.key).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (256, 256));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn batch_is_published_at_once() {
        let _ = env_logger::builder().is_test(true).try_init();
        let renderer = RecordingRenderer::new();
        let scheduler = TileSchedulerBuilder::new(
            prague_map(),
            Arc::new(RenderTheme::builtin()),
            Arc::new(renderer.clone()),
        )
        .with_workers(3)
        .build()
        .unwrap();

        let jobs: Vec<_> = (0..3)
            .flat_map(|dx| (0..3).map(move |dy| job(8847 + dx, 5549 + dy)))
            .collect();
        let batch = scheduler.schedule(jobs.clone()).unwrap();
        let keys = batch.await.unwrap();

        assert_eq!(keys.len(), 9);
        assert_eq!(renderer.finished_count(), 9);
        assert!(jobs.iter().all(|job| scheduler.tile(&job.key).is_some()));

        // Finished tiles can be scheduled again.
        let again = scheduler.schedule(vec![jobs[0]]).unwrap();
        again.await.unwrap();
        assert_eq!(renderer.finished_count(), 10);

        scheduler.clear();
        assert!(scheduler.tile(&jobs[0].key).is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_pixmaps_are_not_cached() {
        let scheduler = TileSchedulerBuilder::new(
            prague_map(),
            Arc::new(RenderTheme::builtin()),
            Arc::new(RecordingRenderer::new()),
        )
        .build()
        .unwrap();

        let key = TileKey::new(0, 0, 14, 1.0);
        let empty = TileJob::new(key, Rect::new(0.0, 0.0, 0.0, 0.0));
        scheduler.schedule(vec![empty]).unwrap().await.unwrap();
        assert!(scheduler.tile(&key).is_none());
        assert!(!scheduler.is_in_flight(&key));
    }
}
