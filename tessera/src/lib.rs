//! Tessera renders raster map tiles offline from mapsforge binary maps.
//!
//! A [`MapData`](tessera_mapsforge::MapData) provides the entities of a tile, a
//! [`RenderTheme`](theme::RenderTheme) decides how each of them is drawn, and the
//! [`TileCompositor`](compositor::TileCompositor) draws them onto a [`Canvas`](render::Canvas)
//! created by your [`Renderer`](render::Renderer).
//!
//! # Quick start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use tessera::theme::RenderTheme;
//! use tessera::MapsforgeMap;
//! use tessera_mapsforge::MapData;
//! # use tessera::render::{Canvas, Renderer};
//! # struct MyRenderer;
//! # impl Renderer for MyRenderer {
//! #     fn create_canvas(&self, _: u32, _: u32, _: f64) -> Box<dyn Canvas> { unimplemented!() }
//! # }
//!
//! # tokio_test::block_on(async {
//! let data = Arc::new(MapData::open("czech-republic.map"));
//! let theme = Arc::new(RenderTheme::load_or_default(Some(Path::new("theme.json"))));
//! let map = MapsforgeMap::new(data, theme, Arc::new(MyRenderer))?;
//!
//! let rect = tessera_types::Rect::new(2265088.0, 1420800.0, 2265600.0, 1421312.0);
//! let result = map.draw(&rect, 14, 1.0);
//! if let Some(pending) = result.pending {
//!     pending.await?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! # Threading
//!
//! Tiles are composed in batches on tokio's blocking pool, bounded by the number of workers
//! configured in [`TileSchedulerBuilder`]. Finished batches are stored in a pixmap cache and
//! announced through a [`Messenger`].

#![warn(clippy::unwrap_used)]
#![warn(missing_docs)]

mod color;
pub mod compositor;
pub mod error;
mod map;
mod messenger;
pub mod render;
pub mod scheduler;
pub mod theme;

#[cfg(test)]
mod test_utils;

pub use color::Color;
pub use map::{DrawResult, MapsforgeMap};
pub use messenger::Messenger;
pub use scheduler::{TileJob, TileKey, TileScheduler, TileSchedulerBuilder};

// Reexport the crates the public API is built on
pub use tessera_mapsforge;
pub use tessera_types;
