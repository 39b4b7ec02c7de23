//! Reader for mapsforge binary OSM map files.
//!
//! ```no_run
//! use tessera_mapsforge::MapData;
//! use tessera_types::Rect;
//!
//! let map = MapData::open("prague.map");
//! if !map.is_valid() {
//!     eprintln!("{}", map.error_string());
//! }
//!
//! let (points, paths) = map.entities_in_rect(&Rect::new(14.4, 50.0, 14.5, 50.1), 15);
//! ```

mod decoder;
mod entity;
pub mod error;
mod geometry;
mod header;
mod index;
mod map_data;
mod source;
mod subfile;
mod tags;

#[cfg(any(test, feature = "_tests"))]
pub mod writer;

pub use entity::{place_rank, Path, Point};
pub use error::MapsforgeError;
pub use geometry::{read_polygon, DeltaEncoding};
pub use header::{MapInfo, SubFileInfo, MAGIC, PROJECTION};
pub use index::{IndexedTile, OFFSET_MASK};
pub use map_data::{MapData, MapDataOptions};
pub use source::{FileSource, MapSource, MemorySource};
pub use subfile::SubFile;
pub use tags::{Tag, TagTable};
