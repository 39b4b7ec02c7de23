use rstar::{RTree, RTreeObject, AABB};
use tessera_types::mercator::{ll2tile, tile2ll, tile_bounds};
use tessera_types::{Coordinates, Rect};

use crate::error::MapsforgeError;
use crate::header::SubFileInfo;
use crate::source::MapSource;
use crate::subfile::SubFile;

/// Payload bits of a tile index pointer. The top bit marks tiles covered by water.
pub const OFFSET_MASK: u64 = 0x7F_FFFF_FFFF;

const POINTER_SIZE: usize = 5;

/// Non-empty tile of a zoom band.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedTile {
    /// Tile column at the band's base zoom.
    pub x: u32,
    /// Tile row at the band's base zoom.
    pub y: u32,
    /// Offset of the tile data from the start of the band.
    pub offset: u64,
    /// Size of the tile data.
    pub size: u64,
    /// Geographic bounds of the tile.
    pub bounds: Rect,
    /// North-west corner of the tile. Entity coordinates are stored relative to it.
    pub anchor: Coordinates,
}

impl RTreeObject for IndexedTile {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.x_min, self.bounds.y_min],
            [self.bounds.x_max, self.bounds.y_max],
        )
    }
}

/// Spatial index of the non-empty tiles of one zoom band.
#[derive(Debug)]
pub struct BandIndex {
    tree: RTree<IndexedTile>,
}

impl BandIndex {
    /// Reads the tile pointer table at the start of the band.
    ///
    /// Pointers are laid out row by row over the base-zoom tiles covering `bounds`. A tile whose
    /// pointer equals the next one has no data.
    pub fn read(
        source: &dyn MapSource,
        band: usize,
        info: &SubFileInfo,
        bounds: &Rect,
    ) -> Result<Self, MapsforgeError> {
        let (x_min, y_min) = ll2tile(&Coordinates::new(bounds.x_min, bounds.y_max), info.base);
        let (x_max, y_max) = ll2tile(&Coordinates::new(bounds.x_max, bounds.y_min), info.base);
        let columns = u64::from(x_max.saturating_sub(x_min)) + 1;
        let rows = u64::from(y_max.saturating_sub(y_min)) + 1;
        let table_size = columns
            .checked_mul(rows)
            .and_then(|count| count.checked_mul(POINTER_SIZE as u64))
            .filter(|size| *size <= info.size)
            .ok_or_else(|| {
                MapsforgeError::InvalidHeader(format!(
                    "index of {columns}x{rows} tiles in zoom band {band} exceeds the band size {}",
                    info.size
                ))
            })?;
        let count = columns * rows;

        let data = source.read_at(info.offset, table_size as usize)?;
        let mut pointers = SubFile::new(data);

        let mut located = Vec::new();
        let mut offset = read_pointer(&mut pointers, band, info)?;
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                if y == y_max && x == x_max {
                    located.push((x, y, offset));
                    continue;
                }

                let next = read_pointer(&mut pointers, band, info)?;
                if next == offset {
                    continue;
                }

                located.push((x, y, offset));
                offset = next;
            }
        }

        let mut tiles = Vec::with_capacity(located.len());
        for (i, &(x, y, offset)) in located.iter().enumerate() {
            let end = located.get(i + 1).map_or(info.size, |next| next.2);
            let size = end
                .checked_sub(offset)
                .ok_or(MapsforgeError::InvalidOffset { band, offset: end })?;
            if size == 0 {
                continue;
            }

            tiles.push(IndexedTile {
                x,
                y,
                offset,
                size,
                bounds: tile_bounds(x, y, info.base),
                anchor: tile2ll(x, y, info.base),
            });
        }

        log::debug!(
            "Zoom band {band} (base {}): {} of {count} tiles have data",
            info.base,
            tiles.len()
        );

        Ok(Self {
            tree: RTree::bulk_load(tiles),
        })
    }

    /// Tiles intersecting the rectangle, in row-major order.
    pub fn locate(&self, rect: &Rect) -> Vec<&IndexedTile> {
        let envelope = AABB::from_corners([rect.x_min, rect.y_min], [rect.x_max, rect.y_max]);
        let mut tiles: Vec<_> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .collect();
        tiles.sort_by_key(|tile| (tile.y, tile.x));
        tiles
    }
}

fn read_pointer(
    pointers: &mut SubFile,
    band: usize,
    info: &SubFileInfo,
) -> Result<u64, MapsforgeError> {
    let offset = pointers.read_u40()? & OFFSET_MASK;
    if offset > info.size {
        return Err(MapsforgeError::InvalidOffset { band, offset });
    }

    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use assert_matches::assert_matches;

    fn band(size: u64) -> SubFileInfo {
        SubFileInfo {
            base: 1,
            min: 0,
            max: 5,
            offset: 0,
            size,
        }
    }

    fn pointers(offsets: &[u64]) -> MemorySource {
        let mut data = Vec::new();
        for offset in offsets {
            data.extend_from_slice(&offset.to_be_bytes()[3..]);
        }
        MemorySource::new(data)
    }

    // Two tiles at zoom 1: (0, 0) and (1, 0)
    const BOUNDS: Rect = Rect {
        x_min: -170.0,
        y_min: 10.0,
        x_max: 170.0,
        y_max: 80.0,
    };

    #[test]
    fn repeated_offset_marks_empty_tile() {
        let index = BandIndex::read(&pointers(&[10, 10]), 0, &band(30), &BOUNDS).unwrap();
        let tiles = index.locate(&BOUNDS);
        assert_eq!(tiles.len(), 1);
        assert_eq!((tiles[0].x, tiles[0].y), (1, 0));
        assert_eq!(tiles[0].offset, 10);
        assert_eq!(tiles[0].size, 20);
        assert_eq!(tiles[0].anchor, Coordinates::new(0.0, tiles[0].bounds.y_max));
    }

    #[test]
    fn tile_sizes_follow_next_offset() {
        let index = BandIndex::read(&pointers(&[10, 14]), 0, &band(30), &BOUNDS).unwrap();
        let sizes: Vec<_> = index.locate(&BOUNDS).iter().map(|t| t.size).collect();
        assert_eq!(sizes, vec![4, 16]);
    }

    #[test]
    fn water_bit_is_masked() {
        let index =
            BandIndex::read(&pointers(&[10 | 0x80_0000_0000, 14]), 0, &band(30), &BOUNDS).unwrap();
        assert_eq!(index.locate(&BOUNDS)[0].offset, 10);
    }

    #[test]
    fn offset_past_band_is_format_error() {
        assert_matches!(
            BandIndex::read(&pointers(&[10, 40]), 3, &band(30), &BOUNDS),
            Err(MapsforgeError::InvalidOffset { band: 3, offset: 40 })
        );
    }

    #[test]
    fn index_larger_than_band_is_format_error() {
        let world = Rect::new(-180.0, -85.0, 180.0, 85.0);
        let info = SubFileInfo {
            base: 25,
            ..band(30)
        };
        assert_matches!(
            BandIndex::read(&pointers(&[10, 14]), 0, &info, &world),
            Err(MapsforgeError::InvalidHeader(_))
        );

        let info = SubFileInfo {
            base: 31,
            ..band(u64::MAX)
        };
        assert_matches!(
            BandIndex::read(&pointers(&[10, 14]), 0, &info, &world),
            Err(MapsforgeError::InvalidHeader(_))
        );
    }

    #[test]
    fn locate_filters_by_rect() {
        let index = BandIndex::read(&pointers(&[10, 14]), 0, &band(30), &BOUNDS).unwrap();
        let west = index.locate(&Rect::new(-100.0, 20.0, -90.0, 30.0));
        assert_eq!(west.len(), 1);
        assert_eq!(west[0].x, 0);
        assert!(index.locate(&Rect::new(-100.0, -30.0, -90.0, -20.0)).is_empty());
    }
}
