use bytes::Bytes;
use tessera_types::Coordinates;

use crate::entity::{Path, Point};
use crate::error::MapsforgeError;
use crate::geometry::{read_polygon, DeltaEncoding};
use crate::header::SubFileInfo;
use crate::index::IndexedTile;
use crate::subfile::SubFile;
use crate::tags::{Tag, TagTable};

const POI_FEATURE_NAME: u8 = 0x80;
const POI_FEATURE_HOUSE_NUMBER: u8 = 0x40;
const POI_FEATURE_ELEVATION: u8 = 0x20;

const WAY_FEATURE_NAME: u8 = 0x80;
const WAY_FEATURE_HOUSE_NUMBER: u8 = 0x40;
const WAY_FEATURE_REF: u8 = 0x20;
const WAY_FEATURE_LABEL_POSITION: u8 = 0x10;
const WAY_FEATURE_DATA_BLOCKS: u8 = 0x08;
const WAY_FEATURE_DOUBLE_DELTA: u8 = 0x04;

const LAYER_SHIFT: u8 = 4;
const TAG_COUNT_MASK: u8 = 0x0F;

/// Per-zoom entity counts at the start of a tile.
struct ZoomTable {
    points: Vec<u32>,
    paths: Vec<u32>,
}

impl ZoomTable {
    /// Reads one `(points, paths)` pair per zoom level of the band and accumulates them, so that
    /// the entry for a zoom level counts all entities visible at that level.
    fn read(subfile: &mut SubFile, info: &SubFileInfo) -> Result<Self, MapsforgeError> {
        let rows = (info.max - info.min) as usize + 1;
        let mut points = Vec::with_capacity(rows);
        let mut paths = Vec::with_capacity(rows);
        let mut point_count = 0u32;
        let mut path_count = 0u32;
        for _ in 0..rows {
            point_count = point_count
                .checked_add(subfile.read_vu32()?)
                .ok_or_else(|| inconsistent_table(subfile))?;
            path_count = path_count
                .checked_add(subfile.read_vu32()?)
                .ok_or_else(|| inconsistent_table(subfile))?;
            points.push(point_count);
            paths.push(path_count);
        }

        Ok(Self { points, paths })
    }

    fn row(info: &SubFileInfo, zoom: u8) -> usize {
        (zoom.clamp(info.min, info.max) - info.min) as usize
    }
}

fn inconsistent_table(subfile: &SubFile) -> MapsforgeError {
    MapsforgeError::InvalidRecord(format!(
        "entity count overflow in zoom table at position {}",
        subfile.pos()
    ))
}

/// Decodes the points of a tile visible at `zoom`.
///
/// `data` holds exactly the tile's bytes.
pub fn read_points(
    data: Bytes,
    tile: &IndexedTile,
    info: &SubFileInfo,
    zoom: u8,
    tags: &TagTable,
) -> Result<Vec<Point>, MapsforgeError> {
    let mut subfile = SubFile::new(data);
    let table = ZoomTable::read(&mut subfile, info)?;
    let count = table.points[ZoomTable::row(info, zoom)];

    // offset of the first way, not needed for points
    subfile.read_vu32()?;

    let mut points = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        points.push(read_point(&mut subfile, &tile.anchor, tags)?);
    }

    Ok(points)
}

fn read_point(
    subfile: &mut SubFile,
    anchor: &Coordinates,
    dictionary: &TagTable,
) -> Result<Point, MapsforgeError> {
    let lat = subfile.read_vs32()?;
    let lon = subfile.read_vs32()?;
    let coordinates = Coordinates::new(
        anchor.lon + lon as f64 / 1e6,
        anchor.lat + lat as f64 / 1e6,
    );

    let special = subfile.read_u8()?;
    let layer = special >> LAYER_SHIFT;
    let mut tags = dictionary.read_tags(subfile, (special & TAG_COUNT_MASK) as usize)?;

    let flags = subfile.read_u8()?;
    if flags & POI_FEATURE_NAME != 0 {
        tags.push(Tag::new("name", read_name(subfile)?));
    }
    if flags & POI_FEATURE_HOUSE_NUMBER != 0 {
        tags.push(Tag::new("addr:housenumber", subfile.read_string()?));
    }
    if flags & POI_FEATURE_ELEVATION != 0 {
        tags.push(Tag::new("ele", subfile.read_vs32()?.to_string()));
    }

    Ok(Point::new(coordinates, layer, tags))
}

/// Decodes the paths of a tile visible at `zoom`.
///
/// A record with several geometry blocks yields one path per block, all sharing the record's
/// tags.
pub fn read_paths(
    data: Bytes,
    tile: &IndexedTile,
    info: &SubFileInfo,
    zoom: u8,
    tags: &TagTable,
) -> Result<Vec<Path>, MapsforgeError> {
    let mut subfile = SubFile::new(data);
    let table = ZoomTable::read(&mut subfile, info)?;
    let count = table.paths[ZoomTable::row(info, zoom)];

    let points_size = subfile.read_vu32()? as usize;
    subfile.skip(points_size)?;

    let mut paths = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        read_path_record(&mut subfile, &tile.anchor, tags, &mut paths)?;
    }

    Ok(paths)
}

fn read_path_record(
    subfile: &mut SubFile,
    anchor: &Coordinates,
    dictionary: &TagTable,
    paths: &mut Vec<Path>,
) -> Result<(), MapsforgeError> {
    // record size and sub-tile bitmap
    subfile.read_vu32()?;
    subfile.read_u16()?;

    let special = subfile.read_u8()?;
    let layer = special >> LAYER_SHIFT;
    let mut tags = dictionary.read_tags(subfile, (special & TAG_COUNT_MASK) as usize)?;

    let flags = subfile.read_u8()?;
    if flags & WAY_FEATURE_NAME != 0 {
        tags.push(Tag::new("name", read_name(subfile)?));
    }
    if flags & WAY_FEATURE_HOUSE_NUMBER != 0 {
        tags.push(Tag::new("addr:housenumber", subfile.read_string()?));
    }
    if flags & WAY_FEATURE_REF != 0 {
        tags.push(Tag::new("ref", subfile.read_string()?));
    }

    let label_offset = if flags & WAY_FEATURE_LABEL_POSITION != 0 {
        let lat = subfile.read_vs32()?;
        let lon = subfile.read_vs32()?;
        Some((lon, lat))
    } else {
        None
    };

    let blocks = if flags & WAY_FEATURE_DATA_BLOCKS != 0 {
        subfile.read_vu32()?
    } else {
        1
    };
    let encoding = if flags & WAY_FEATURE_DOUBLE_DELTA != 0 {
        DeltaEncoding::Double
    } else {
        DeltaEncoding::Single
    };

    let mut polygons = Vec::with_capacity(blocks.min(64) as usize);
    for _ in 0..blocks {
        polygons.push(read_polygon(subfile, anchor, encoding)?);
    }

    // relative to the first node of the first block
    let label_pos = match (label_offset, polygons.first().and_then(|p| p.first_vertex())) {
        (Some((lon, lat)), Some(first)) => Some(Coordinates::new(
            first.lon + lon as f64 / 1e6,
            first.lat + lat as f64 / 1e6,
        )),
        _ => None,
    };

    let mut decoded: Vec<Path> = polygons
        .into_iter()
        .map(|polygon| Path::new(layer, tags.clone(), polygon, label_pos))
        .collect();
    paths.append(&mut decoded);
    Ok(())
}

/// Names may carry alternatives separated by `\r`, only the first one is kept.
fn read_name(subfile: &mut SubFile) -> Result<String, MapsforgeError> {
    let mut name = subfile.read_string()?;
    if let Some(end) = name.find('\r') {
        name.truncate(end);
    }

    Ok(name)
}
