use serde::{Deserialize, Serialize};
use tessera_types::mercator::clamp_to_world;
use tessera_types::{Coordinates, Rect};

use crate::error::MapsforgeError;
use crate::source::MapSource;
use crate::subfile::SubFile;
use crate::tags::TagTable;

/// Signature at the start of every map file.
pub const MAGIC: &[u8] = b"mapsforge binary OSM";

/// The only supported projection.
pub const PROJECTION: &str = "Mercator";

const FLAG_DEBUG: u8 = 0x80;
const FLAG_START_POSITION: u8 = 0x40;
const FLAG_START_ZOOM: u8 = 0x20;
const FLAG_LANGUAGE: u8 = 0x10;
const FLAG_COMMENT: u8 = 0x08;
const FLAG_CREATED_BY: u8 = 0x04;

/// Data region of one zoom band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFileInfo {
    /// Zoom level of the tile grid the band is indexed by.
    pub base: u8,
    /// Lowest zoom level served by the band.
    pub min: u8,
    /// Highest zoom level served by the band.
    pub max: u8,
    /// Absolute file offset of the band.
    pub offset: u64,
    /// Size of the band in bytes.
    pub size: u64,
}

/// Metadata stored in the map header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    /// File format version.
    pub version: u32,
    /// Declared file size.
    pub file_size: u64,
    /// Creation date, milliseconds since the Unix epoch.
    pub date: u64,
    /// Bounding box of the map data, clamped to the tile grid.
    pub bounds: Rect,
    /// Tile size in pixels the map was made for.
    pub tile_size: u16,
    /// Projection name.
    pub projection: String,
    /// Suggested initial position.
    pub start_position: Option<Coordinates>,
    /// Suggested initial zoom level.
    pub start_zoom: Option<u8>,
    /// Preferred language(s) of names.
    pub language: Option<String>,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Name of the program that created the file.
    pub created_by: Option<String>,
    /// Zoom bands in file order.
    pub subfiles: Vec<SubFileInfo>,
}

/// Parsed header: metadata and tag dictionaries.
#[derive(Debug, Clone)]
pub struct MapHeader {
    pub info: MapInfo,
    pub point_tags: TagTable,
    pub path_tags: TagTable,
}

impl MapHeader {
    /// Reads and validates the header.
    pub fn read(source: &dyn MapSource) -> Result<Self, MapsforgeError> {
        let prefix = source
            .read_at(0, MAGIC.len() + 4)
            .map_err(|_| MapsforgeError::InvalidMagic)?;
        if &prefix[..MAGIC.len()] != MAGIC {
            return Err(MapsforgeError::InvalidMagic);
        }

        let mut prefix = SubFile::new(prefix);
        prefix.seek(MAGIC.len())?;
        let header_size = prefix.read_u32()?;
        let available = source.size()?.saturating_sub(prefix.len() as u64);
        if u64::from(header_size) > available {
            return Err(MapsforgeError::InvalidHeader(format!(
                "header size {header_size} exceeds the {available} bytes after the signature"
            )));
        }

        let data = source.read_at(prefix.len() as u64, header_size as usize)?;
        Self::parse(&mut SubFile::new(data)).map_err(|err| match err {
            MapsforgeError::UnexpectedEnd(pos) => {
                MapsforgeError::InvalidHeader(format!("truncated at position {pos}"))
            }
            err => err,
        })
    }

    fn parse(subfile: &mut SubFile) -> Result<Self, MapsforgeError> {
        let version = subfile.read_u32()?;
        let file_size = subfile.read_u64()?;
        let date = subfile.read_u64()?;
        let min_lat = subfile.read_i32()?;
        let min_lon = subfile.read_i32()?;
        let max_lat = subfile.read_i32()?;
        let max_lon = subfile.read_i32()?;
        let tile_size = subfile.read_u16()?;
        let projection = subfile.read_string()?;
        let flags = subfile.read_u8()?;

        if projection != PROJECTION {
            return Err(MapsforgeError::UnsupportedProjection(projection));
        }
        if flags & FLAG_DEBUG != 0 {
            return Err(MapsforgeError::DebugFile);
        }

        let start_position = if flags & FLAG_START_POSITION != 0 {
            let lat = subfile.read_i32()?;
            let lon = subfile.read_i32()?;
            Some(Coordinates::from_microdegrees(lon as i64, lat as i64))
        } else {
            None
        };
        let start_zoom = match flags & FLAG_START_ZOOM {
            0 => None,
            _ => Some(subfile.read_u8()?),
        };
        let language = read_optional_string(subfile, flags, FLAG_LANGUAGE)?;
        let comment = read_optional_string(subfile, flags, FLAG_COMMENT)?;
        let created_by = read_optional_string(subfile, flags, FLAG_CREATED_BY)?;

        let point_tags = read_tag_table(subfile)?;
        let path_tags = read_tag_table(subfile)?;

        let zoom_count = subfile.read_u8()?;
        if zoom_count == 0 {
            return Err(MapsforgeError::InvalidHeader(
                "no zoom intervals".to_string(),
            ));
        }

        let mut subfiles = Vec::with_capacity(zoom_count as usize);
        for _ in 0..zoom_count {
            let info = SubFileInfo {
                base: subfile.read_u8()?,
                min: subfile.read_u8()?,
                max: subfile.read_u8()?,
                offset: subfile.read_u64()?,
                size: subfile.read_u64()?,
            };
            validate_subfile(&info, file_size)?;
            subfiles.push(info);
        }

        let bounds = Rect::new(
            min_lon as f64 / 1e6,
            min_lat as f64 / 1e6,
            max_lon as f64 / 1e6,
            max_lat as f64 / 1e6,
        );

        Ok(Self {
            info: MapInfo {
                version,
                file_size,
                date,
                bounds: clamp_to_world(&bounds),
                tile_size,
                projection,
                start_position,
                start_zoom,
                language,
                comment,
                created_by,
                subfiles,
            },
            point_tags,
            path_tags,
        })
    }
}

fn read_optional_string(
    subfile: &mut SubFile,
    flags: u8,
    flag: u8,
) -> Result<Option<String>, MapsforgeError> {
    if flags & flag == 0 {
        return Ok(None);
    }

    subfile.read_string().map(Some)
}

fn read_tag_table(subfile: &mut SubFile) -> Result<TagTable, MapsforgeError> {
    let count = subfile.read_u16()?;
    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        entries.push(subfile.read_string()?);
    }

    Ok(TagTable::new(entries.iter().map(String::as_str)))
}

fn validate_subfile(info: &SubFileInfo, file_size: u64) -> Result<(), MapsforgeError> {
    if info.min > info.max {
        return Err(MapsforgeError::InvalidHeader(format!(
            "invalid zoom interval {}-{}",
            info.min, info.max
        )));
    }
    if info.base > 31 {
        return Err(MapsforgeError::InvalidHeader(format!(
            "invalid base zoom {}",
            info.base
        )));
    }

    match info.offset.checked_add(info.size) {
        Some(end) if end <= file_size => Ok(()),
        _ => Err(MapsforgeError::InvalidHeader(format!(
            "zoom interval at {} with size {} exceeds file size {file_size}",
            info.offset, info.size
        ))),
    }
}

/// Returns true if the data starts with the map file signature.
pub fn has_magic(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}
