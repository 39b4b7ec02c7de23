//! Encoder producing map files in the binary format read by this crate.
//!
//! Meant for building test fixtures, so it favours simplicity over compactness: every entity is
//! stored in the tile that contains its first vertex, sub-tile bitmaps are always full and no
//! water flags are written.

use std::path::Path as FsPath;

use tessera_types::mercator::{ll2tile, tile2ll};
use tessera_types::{Coordinates, Polygon, Rect};

use crate::error::MapsforgeError;
use crate::geometry::DeltaEncoding;
use crate::header::{MAGIC, PROJECTION};

/// Growable big-endian buffer with mapsforge varint support.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Appends a byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Appends a big-endian `u16`.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a big-endian `i32`.
    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a big-endian `u64`.
    pub fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends the low 5 bytes of the value, as used by tile index pointers.
    pub fn put_u40(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes()[3..]);
    }

    /// Appends an unsigned variable-length integer.
    pub fn put_vu32(&mut self, mut value: u32) {
        while value >= 0x80 {
            self.buf.push((value & 0x7F) as u8 | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    /// Appends a signed variable-length integer. The sign is bit 6 of the last byte.
    pub fn put_vs32(&mut self, value: i32) {
        let sign = if value < 0 { 0x40 } else { 0 };
        let mut magnitude = value.unsigned_abs();
        while magnitude >= 0x40 {
            self.buf.push((magnitude & 0x7F) as u8 | 0x80);
            magnitude >>= 7;
        }
        self.buf.push(magnitude as u8 | sign);
    }

    /// Appends a UTF-8 string prefixed with its byte length.
    pub fn put_string(&mut self, value: &str) {
        self.put_vu32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Appends raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// True if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the written bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

fn microdegrees(value: f64) -> i32 {
    (value * 1e6).round() as i32
}

/// Writes one geometry block relative to the tile anchor.
pub fn write_polygon(
    writer: &mut ByteWriter,
    polygon: &Polygon,
    anchor: &Coordinates,
    encoding: DeltaEncoding,
) {
    writer.put_vu32(polygon.rings().len() as u32);
    for ring in polygon.rings() {
        writer.put_vu32(ring.len() as u32);

        let offsets: Vec<(i32, i32)> = ring
            .iter()
            .map(|c| (microdegrees(c.lat - anchor.lat), microdegrees(c.lon - anchor.lon)))
            .collect();
        let mut prev = (0, 0);
        let mut prev_step = (0, 0);
        for (i, &(lat, lon)) in offsets.iter().enumerate() {
            if i == 0 {
                writer.put_vs32(lat);
                writer.put_vs32(lon);
            } else {
                let step = (lat - prev.0, lon - prev.1);
                match encoding {
                    DeltaEncoding::Single => {
                        writer.put_vs32(step.0);
                        writer.put_vs32(step.1);
                    }
                    DeltaEncoding::Double => {
                        writer.put_vs32(step.0 - prev_step.0);
                        writer.put_vs32(step.1 - prev_step.1);
                    }
                }
                prev_step = step;
            }
            prev = (lat, lon);
        }
    }
}

/// Point to be written.
#[derive(Debug, Clone, Default)]
pub struct PointRecord {
    /// Position of the point.
    pub coordinates: Coordinates,
    /// Layer as stored in the file, the OSM layer plus 5.
    pub layer: u8,
    /// Tags in `key=value` form. Must be declared in the point dictionary, either literally or
    /// with a `%` value template for the key.
    pub tags: Vec<String>,
    /// Value of the `name` tag.
    pub name: Option<String>,
    /// Value of the `addr:housenumber` tag.
    pub house_number: Option<String>,
    /// Value of the `ele` tag, in meters.
    pub elevation: Option<i32>,
    /// Lowest zoom level the point is visible at.
    pub min_zoom: u8,
}

/// Way to be written.
#[derive(Debug, Clone, Default)]
pub struct PathRecord {
    /// Layer as stored in the file, the OSM layer plus 5.
    pub layer: u8,
    /// Tags in `key=value` form, see [`PointRecord::tags`].
    pub tags: Vec<String>,
    /// Geometry blocks. More than one block sets the multi-block flag.
    pub blocks: Vec<Polygon>,
    /// Value of the `name` tag.
    pub name: Option<String>,
    /// Value of the `addr:housenumber` tag.
    pub house_number: Option<String>,
    /// Value of the `ref` tag.
    pub reference: Option<String>,
    /// Position of the area label.
    pub label_pos: Option<Coordinates>,
    /// Encodes the geometry with double delta coding.
    pub double_delta: bool,
    /// Lowest zoom level the path is visible at.
    pub min_zoom: u8,
}

/// Zoom band to be written.
#[derive(Debug, Clone, Copy)]
pub struct BandSpec {
    /// Zoom level of the band's tile grid.
    pub base: u8,
    /// Lowest zoom level served by the band.
    pub min: u8,
    /// Highest zoom level served by the band.
    pub max: u8,
}

/// Builder for a complete map file.
#[derive(Debug, Clone)]
pub struct MapWriter {
    /// Bounding box written to the header.
    pub bounds: Rect,
    /// Tile size in pixels.
    pub tile_size: u16,
    /// Projection name.
    pub projection: String,
    /// Sets the debug flag.
    pub debug: bool,
    /// Creation date, milliseconds since the Unix epoch.
    pub date: u64,
    /// Suggested initial position.
    pub start_position: Option<Coordinates>,
    /// Suggested initial zoom level.
    pub start_zoom: Option<u8>,
    /// Preferred language of names.
    pub language: Option<String>,
    /// Free-form comment.
    pub comment: Option<String>,
    /// Name of the program that created the file.
    pub created_by: Option<String>,
    /// Point tag dictionary, `key=value` entries or value templates such as `key=%s`.
    pub point_tags: Vec<String>,
    /// Path tag dictionary, see `point_tags`.
    pub path_tags: Vec<String>,
    /// Zoom bands in file order.
    pub bands: Vec<BandSpec>,
    /// Points to write.
    pub points: Vec<PointRecord>,
    /// Ways to write.
    pub paths: Vec<PathRecord>,
}

impl MapWriter {
    /// Creates an empty map covering the bounds, with a single band.
    pub fn new(bounds: Rect) -> Self {
        Self {
            bounds,
            tile_size: 256,
            projection: PROJECTION.to_string(),
            debug: false,
            date: 1_700_000_000_000,
            start_position: None,
            start_zoom: None,
            language: None,
            comment: None,
            created_by: None,
            point_tags: vec![],
            path_tags: vec![],
            bands: vec![BandSpec {
                base: 14,
                min: 12,
                max: 21,
            }],
            points: vec![],
            paths: vec![],
        }
    }

    /// Encodes the map.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MapsforgeError> {
        let mut bands = Vec::with_capacity(self.bands.len());
        for band in &self.bands {
            bands.push(self.encode_band(band)?);
        }

        let placeholder = self.encode_header(&bands, 0)?;
        let data_start = (MAGIC.len() + 4 + placeholder.len()) as u64;
        let header = self.encode_header(&bands, data_start)?;

        let mut writer = ByteWriter::default();
        writer.put_bytes(MAGIC);
        writer.put_u32(header.len() as u32);
        writer.put_bytes(&header);
        for band in &bands {
            writer.put_bytes(band);
        }

        Ok(writer.into_vec())
    }

    /// Encodes the map into a file.
    pub fn write_to(&self, path: impl AsRef<FsPath>) -> Result<(), MapsforgeError> {
        std::fs::write(path, self.to_bytes()?)?;
        Ok(())
    }

    fn encode_header(&self, bands: &[Vec<u8>], data_start: u64) -> Result<Vec<u8>, MapsforgeError> {
        let file_size = data_start + bands.iter().map(|b| b.len() as u64).sum::<u64>();

        let mut writer = ByteWriter::default();
        writer.put_u32(5);
        writer.put_u64(file_size);
        writer.put_u64(self.date);
        writer.put_i32(microdegrees(self.bounds.y_min));
        writer.put_i32(microdegrees(self.bounds.x_min));
        writer.put_i32(microdegrees(self.bounds.y_max));
        writer.put_i32(microdegrees(self.bounds.x_max));
        writer.put_u16(self.tile_size);
        writer.put_string(&self.projection);

        let mut flags = 0;
        if self.debug {
            flags |= 0x80;
        }
        if self.start_position.is_some() {
            flags |= 0x40;
        }
        if self.start_zoom.is_some() {
            flags |= 0x20;
        }
        if self.language.is_some() {
            flags |= 0x10;
        }
        if self.comment.is_some() {
            flags |= 0x08;
        }
        if self.created_by.is_some() {
            flags |= 0x04;
        }
        writer.put_u8(flags);

        if let Some(position) = self.start_position {
            writer.put_i32(microdegrees(position.lat));
            writer.put_i32(microdegrees(position.lon));
        }
        if let Some(zoom) = self.start_zoom {
            writer.put_u8(zoom);
        }
        for value in [&self.language, &self.comment, &self.created_by]
            .into_iter()
            .flatten()
        {
            writer.put_string(value);
        }

        for dictionary in [&self.point_tags, &self.path_tags] {
            writer.put_u16(dictionary.len() as u16);
            for entry in dictionary {
                writer.put_string(entry);
            }
        }

        let band_count = u8::try_from(self.bands.len())
            .map_err(|_| MapsforgeError::InvalidHeader("too many zoom bands".into()))?;
        writer.put_u8(band_count);
        let mut offset = data_start;
        for (band, data) in self.bands.iter().zip(bands) {
            writer.put_u8(band.base);
            writer.put_u8(band.min);
            writer.put_u8(band.max);
            writer.put_u64(offset);
            writer.put_u64(data.len() as u64);
            offset += data.len() as u64;
        }

        Ok(writer.into_vec())
    }

    fn tile_range(&self, base: u8) -> ((u32, u32), (u32, u32)) {
        let tl = ll2tile(&Coordinates::new(self.bounds.x_min, self.bounds.y_max), base);
        let br = ll2tile(&Coordinates::new(self.bounds.x_max, self.bounds.y_min), base);
        (tl, br)
    }

    fn encode_band(&self, band: &BandSpec) -> Result<Vec<u8>, MapsforgeError> {
        let ((x_min, y_min), (x_max, y_max)) = self.tile_range(band.base);
        let count = (x_max - x_min + 1) as usize * (y_max - y_min + 1) as usize;
        let index_size = (count * 5) as u64;

        let mut index = ByteWriter::default();
        let mut data = ByteWriter::default();
        for y in y_min..=y_max {
            for x in x_min..=x_max {
                index.put_u40(index_size + data.len() as u64);
                data.put_bytes(&self.encode_tile(band, x, y)?);
            }
        }

        let mut band_data = index.into_vec();
        band_data.extend(data.into_vec());
        Ok(band_data)
    }

    fn encode_tile(&self, band: &BandSpec, x: u32, y: u32) -> Result<Vec<u8>, MapsforgeError> {
        let in_tile = |c: &Coordinates| ll2tile(c, band.base) == (x, y);
        let row = |min_zoom: u8| (min_zoom.clamp(band.min, band.max) - band.min) as usize;

        let mut points: Vec<&PointRecord> = self
            .points
            .iter()
            .filter(|p| p.min_zoom <= band.max && in_tile(&p.coordinates))
            .collect();
        let mut paths: Vec<&PathRecord> = self
            .paths
            .iter()
            .filter(|p| {
                p.min_zoom <= band.max
                    && p.blocks
                        .first()
                        .and_then(Polygon::first_vertex)
                        .is_some_and(|c| in_tile(&c))
            })
            .collect();
        if points.is_empty() && paths.is_empty() {
            return Ok(vec![]);
        }

        points.sort_by_key(|p| row(p.min_zoom));
        paths.sort_by_key(|p| row(p.min_zoom));

        let rows = (band.max - band.min) as usize + 1;
        let mut writer = ByteWriter::default();
        for r in 0..rows {
            writer.put_vu32(points.iter().filter(|p| row(p.min_zoom) == r).count() as u32);
            writer.put_vu32(paths.iter().filter(|p| row(p.min_zoom) == r).count() as u32);
        }

        let anchor = tile2ll(x, y, band.base);
        let mut point_data = ByteWriter::default();
        for point in points {
            self.encode_point(&mut point_data, point, &anchor)?;
        }
        writer.put_vu32(point_data.len() as u32);
        writer.put_bytes(&point_data.into_vec());

        for path in paths {
            let record = self.encode_path(path, &anchor)?;
            writer.put_vu32(record.len() as u32);
            writer.put_bytes(&record);
        }

        Ok(writer.into_vec())
    }

    fn encode_point(
        &self,
        writer: &mut ByteWriter,
        point: &PointRecord,
        anchor: &Coordinates,
    ) -> Result<(), MapsforgeError> {
        writer.put_vs32(microdegrees(point.coordinates.lat - anchor.lat));
        writer.put_vs32(microdegrees(point.coordinates.lon - anchor.lon));
        encode_tags(writer, &self.point_tags, &point.tags, point.layer)?;

        let mut flags = 0;
        if point.name.is_some() {
            flags |= 0x80;
        }
        if point.house_number.is_some() {
            flags |= 0x40;
        }
        if point.elevation.is_some() {
            flags |= 0x20;
        }
        writer.put_u8(flags);
        if let Some(name) = &point.name {
            writer.put_string(name);
        }
        if let Some(house_number) = &point.house_number {
            writer.put_string(house_number);
        }
        if let Some(elevation) = point.elevation {
            writer.put_vs32(elevation);
        }

        Ok(())
    }

    fn encode_path(&self, path: &PathRecord, anchor: &Coordinates) -> Result<Vec<u8>, MapsforgeError> {
        let mut writer = ByteWriter::default();
        writer.put_u16(0xFFFF);
        encode_tags(&mut writer, &self.path_tags, &path.tags, path.layer)?;

        let mut flags = 0;
        if path.name.is_some() {
            flags |= 0x80;
        }
        if path.house_number.is_some() {
            flags |= 0x40;
        }
        if path.reference.is_some() {
            flags |= 0x20;
        }
        if path.label_pos.is_some() {
            flags |= 0x10;
        }
        if path.blocks.len() != 1 {
            flags |= 0x08;
        }
        if path.double_delta {
            flags |= 0x04;
        }
        writer.put_u8(flags);

        for value in [&path.name, &path.house_number, &path.reference]
            .into_iter()
            .flatten()
        {
            writer.put_string(value);
        }
        if let Some(label_pos) = path.label_pos {
            let first = path
                .blocks
                .first()
                .and_then(Polygon::first_vertex)
                .unwrap_or(*anchor);
            writer.put_vs32(microdegrees(label_pos.lat - first.lat));
            writer.put_vs32(microdegrees(label_pos.lon - first.lon));
        }
        if path.blocks.len() != 1 {
            writer.put_vu32(path.blocks.len() as u32);
        }

        let encoding = if path.double_delta {
            DeltaEncoding::Double
        } else {
            DeltaEncoding::Single
        };
        for block in &path.blocks {
            write_polygon(&mut writer, block, anchor, encoding);
        }

        Ok(writer.into_vec())
    }
}

fn encode_tags(
    writer: &mut ByteWriter,
    dictionary: &[String],
    tags: &[String],
    layer: u8,
) -> Result<(), MapsforgeError> {
    if tags.len() > 0x0F {
        return Err(MapsforgeError::InvalidRecord(format!(
            "too many tags: {}",
            tags.len()
        )));
    }

    let mut ids = ByteWriter::default();
    let mut values = ByteWriter::default();
    for tag in tags {
        if let Some(id) = dictionary.iter().position(|entry| entry == tag) {
            ids.put_vu32(id as u32);
            continue;
        }

        let (key, value) = tag.split_once('=').unwrap_or((tag.as_str(), ""));
        let (id, template) = dictionary
            .iter()
            .enumerate()
            .find_map(|(id, entry)| {
                let (k, v) = entry.split_once('=')?;
                (k == key && v.starts_with('%')).then_some((id, v))
            })
            .ok_or_else(|| MapsforgeError::InvalidRecord(format!("undeclared tag {tag}")))?;
        ids.put_vu32(id as u32);
        encode_value(&mut values, key, template, value)?;
    }

    writer.put_u8((layer.min(15) << 4) | tags.len() as u8);
    writer.put_bytes(&ids.into_vec());
    writer.put_bytes(&values.into_vec());
    Ok(())
}

fn encode_value(
    writer: &mut ByteWriter,
    key: &str,
    template: &str,
    value: &str,
) -> Result<(), MapsforgeError> {
    let invalid = || MapsforgeError::InvalidRecord(format!("invalid {template} value {value}"));
    match template {
        "%b" => writer.put_u8(value.parse().map_err(|_| invalid())?),
        "%i" if key.contains(":colour") => {
            let rgb = value.strip_prefix('#').ok_or_else(invalid)?;
            writer.put_u32(u32::from_str_radix(rgb, 16).map_err(|_| invalid())?)
        }
        "%i" => writer.put_i32(value.parse().map_err(|_| invalid())?),
        "%f" => writer.put_u32(value.parse::<f32>().map_err(|_| invalid())?.to_bits()),
        "%h" => writer.put_u16(value.parse().map_err(|_| invalid())?),
        "%s" => writer.put_string(value),
        _ => return Err(invalid()),
    }

    Ok(())
}
