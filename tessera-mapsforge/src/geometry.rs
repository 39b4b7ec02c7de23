use tessera_types::{Coordinates, Polygon, Ring};

use crate::error::MapsforgeError;
use crate::subfile::SubFile;

/// Coordinate encoding used by a way record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaEncoding {
    /// Each vertex is stored relative to the previous vertex.
    Single,
    /// Each step is stored relative to the previous step.
    Double,
}

/// Reads one geometry block: a ring count followed by the rings.
///
/// The first vertex of every ring is stored relative to `anchor`, the north-west corner of the
/// tile. Offsets are microdegrees, latitude first.
pub fn read_polygon(
    subfile: &mut SubFile,
    anchor: &Coordinates,
    encoding: DeltaEncoding,
) -> Result<Polygon, MapsforgeError> {
    let ring_count = subfile.read_vu32()?;
    let mut rings = Vec::with_capacity(ring_count.min(64) as usize);
    for _ in 0..ring_count {
        let node_count = subfile.read_vu32()?;
        if node_count == 0 {
            return Err(MapsforgeError::InvalidRecord(format!(
                "empty ring at position {}",
                subfile.pos()
            )));
        }

        rings.push(read_ring(subfile, anchor, node_count as usize, encoding)?);
    }

    Ok(Polygon::new(rings))
}

fn read_ring(
    subfile: &mut SubFile,
    anchor: &Coordinates,
    count: usize,
    encoding: DeltaEncoding,
) -> Result<Ring, MapsforgeError> {
    // Bound preallocation by the data actually present: every vertex takes at least two bytes.
    let mut ring = Vec::with_capacity(count.min(subfile.remaining() / 2 + 1));

    let mut lat = subfile.read_vs32()? as i64;
    let mut lon = subfile.read_vs32()? as i64;
    ring.push(offset(anchor, lon, lat));

    let mut prev_lat = 0i64;
    let mut prev_lon = 0i64;
    for _ in 1..count {
        let mut d_lat = subfile.read_vs32()? as i64;
        let mut d_lon = subfile.read_vs32()? as i64;
        if encoding == DeltaEncoding::Double {
            d_lat += prev_lat;
            d_lon += prev_lon;
            prev_lat = d_lat;
            prev_lon = d_lon;
        }

        lat += d_lat;
        lon += d_lon;
        ring.push(offset(anchor, lon, lat));
    }

    Ok(ring)
}

fn offset(anchor: &Coordinates, lon: i64, lat: i64) -> Coordinates {
    Coordinates::new(anchor.lon + lon as f64 / 1e6, anchor.lat + lat as f64 / 1e6)
}
