use ahash::RandomState;
use serde::{Deserialize, Serialize};
use tessera_types::{Coordinates, Polygon, Rect};

use crate::tags::Tag;

/// Node entity decoded from a map tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Place rank in the upper 32 bits, spatial hash in the lower 32 bits. Sorting by id puts
    /// more important places last.
    pub id: u64,
    /// Position.
    pub coordinates: Coordinates,
    /// Drawing layer, `0..=15`.
    pub layer: u8,
    /// Resolved tags, including the optional name, house number and elevation.
    pub tags: Vec<Tag>,
}

impl Point {
    /// Creates a point and assigns its id.
    pub fn new(coordinates: Coordinates, layer: u8, tags: Vec<Tag>) -> Self {
        let id = point_id(&coordinates, &tags);
        Self {
            id,
            coordinates,
            layer,
            tags,
        }
    }

    /// Value of the first tag with the key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        find_tag(&self.tags, key)
    }
}

/// Way entity decoded from a map tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Drawing layer, `0..=15`.
    pub layer: u8,
    /// Resolved tags, including the optional name, house number and reference.
    pub tags: Vec<Tag>,
    /// Geometry.
    pub polygon: Polygon,
    /// True if the first ring is closed.
    pub closed: bool,
    /// Explicit label position.
    pub label_pos: Option<Coordinates>,
}

impl Path {
    /// Creates a path, deriving `closed` from the geometry.
    pub fn new(
        layer: u8,
        tags: Vec<Tag>,
        polygon: Polygon,
        label_pos: Option<Coordinates>,
    ) -> Self {
        Self {
            layer,
            tags,
            closed: polygon.is_closed(),
            polygon,
            label_pos,
        }
    }

    /// Value of the first tag with the key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        find_tag(&self.tags, key)
    }

    /// Bounding rectangle of the geometry.
    pub fn bounding_rect(&self) -> Option<Rect> {
        self.polygon.bounding_rect()
    }
}

fn find_tag<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
}

/// Rank of a `place` tag value. Higher ranks win label collisions.
pub fn place_rank(tags: &[Tag]) -> u32 {
    match find_tag(tags, "place") {
        Some("country") => 4,
        Some("city") => 3,
        Some("town") => 2,
        Some("village") => 1,
        _ => 0,
    }
}

fn point_id(coordinates: &Coordinates, tags: &[Tag]) -> u64 {
    let hasher = RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    );
    let position = hasher.hash_one((coordinates.lon.to_bits(), coordinates.lat.to_bits()));
    let label = hasher.hash_one(find_tag(tags, "name").unwrap_or_default());
    let hash = hasher.hash_one((position, label)) as u32;

    ((place_rank(tags) as u64) << 32) | hash as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_rank_is_in_upper_bits() {
        let c = Coordinates::new(14.0, 50.0);
        let city = Point::new(c, 0, vec![Tag::new("place", "city")]);
        let village = Point::new(c, 0, vec![Tag::new("place", "village")]);
        let peak = Point::new(c, 0, vec![Tag::new("natural", "peak")]);

        assert_eq!(city.id >> 32, 3);
        assert_eq!(village.id >> 32, 1);
        assert_eq!(peak.id >> 32, 0);
        assert!(city.id > village.id);
    }

    #[test]
    fn id_is_deterministic() {
        let c = Coordinates::new(14.0, 50.0);
        let tags = vec![Tag::new("name", "Praha")];
        assert_eq!(Point::new(c, 0, tags.clone()).id, Point::new(c, 0, tags).id);
        assert_ne!(
            Point::new(c, 0, vec![Tag::new("name", "Praha")]).id,
            Point::new(c, 0, vec![Tag::new("name", "Brno")]).id
        );
    }

    #[test]
    fn path_closedness_is_derived() {
        let ring = vec![
            Coordinates::new(0.0, 0.0),
            Coordinates::new(1.0, 0.0),
            Coordinates::new(0.0, 0.0),
        ];
        let path = Path::new(0, vec![], Polygon::new(vec![ring]), None);
        assert!(path.closed);
    }
}
