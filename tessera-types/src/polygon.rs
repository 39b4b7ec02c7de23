use crate::coordinates::Coordinates;
use crate::rect::Rect;
use serde::{Deserialize, Serialize};

/// Distance in degrees under which the first and last ring vertices are considered equal.
pub const CLOSED_EPSILON: f64 = 1e-9;

/// Ordered sequence of vertices.
pub type Ring = Vec<Coordinates>;

/// Ordered list of rings. The first ring is the outer one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    rings: Vec<Ring>,
}

impl Polygon {
    /// Creates a polygon from rings.
    pub fn new(rings: Vec<Ring>) -> Self {
        Self { rings }
    }

    /// All rings in order.
    pub fn rings(&self) -> &[Ring] {
        &self.rings
    }

    /// The first ring, if any.
    pub fn outer(&self) -> Option<&Ring> {
        self.rings.first()
    }

    /// True if there are no rings or every ring is empty.
    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(|r| r.is_empty())
    }

    /// First vertex of the first ring.
    pub fn first_vertex(&self) -> Option<Coordinates> {
        self.rings.first().and_then(|r| r.first()).copied()
    }

    /// True if the first and last vertices of the first ring coincide. An empty polygon is never
    /// closed.
    pub fn is_closed(&self) -> bool {
        let Some(ring) = self.rings.first() else {
            return false;
        };
        match (ring.first(), ring.last()) {
            (Some(first), Some(last)) => first.approx_eq(last, CLOSED_EPSILON),
            _ => false,
        }
    }

    /// Bounding rectangle of all vertices of all rings.
    pub fn bounding_rect(&self) -> Option<Rect> {
        Rect::from_points(self.rings.iter().flatten())
    }

    /// Iterates over all vertices of all rings.
    pub fn iter_vertices(&self) -> impl Iterator<Item = &Coordinates> {
        self.rings.iter().flatten()
    }
}

impl From<Vec<Ring>> for Polygon {
    fn from(rings: Vec<Ring>) -> Self {
        Self::new(rings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(points: &[(f64, f64)]) -> Ring {
        points.iter().map(|&(x, y)| Coordinates::new(x, y)).collect()
    }

    #[test]
    fn closed_ring() {
        let polygon = Polygon::new(vec![ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])]);
        assert!(polygon.is_closed());
    }

    #[test]
    fn open_ring() {
        let polygon = Polygon::new(vec![ring(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)])]);
        assert!(!polygon.is_closed());
    }

    #[test]
    fn only_first_ring_decides_closedness() {
        let polygon = Polygon::new(vec![
            ring(&[(0.0, 0.0), (1.0, 0.0)]),
            ring(&[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)]),
        ]);
        assert!(!polygon.is_closed());
    }

    #[test]
    fn empty_polygon_is_not_closed() {
        assert!(!Polygon::default().is_closed());
        assert!(!Polygon::new(vec![vec![]]).is_closed());
        assert!(Polygon::new(vec![vec![]]).is_empty());
    }

    #[test]
    fn bounding_rect_covers_inner_rings() {
        let polygon = Polygon::new(vec![
            ring(&[(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 0.0)]),
            ring(&[(-1.0, 1.0), (1.0, 3.0)]),
        ]);
        assert_eq!(polygon.bounding_rect(), Some(Rect::new(-1.0, 0.0, 2.0, 3.0)));
    }
}
