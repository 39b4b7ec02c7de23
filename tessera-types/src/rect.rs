use crate::cartesian_point::CartesianPoint2d;
use nalgebra::{Point2, Scalar};
use num_traits::{FromPrimitive, Num};
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle.
///
/// In geographic space `x` is the longitude and `y` the latitude, so `y_max` is the northern
/// edge. In device space `y` grows downwards and `y_min` is the top edge.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rect<N = f64> {
    /// Minimum x.
    pub x_min: N,
    /// Minimum y.
    pub y_min: N,
    /// Maximum x.
    pub x_max: N,
    /// Maximum y.
    pub y_max: N,
}

impl<N: Num + Copy + PartialOrd + Scalar + FromPrimitive> Rect<N> {
    /// Creates a new rectangle. The bounds are normalized, so the corners may be given in any
    /// order.
    pub fn new(x1: N, y1: N, x2: N, y2: N) -> Self {
        let (x_min, x_max) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (y_min, y_max) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Minimum x.
    pub fn x_min(&self) -> N {
        self.x_min
    }

    /// Maximum x.
    pub fn x_max(&self) -> N {
        self.x_max
    }

    /// Minimum y.
    pub fn y_min(&self) -> N {
        self.y_min
    }

    /// Maximum y.
    pub fn y_max(&self) -> N {
        self.y_max
    }

    /// Width.
    pub fn width(&self) -> N {
        self.x_max - self.x_min
    }

    /// Height.
    pub fn height(&self) -> N {
        self.y_max - self.y_min
    }

    /// Smallest rectangle containing both `self` and `other`.
    pub fn merge(&self, other: Self) -> Self {
        Self {
            x_min: min(self.x_min, other.x_min),
            y_min: min(self.y_min, other.y_min),
            x_max: max(self.x_max, other.x_max),
            y_max: max(self.y_max, other.y_max),
        }
    }

    /// Degenerate rectangle at the point.
    pub fn from_point(p: &impl CartesianPoint2d<Num = N>) -> Self {
        Self {
            x_min: p.x(),
            x_max: p.x(),
            y_min: p.y(),
            y_max: p.y(),
        }
    }

    /// Bounding rectangle of the points, or `None` if the iterator is empty.
    pub fn from_points<'a, P: CartesianPoint2d<Num = N> + 'a>(
        mut points: impl Iterator<Item = &'a P>,
    ) -> Option<Self> {
        let first = points.next()?;
        let mut rect = Self::from_point(first);
        for p in points {
            rect.x_min = min(rect.x_min, p.x());
            rect.y_min = min(rect.y_min, p.y());
            rect.x_max = max(rect.x_max, p.x());
            rect.y_max = max(rect.y_max, p.y());
        }

        Some(rect)
    }

    /// Returns true if the point lies inside or on the border of the rectangle.
    pub fn contains(&self, point: &impl CartesianPoint2d<Num = N>) -> bool {
        self.x_min <= point.x()
            && self.x_max >= point.x()
            && self.y_min <= point.y()
            && self.y_max >= point.y()
    }

    /// Returns true if the rectangles share at least one point.
    pub fn intersects(&self, other: &Self) -> bool {
        self.x_min <= other.x_max
            && self.x_max >= other.x_min
            && self.y_min <= other.y_max
            && self.y_max >= other.y_min
    }

    /// Returns true if `other` lies completely inside `self`.
    pub fn contains_rect(&self, other: &Self) -> bool {
        self.x_min <= other.x_min
            && self.x_max >= other.x_max
            && self.y_min <= other.y_min
            && self.y_max >= other.y_max
    }

    /// Rectangle grown by `amount` on each side.
    pub fn expand(&self, amount: N) -> Self {
        Self {
            x_min: self.x_min - amount,
            x_max: self.x_max + amount,
            y_min: self.y_min - amount,
            y_max: self.y_max + amount,
        }
    }

    /// Rectangle moved by the given offsets.
    pub fn translate(&self, dx: N, dy: N) -> Self {
        Self {
            x_min: self.x_min + dx,
            x_max: self.x_max + dx,
            y_min: self.y_min + dy,
            y_max: self.y_max + dy,
        }
    }

    /// Center point.
    pub fn center(&self) -> Point2<N> {
        let two = N::one() + N::one();
        Point2::new(
            (self.x_min + self.x_max) / two,
            (self.y_min + self.y_max) / two,
        )
    }
}

fn min<N: PartialOrd>(a: N, b: N) -> N {
    if a < b {
        a
    } else {
        b
    }
}

fn max<N: PartialOrd>(a: N, b: N) -> N {
    if a > b {
        a
    } else {
        b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Coordinates;

    #[test]
    fn new_normalizes_corners() {
        let rect = Rect::new(10.0, 5.0, 0.0, -5.0);
        assert_eq!(rect, Rect::new(0.0, -5.0, 10.0, 5.0));
        assert_eq!(rect.width(), 10.0);
        assert_eq!(rect.height(), 10.0);
    }

    #[test]
    fn intersects() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(a.intersects(&Rect::new(5.0, 5.0, 15.0, 15.0)));
        assert!(a.intersects(&Rect::new(10.0, 10.0, 15.0, 15.0)));
        assert!(a.intersects(&Rect::new(2.0, 2.0, 3.0, 3.0)));
        assert!(!a.intersects(&Rect::new(10.1, 0.0, 15.0, 15.0)));
        assert!(!a.intersects(&Rect::new(0.0, -5.0, 5.0, -0.1)));
    }

    #[test]
    fn contains_coordinates() {
        let rect = Rect::new(14.0, 50.0, 15.0, 51.0);
        assert!(rect.contains(&Coordinates::new(14.5, 50.5)));
        assert!(rect.contains(&Coordinates::new(15.0, 50.0)));
        assert!(!rect.contains(&Coordinates::new(13.9, 50.5)));
    }

    #[test]
    fn from_points() {
        let points = [
            Coordinates::new(1.0, 2.0),
            Coordinates::new(-1.0, 5.0),
            Coordinates::new(3.0, 0.0),
        ];
        let rect = Rect::from_points(points.iter()).unwrap();
        assert_eq!(rect, Rect::new(-1.0, 0.0, 3.0, 5.0));
        assert!(Rect::<f64>::from_points(std::iter::empty::<&Coordinates>()).is_none());
    }

    #[test]
    fn merge() {
        let merged = Rect::new(0.0, 0.0, 1.0, 1.0).merge(Rect::new(-1.0, 0.5, 0.5, 3.0));
        assert_eq!(merged, Rect::new(-1.0, 0.0, 1.0, 3.0));
    }
}
