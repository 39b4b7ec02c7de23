//! Algorithms over device-space vertex sequences.

use crate::cartesian_point::{CartesianPoint2d, CartesianPoint2dFloat};
use nalgebra::Point2;

/// Direction of a closed contour.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Winding {
    /// Clockwise.
    Clockwise,
    /// Counter-clockwise.
    CounterClockwise,
}

/// A sequence of vertices interpreted as a contour.
pub trait Contour {
    /// Point type.
    type Point: CartesianPoint2d<Num = f64>;

    /// Vertices in order.
    fn vertices(&self) -> &[Self::Point];

    /// Signed area using the shoelace formula. The contour is implicitly closed.
    fn area_signed(&self) -> f64 {
        let points = self.vertices();
        let Some(last) = points.last() else {
            return 0.0;
        };

        let mut prev = last;
        let mut aggr = 0.0;
        for p in points {
            aggr += prev.x() * p.y() - p.x() * prev.y();
            prev = p;
        }

        aggr / 2.0
    }

    /// Winding direction by the sign of the area.
    fn winding(&self) -> Winding {
        if self.area_signed() <= 0.0 {
            Winding::Clockwise
        } else {
            Winding::CounterClockwise
        }
    }

    /// Area-weighted centroid. Falls back to the vertex average for degenerate contours with
    /// zero area, and returns `None` for an empty contour.
    fn centroid(&self) -> Option<Point2<f64>> {
        let points = self.vertices();
        let last = points.last()?;

        let mut prev = last;
        let mut area = 0.0;
        let mut cx = 0.0;
        let mut cy = 0.0;
        for p in points {
            let cross = prev.x() * p.y() - p.x() * prev.y();
            area += cross;
            cx += (prev.x() + p.x()) * cross;
            cy += (prev.y() + p.y()) * cross;
            prev = p;
        }

        if area.abs() < f64::EPSILON {
            let n = points.len() as f64;
            let sx: f64 = points.iter().map(|p| p.x()).sum();
            let sy: f64 = points.iter().map(|p| p.y()).sum();
            return Some(Point2::new(sx / n, sy / n));
        }

        Some(Point2::new(cx / (3.0 * area), cy / (3.0 * area)))
    }

    /// Total length of the open polyline.
    fn length(&self) -> f64 {
        self.vertices()
            .windows(2)
            .map(|w| w[0].distance(&w[1]))
            .sum()
    }
}

impl<P: CartesianPoint2d<Num = f64>> Contour for [P] {
    type Point = P;

    fn vertices(&self) -> &[P] {
        self
    }
}

impl<P: CartesianPoint2d<Num = f64>> Contour for Vec<P> {
    type Point = P;

    fn vertices(&self) -> &[P] {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn square() -> Vec<Point2<f64>> {
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 2.0),
            Point2::new(0.0, 2.0),
        ]
    }

    #[test]
    fn area_signed() {
        assert_abs_diff_eq!(square().area_signed(), 4.0);
        let mut reversed = square();
        reversed.reverse();
        assert_abs_diff_eq!(reversed.area_signed(), -4.0);
        assert_eq!(reversed.winding(), Winding::Clockwise);
        assert_eq!(square().winding(), Winding::CounterClockwise);
    }

    #[test]
    fn centroid_ignores_explicit_closing_vertex() {
        let mut closed = square();
        closed.push(Point2::new(0.0, 0.0));
        let c = closed.centroid().unwrap();
        assert_abs_diff_eq!(c.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c.y, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn centroid_of_degenerate_contour() {
        let line = vec![Point2::new(0.0, 0.0), Point2::new(4.0, 0.0)];
        assert_eq!(line.centroid(), Some(Point2::new(2.0, 0.0)));
        assert_eq!(Vec::<Point2<f64>>::new().centroid(), None);
    }

    #[test]
    fn length() {
        assert_abs_diff_eq!(square().length(), 6.0);
    }
}
