use nalgebra::{Point2, Scalar, Vector2};
use num_traits::{Bounded, Float, FromPrimitive, Num};

/// A point on a plane with `x` and `y` axes.
///
/// For geographic coordinates `x` is the longitude and `y` the latitude.
pub trait CartesianPoint2d {
    /// Numeric type of the coordinates.
    type Num: Num + Copy + PartialOrd + Bounded + Scalar + FromPrimitive;

    /// X coordinate.
    fn x(&self) -> Self::Num;
    /// Y coordinate.
    fn y(&self) -> Self::Num;

    /// Vector from `other` to `self`.
    fn sub(&self, other: &impl CartesianPoint2d<Num = Self::Num>) -> Vector2<Self::Num> {
        Vector2::new(self.x() - other.x(), self.y() - other.y())
    }

    /// Squared euclidean distance.
    fn distance_sq(&self, other: &impl CartesianPoint2d<Num = Self::Num>) -> Self::Num {
        let v = self.sub(other);
        v.x * v.x + v.y * v.y
    }
}

/// Float-only helpers for [`CartesianPoint2d`].
pub trait CartesianPoint2dFloat<N: Float = f64>: CartesianPoint2d<Num = N> {
    /// Euclidean distance.
    fn distance(&self, other: &impl CartesianPoint2d<Num = N>) -> N {
        self.distance_sq(other).sqrt()
    }
}

impl<N: Float, T: CartesianPoint2d<Num = N>> CartesianPoint2dFloat<N> for T {}

impl<N> CartesianPoint2d for Point2<N>
where
    N: Num + Copy + PartialOrd + Bounded + Scalar + FromPrimitive,
{
    type Num = N;

    fn x(&self) -> N {
        self.x
    }

    fn y(&self) -> N {
        self.y
    }
}
