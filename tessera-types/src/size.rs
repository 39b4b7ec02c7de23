/// Width and height of a box in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Size {
    width: f64,
    height: f64,
}

impl Size {
    /// Creates a new size.
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Square box with the side.
    pub const fn square(side: f64) -> Self {
        Self::new(side, side)
    }

    /// Width.
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Height.
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Half of the width, the distance from the center to the left edge.
    pub fn half_width(&self) -> f64 {
        self.width / 2.0
    }

    /// Half of the height, the distance from the center to the top edge.
    pub fn half_height(&self) -> f64 {
        self.height / 2.0
    }

    /// Height divided by width. `None` if either dimension is not positive.
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0.0 && self.height > 0.0).then(|| self.height / self.width)
    }

    /// Box of the given width with the aspect ratio of this one, or a square if it has none.
    pub fn with_width(&self, width: f64) -> Self {
        Self::new(width, self.aspect_ratio().map_or(width, |a| width * a))
    }

    /// Box of the given height with the aspect ratio of this one, or a square if it has none.
    pub fn with_height(&self, height: f64) -> Self {
        Self::new(self.aspect_ratio().map_or(height, |a| height / a), height)
    }
}
