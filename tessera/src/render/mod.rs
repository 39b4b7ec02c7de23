//! Drawing surface used by the tile compositor.
//!
//! The compositor decides *what* goes where; rasterization, font shaping and image decoding
//! are done by a [`Canvas`] implementation supplied through a [`Renderer`].

use std::path::{Path, PathBuf};

use bytes::Bytes;
use nalgebra::Point2;
use tessera_types::{Rect, Size};

use crate::color::Color;

#[cfg(any(test, feature = "_tests"))]
pub mod recording;

/// Creates canvases for tile composition. Shared between worker threads.
pub trait Renderer: Send + Sync {
    /// Creates a transparent canvas of the given logical size.
    ///
    /// All coordinates passed to the canvas are logical pixels; the resulting pixmap has
    /// `width * ratio` by `height * ratio` physical pixels.
    fn create_canvas(&self, width: u32, height: u32, ratio: f64) -> Box<dyn Canvas>;
}

/// Target of a path drawing operation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    /// The final image, drawn with normal source-over blending.
    Output,
    /// Transparent scratch layer, drawn with source composition (pixels are replaced, not
    /// blended). Moved onto the output with [`Canvas::flush_layer`].
    Scratch,
}

/// Raster surface of one tile.
pub trait Canvas {
    /// Logical size of the canvas.
    fn size(&self) -> Size;
    /// Fills and strokes the path.
    fn draw_path(&mut self, path: &DevicePath, paint: &PathPaint, layer: Layer);
    /// Draws the image with its top left corner at `position`.
    fn draw_image(&mut self, image: &SymbolImage, position: Point2<f64>, size: Size);
    /// Draws the text into the box measured by [`Canvas::measure_text`], with the box's top left
    /// corner at `position`.
    fn draw_text(&mut self, text: &str, position: Point2<f64>, paint: &TextPaint);
    /// Draws the text along the polyline, centered vertically on it.
    fn draw_text_along(&mut self, text: &str, path: &[Point2<f64>], paint: &TextPaint);
    /// Size of the text box for the font.
    fn measure_text(&self, text: &str, font: &Font) -> Size;
    /// Intrinsic size of the image, or `None` if it cannot be loaded.
    fn image_size(&self, image: &SymbolImage) -> Option<Size>;
    /// Composes the scratch layer onto the output and clears it.
    fn flush_layer(&mut self);
    /// Finishes drawing.
    fn finish(self: Box<Self>) -> Pixmap;
}

/// Rendered tile image.
#[derive(Debug, Clone, PartialEq)]
pub struct Pixmap {
    width: u32,
    height: u32,
    ratio: f64,
    data: Bytes,
}

impl Pixmap {
    /// Creates a pixmap from RGBA8 pixel data.
    pub fn new(width: u32, height: u32, ratio: f64, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            ratio,
            data: data.into(),
        }
    }

    /// Pixmap without pixels.
    pub fn empty() -> Self {
        Self::new(0, 0, 1.0, Bytes::new())
    }

    /// Width in physical pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in physical pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Device pixel ratio.
    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    /// Pixel data.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Returns true if the pixmap has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Path in tile-local logical pixels. Every ring starts a new sub-path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DevicePath {
    rings: Vec<Vec<Point2<f64>>>,
}

impl DevicePath {
    /// Creates a path from rings.
    pub fn new(rings: Vec<Vec<Point2<f64>>>) -> Self {
        Self { rings }
    }

    /// Sub-paths of the path.
    pub fn rings(&self) -> &[Vec<Point2<f64>>] {
        &self.rings
    }

    /// First ring.
    pub fn outer(&self) -> Option<&[Point2<f64>]> {
        self.rings.first().map(Vec::as_slice)
    }

    /// Bounding rectangle of all vertices.
    pub fn bounding_rect(&self) -> Option<Rect> {
        Rect::from_points(self.rings.iter().flatten())
    }

    /// Returns true if the path has no vertices.
    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(Vec::is_empty)
    }
}

/// Line cap style.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LineCap {
    /// Flat end at the last vertex.
    Butt,
    /// Half circle.
    #[default]
    Round,
    /// Flat end extended by half of the width.
    Square,
}

/// Line join style.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum LineJoin {
    /// Sharp corner.
    Miter,
    /// Rounded corner.
    #[default]
    Round,
    /// Cut corner.
    Bevel,
}

/// Stroke parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Pen {
    /// Stroke color.
    pub color: Color,
    /// Width in logical pixels.
    pub width: f64,
    /// Alternating dash and gap lengths in logical pixels. Empty for a solid line.
    pub dash_pattern: Vec<f64>,
    /// Cap style.
    pub cap: LineCap,
    /// Join style.
    pub join: LineJoin,
}

/// Fill parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Brush {
    /// Solid color.
    Color(Color),
    /// Tiled image.
    Pattern(SymbolImage),
}

/// Paint of a path. Nothing is drawn for a missing pen or brush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathPaint {
    /// Outline.
    pub pen: Option<Pen>,
    /// Fill.
    pub brush: Option<Brush>,
}

/// Font family.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FontFamily {
    /// Proportional sans-serif font.
    #[default]
    SansSerif,
    /// Serif font.
    Serif,
    /// Fixed width font.
    Monospace,
}

/// Font description.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Font {
    /// Family.
    pub family: FontFamily,
    /// Size in logical pixels.
    pub size: f64,
    /// Bold weight.
    pub bold: bool,
    /// Italic style.
    pub italic: bool,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: FontFamily::SansSerif,
            size: 9.0,
            bold: false,
            italic: false,
        }
    }
}

/// Outline drawn around text glyphs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Halo {
    /// Outline color.
    pub color: Color,
    /// Outline width in logical pixels.
    pub width: f64,
}

/// Text paint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextPaint {
    /// Font.
    pub font: Font,
    /// Glyph color.
    pub color: Color,
    /// Optional outline.
    pub halo: Option<Halo>,
}

/// Default size of a vector symbol without explicit dimensions.
pub const DEFAULT_SYMBOL_SIZE: f64 = 20.0;

/// Reference to a symbol or pattern image file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolImage {
    path: PathBuf,
    width: Option<u32>,
    height: Option<u32>,
}

impl SymbolImage {
    /// Creates an image reference with optional requested dimensions.
    pub fn new(path: impl Into<PathBuf>, width: Option<u32>, height: Option<u32>) -> Self {
        Self {
            path: path.into(),
            width,
            height,
        }
    }

    /// Image file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Requested width.
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    /// Requested height.
    pub fn height(&self) -> Option<u32> {
        self.height
    }

    fn is_vector(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("svg"))
    }

    /// Logical size the image is drawn with.
    ///
    /// A missing dimension follows the image aspect ratio. Raster images without requested
    /// dimensions keep their intrinsic size, vector images get a 20x20 box. Returns `None` for
    /// a raster image that cannot be loaded.
    pub fn display_size(&self, intrinsic: Option<Size>) -> Option<Size> {
        let unknown = Size::default();
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(Size::new(w as f64, h as f64)),
            (Some(w), None) => Some(intrinsic.unwrap_or(unknown).with_width(w as f64)),
            (None, Some(h)) => Some(intrinsic.unwrap_or(unknown).with_height(h as f64)),
            (None, None) if self.is_vector() => Some(Size::square(DEFAULT_SYMBOL_SIZE)),
            (None, None) => intrinsic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_display_size() {
        let svg = SymbolImage::new("icons/peak.svg", None, None);
        assert_eq!(svg.display_size(None), Some(Size::new(20.0, 20.0)));

        let png = SymbolImage::new("icons/peak.png", None, None);
        assert_eq!(png.display_size(None), None);
        assert_eq!(
            png.display_size(Some(Size::new(12.0, 8.0))),
            Some(Size::new(12.0, 8.0))
        );

        let scaled = SymbolImage::new("icons/peak.png", Some(24), None);
        assert_eq!(
            scaled.display_size(Some(Size::new(12.0, 8.0))),
            Some(Size::new(24.0, 16.0))
        );

        let square = SymbolImage::new("icons/peak.svg", None, Some(14));
        assert_eq!(square.display_size(None), Some(Size::new(14.0, 14.0)));
    }

    #[test]
    fn empty_pixmap() {
        assert!(Pixmap::empty().is_empty());
        assert!(!Pixmap::new(2, 1, 1.0, vec![0; 8]).is_empty());
    }
}
