//! Canvas that records drawing operations instead of rasterizing them.

use std::path::PathBuf;
use std::sync::Arc;

use nalgebra::Point2;
use parking_lot::Mutex;
use tessera_types::Size;

use crate::render::{
    Canvas, DevicePath, Font, Layer, PathPaint, Pixmap, Renderer, SymbolImage, TextPaint,
};

/// Recorded canvas call.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasOp {
    /// [`Canvas::draw_path`].
    Path {
        /// Target layer.
        layer: Layer,
        /// Paint.
        paint: PathPaint,
        /// Geometry.
        path: DevicePath,
    },
    /// [`Canvas::draw_image`].
    Image {
        /// Image file.
        path: PathBuf,
        /// Top left corner.
        position: Point2<f64>,
        /// Drawn size.
        size: Size,
    },
    /// [`Canvas::draw_text`].
    Text {
        /// Text.
        text: String,
        /// Baseline start.
        position: Point2<f64>,
        /// Paint.
        paint: TextPaint,
    },
    /// [`Canvas::draw_text_along`].
    TextAlong {
        /// Text.
        text: String,
        /// Polyline.
        path: Vec<Point2<f64>>,
        /// Paint.
        paint: TextPaint,
    },
    /// [`Canvas::flush_layer`].
    FlushLayer,
}

/// Renderer producing [`RecordingCanvas`]es. Operations of every finished canvas are appended
/// to a shared log.
#[derive(Debug, Default, Clone)]
pub struct RecordingRenderer {
    finished: Arc<Mutex<Vec<Vec<CanvasOp>>>>,
}

impl RecordingRenderer {
    /// Creates a renderer with an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations of all finished canvases, in the order they were finished.
    pub fn finished(&self) -> Vec<Vec<CanvasOp>> {
        self.finished.lock().clone()
    }

    /// Number of finished canvases.
    pub fn finished_count(&self) -> usize {
        self.finished.lock().len()
    }
}

impl Renderer for RecordingRenderer {
    fn create_canvas(&self, width: u32, height: u32, ratio: f64) -> Box<dyn Canvas> {
        Box::new(RecordingCanvas {
            width,
            height,
            ratio,
            ops: vec![],
            finished: self.finished.clone(),
        })
    }
}

/// Canvas recording every call.
///
/// Text is measured as `0.6 * font size` per character by `font size` high. Every image is
/// 16x16 pixels, except files with `missing` in the name which cannot be loaded.
#[derive(Debug)]
pub struct RecordingCanvas {
    width: u32,
    height: u32,
    ratio: f64,
    ops: Vec<CanvasOp>,
    finished: Arc<Mutex<Vec<Vec<CanvasOp>>>>,
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> Size {
        Size::new(self.width as f64, self.height as f64)
    }

    fn draw_path(&mut self, path: &DevicePath, paint: &PathPaint, layer: Layer) {
        self.ops.push(CanvasOp::Path {
            layer,
            paint: paint.clone(),
            path: path.clone(),
        });
    }

    fn draw_image(&mut self, image: &SymbolImage, position: Point2<f64>, size: Size) {
        self.ops.push(CanvasOp::Image {
            path: image.path().to_path_buf(),
            position,
            size,
        });
    }

    fn draw_text(&mut self, text: &str, position: Point2<f64>, paint: &TextPaint) {
        self.ops.push(CanvasOp::Text {
            text: text.to_string(),
            position,
            paint: *paint,
        });
    }

    fn draw_text_along(&mut self, text: &str, path: &[Point2<f64>], paint: &TextPaint) {
        self.ops.push(CanvasOp::TextAlong {
            text: text.to_string(),
            path: path.to_vec(),
            paint: *paint,
        });
    }

    fn measure_text(&self, text: &str, font: &Font) -> Size {
        Size::new(text.chars().count() as f64 * font.size * 0.6, font.size)
    }

    fn image_size(&self, image: &SymbolImage) -> Option<Size> {
        let missing = image
            .path()
            .to_string_lossy()
            .contains("missing");
        (!missing).then(|| Size::new(16.0, 16.0))
    }

    fn flush_layer(&mut self) {
        self.ops.push(CanvasOp::FlushLayer);
    }

    fn finish(self: Box<Self>) -> Pixmap {
        let canvas = *self;
        let width = (canvas.width as f64 * canvas.ratio).round() as u32;
        let height = (canvas.height as f64 * canvas.ratio).round() as u32;
        canvas.finished.lock().push(canvas.ops);
        Pixmap::new(
            width,
            height,
            canvas.ratio,
            vec![0u8; width as usize * height as usize * 4],
        )
    }
}
