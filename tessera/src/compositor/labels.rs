//! Label placement with bounding box collision detection.

use nalgebra::Point2;
use tessera_types::contour::Contour;
use tessera_types::{Rect, Size};

use crate::render::{Canvas, SymbolImage, TextPaint};

/// Space between a symbol and its caption.
const SYMBOL_GAP: f64 = 2.0;

#[derive(Debug, Clone, PartialEq)]
struct PlacedText {
    text: String,
    paint: TextPaint,
    position: Point2<f64>,
}

#[derive(Debug, Clone, PartialEq)]
struct PlacedSymbol {
    image: SymbolImage,
    position: Point2<f64>,
    size: Size,
}

/// Caption and/or icon anchored at a point.
#[derive(Debug, Clone, PartialEq)]
pub struct PointLabel {
    text: Option<PlacedText>,
    symbol: Option<PlacedSymbol>,
    bbox: Rect,
}

impl PointLabel {
    /// Lays out the label around `anchor`.
    ///
    /// The symbol is centered on the anchor with the caption below it. A caption without a
    /// symbol is centered on the anchor. Returns `None` if there is nothing to draw.
    pub fn new(
        canvas: &dyn Canvas,
        anchor: Point2<f64>,
        text: Option<(&str, TextPaint)>,
        symbol: Option<&SymbolImage>,
    ) -> Option<Self> {
        let symbol = symbol.and_then(|image| {
            let size = image.display_size(canvas.image_size(image))?;
            Some(PlacedSymbol {
                image: image.clone(),
                position: Point2::new(
                    anchor.x - size.half_width(),
                    anchor.y - size.half_height(),
                ),
                size,
            })
        });

        let text = text.filter(|(text, _)| !text.is_empty()).map(|(text, paint)| {
            let size = canvas.measure_text(text, &paint.font);
            let top = match &symbol {
                Some(symbol) => anchor.y + symbol.size.half_height() + SYMBOL_GAP,
                None => anchor.y - size.half_height(),
            };
            (
                PlacedText {
                    text: text.to_string(),
                    paint,
                    position: Point2::new(anchor.x - size.half_width(), top),
                },
                size,
            )
        });

        let symbol_rect = symbol.as_ref().map(|s| {
            Rect::new(
                s.position.x,
                s.position.y,
                s.position.x + s.size.width(),
                s.position.y + s.size.height(),
            )
        });
        let text_rect = text.as_ref().map(|(t, size)| {
            Rect::new(
                t.position.x,
                t.position.y,
                t.position.x + size.width(),
                t.position.y + size.height(),
            )
        });
        let bbox = match (symbol_rect, text_rect) {
            (Some(a), Some(b)) => a.merge(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => return None,
        };

        Some(Self {
            text: text.map(|(t, _)| t),
            symbol,
            bbox,
        })
    }
}

/// Text following a line.
#[derive(Debug, Clone, PartialEq)]
pub struct PathLabel {
    text: PlacedText,
    path: Vec<Point2<f64>>,
    bbox: Rect,
}

impl PathLabel {
    /// Places the text in the middle of the longest part of `path` that lies inside `area`.
    ///
    /// Returns `None` if no part is long enough to hold the text. Text always reads from left
    /// to right.
    pub fn new(
        canvas: &dyn Canvas,
        path: &[Point2<f64>],
        area: &Rect,
        text: &str,
        paint: TextPaint,
    ) -> Option<Self> {
        if text.is_empty() {
            return None;
        }

        let size = canvas.measure_text(text, &paint.font);
        let run = longest_run_inside(path, area)?;
        let run_length = run.length();
        if run_length < size.width() + size.height() {
            return None;
        }

        let start = (run_length - size.width()) / 2.0;
        let mut segment = sub_polyline(run, start, start + size.width());
        if let (Some(first), Some(last)) = (segment.first(), segment.last()) {
            if last.x < first.x {
                segment.reverse();
            }
        }

        let bbox = Rect::from_points(segment.iter())?.expand(size.half_height());

        Some(Self {
            text: PlacedText {
                text: text.to_string(),
                paint,
                position: *segment.first()?,
            },
            path: segment,
            bbox,
        })
    }
}

fn longest_run_inside<'a>(path: &'a [Point2<f64>], area: &Rect) -> Option<&'a [Point2<f64>]> {
    path.split(|p| !area.contains(p))
        .filter(|run| run.len() > 1)
        .max_by(|a, b| a.length().total_cmp(&b.length()))
}

/// Part of the polyline between two distances from its start.
fn sub_polyline(path: &[Point2<f64>], from: f64, to: f64) -> Vec<Point2<f64>> {
    let mut result = vec![];
    let mut travelled = 0.0;

    for w in path.windows(2) {
        let (a, b) = (w[0], w[1]);
        let len = nalgebra::distance(&a, &b);
        let seg_start = travelled;
        let seg_end = travelled + len;
        travelled = seg_end;

        if seg_end < from || len == 0.0 {
            continue;
        }

        let at = |d: f64| a + (b - a) * ((d - seg_start) / len).clamp(0.0, 1.0);
        if result.is_empty() {
            result.push(at(from));
        }
        if seg_end >= to {
            result.push(at(to));
            break;
        }
        result.push(b);
    }

    result
}

/// Label accepted for drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum TextItem {
    /// Point or area label.
    Point(PointLabel),
    /// Line label.
    Path(PathLabel),
}

impl TextItem {
    /// Bounding box used for collision detection.
    pub fn bbox(&self) -> &Rect {
        match self {
            Self::Point(label) => &label.bbox,
            Self::Path(label) => &label.bbox,
        }
    }

    /// Returns true if the item overlaps any of the items.
    pub fn collides(&self, items: &[TextItem]) -> bool {
        items.iter().any(|item| item.bbox().intersects(self.bbox()))
    }

    /// Draws the item.
    pub fn paint(&self, canvas: &mut dyn Canvas) {
        match self {
            Self::Point(label) => {
                if let Some(symbol) = &label.symbol {
                    canvas.draw_image(&symbol.image, symbol.position, symbol.size);
                }
                if let Some(text) = &label.text {
                    canvas.draw_text(&text.text, text.position, &text.paint);
                }
            }
            Self::Path(label) => {
                canvas.draw_text_along(&label.text.text, &label.path, &label.text.paint);
            }
        }
    }
}
