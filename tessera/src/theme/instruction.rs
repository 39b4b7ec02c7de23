//! Drawing instructions attached to theme rules.

use std::path::{Path, PathBuf};

use crate::color::Color;
use crate::error::ThemeError;
use crate::render::{
    Brush, Font, FontFamily, Halo, LineCap, LineJoin, PathPaint, Pen, SymbolImage, TextPaint,
};
use crate::theme::element::ThemeElement;
use crate::theme::rule::Rule;

/// Instruction bound to the rule snapshot it was declared under.
#[derive(Debug, Clone, PartialEq)]
pub struct Styled<T> {
    /// Predicate selecting the entities the instruction applies to.
    pub rule: Rule,
    /// What to draw.
    pub instruction: T,
}

/// Fill of a polygon, declared with `area`.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaFill {
    /// Fill color.
    pub fill: Option<Color>,
    /// Pattern image, takes precedence over `fill`.
    pub pattern: Option<SymbolImage>,
    /// Outline color.
    pub stroke: Option<Color>,
    /// Outline width at zoom 12 and below.
    pub stroke_width: f64,
    /// Outline dash pattern.
    pub dash_pattern: Vec<f64>,
    /// Declaration order among area and line instructions.
    pub z_order: usize,
}

/// Stroke of a path, declared with `line`.
#[derive(Debug, Clone, PartialEq)]
pub struct LineStroke {
    /// Line color.
    pub stroke: Option<Color>,
    /// Width at zoom 12 and below.
    pub stroke_width: f64,
    /// Dash pattern.
    pub dash_pattern: Vec<f64>,
    /// Cap style.
    pub cap: LineCap,
    /// Join style.
    pub join: LineJoin,
    /// Declaration order among area and line instructions.
    pub z_order: usize,
}

/// Instruction drawing the geometry of a path.
#[derive(Debug, Clone, PartialEq)]
pub enum PathInstruction {
    /// Filled polygon.
    AreaFill(AreaFill),
    /// Stroked line.
    LineStroke(LineStroke),
}

/// Stroke width used at the zoom level. Widths grow by 1.5x per level above 12.
pub fn scaled_width(width: f64, zoom: u8) -> f64 {
    if zoom >= 12 {
        1.5f64.powi(zoom as i32 - 12) * width
    } else {
        width
    }
}

impl PathInstruction {
    /// Declaration order, used to stack instructions of the same layer.
    pub fn z_order(&self) -> usize {
        match self {
            Self::AreaFill(area) => area.z_order,
            Self::LineStroke(line) => line.z_order,
        }
    }

    /// Returns true for area instructions.
    pub fn is_area(&self) -> bool {
        matches!(self, Self::AreaFill(_))
    }

    /// Paint for the zoom level.
    pub fn paint(&self, zoom: u8) -> PathPaint {
        match self {
            Self::AreaFill(area) => PathPaint {
                pen: area.stroke.map(|color| Pen {
                    color,
                    width: scaled_width(area.stroke_width, zoom),
                    dash_pattern: area.dash_pattern.clone(),
                    cap: LineCap::default(),
                    join: LineJoin::default(),
                }),
                brush: match (&area.pattern, area.fill) {
                    (Some(pattern), _) => Some(Brush::Pattern(pattern.clone())),
                    (None, Some(color)) => Some(Brush::Color(color)),
                    (None, None) => None,
                },
            },
            Self::LineStroke(line) => PathPaint {
                pen: line.stroke.map(|color| Pen {
                    color,
                    width: scaled_width(line.stroke_width, zoom),
                    dash_pattern: line.dash_pattern.clone(),
                    cap: line.cap,
                    join: line.join,
                }),
                brush: None,
            },
        }
    }
}

/// Text label, declared with `caption` or `pathText`.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    /// Tag key providing the text.
    pub key: String,
    /// Font.
    pub font: Font,
    /// Glyph color.
    pub fill: Color,
    /// Outline color.
    pub stroke: Color,
    /// Outline width.
    pub stroke_width: f64,
}

impl TextLabel {
    /// Outline of the glyphs. Present only for a visible stroke distinct from the fill.
    pub fn halo(&self) -> Option<Halo> {
        (self.stroke != self.fill && self.stroke_width > 0.0).then_some(Halo {
            color: self.stroke,
            width: self.stroke_width,
        })
    }

    /// Text paint.
    pub fn paint(&self) -> TextPaint {
        TextPaint {
            font: self.font,
            color: self.fill,
            halo: self.halo(),
        }
    }
}

/// Icon, declared with `symbol`.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    /// Image to draw. A symbol without `src` matches but draws nothing.
    pub image: Option<SymbolImage>,
}

fn invalid(attribute: &str, value: &str) -> ThemeError {
    ThemeError::InvalidAttribute {
        attribute: attribute.to_string(),
        value: value.to_string(),
    }
}

fn non_negative_f64(element: &ThemeElement, attribute: &str) -> Result<Option<f64>, ThemeError> {
    let Some(value) = element.attribute(attribute) else {
        return Ok(None);
    };
    match value.trim().parse::<f64>() {
        Ok(v) if v >= 0.0 && v.is_finite() => Ok(Some(v)),
        _ => Err(invalid(attribute, value)),
    }
}

fn non_negative_u32(element: &ThemeElement, attribute: &str) -> Result<Option<u32>, ThemeError> {
    let Some(value) = element.attribute(attribute) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| invalid(attribute, value))
}

fn dash_pattern(element: &ThemeElement) -> Result<Vec<f64>, ThemeError> {
    let Some(value) = element.attribute("stroke-dasharray") else {
        return Ok(vec![]);
    };
    value
        .split(',')
        .map(|part| match part.trim().parse::<f64>() {
            Ok(v) if v >= 0.0 && v.is_finite() => Ok(v),
            _ => Err(invalid("stroke-dasharray", value)),
        })
        .collect()
}

fn color(element: &ThemeElement, attribute: &str) -> Option<Color> {
    element.attribute(attribute).and_then(Color::parse)
}

/// Resolves an image `src` attribute.
///
/// URL-like sources (`file:icons/peak.svg`) are resolved against the theme directory, anything
/// else is used as is.
pub fn resource_path(src: &str, dir: Option<&Path>) -> PathBuf {
    let scheme_rest = src.split_once(':').filter(|(scheme, _)| {
        scheme.len() > 1 && scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+')
    });

    match scheme_rest {
        Some((_, rest)) => {
            let rest = rest.trim_start_matches('/');
            match dir {
                Some(dir) => dir.join(rest),
                None => PathBuf::from(rest),
            }
        }
        None => PathBuf::from(src),
    }
}

fn symbol_image(
    element: &ThemeElement,
    dir: Option<&Path>,
) -> Result<Option<SymbolImage>, ThemeError> {
    let height = non_negative_u32(element, "symbol-height")?;
    let width = non_negative_u32(element, "symbol-width")?;
    Ok(element
        .attribute("src")
        .map(|src| SymbolImage::new(resource_path(src, dir), width, height)))
}

impl AreaFill {
    /// Reads an `area` element.
    pub fn parse(
        element: &ThemeElement,
        dir: Option<&Path>,
        z_order: usize,
    ) -> Result<Self, ThemeError> {
        Ok(Self {
            fill: color(element, "fill"),
            pattern: symbol_image(element, dir)?,
            stroke: color(element, "stroke"),
            stroke_width: non_negative_f64(element, "stroke-width")?.unwrap_or(0.0),
            dash_pattern: dash_pattern(element)?,
            z_order,
        })
    }
}

impl LineStroke {
    /// Reads a `line` element.
    pub fn parse(element: &ThemeElement, z_order: usize) -> Result<Self, ThemeError> {
        let cap = match element.attribute("stroke-linecap") {
            Some("butt") => LineCap::Butt,
            Some("square") => LineCap::Square,
            _ => LineCap::Round,
        };
        let join = match element.attribute("stroke-linejoin") {
            Some("miter") => LineJoin::Miter,
            Some("bevel") => LineJoin::Bevel,
            _ => LineJoin::Round,
        };

        Ok(Self {
            stroke: color(element, "stroke"),
            stroke_width: non_negative_f64(element, "stroke-width")?.unwrap_or(0.0),
            dash_pattern: dash_pattern(element)?,
            cap,
            join,
            z_order,
        })
    }
}

impl TextLabel {
    /// Reads a `caption` or `pathText` element.
    pub fn parse(element: &ThemeElement) -> Result<Self, ThemeError> {
        let (bold, italic) = match element.attribute("font-style") {
            Some("bold") => (true, false),
            Some("italic") => (false, true),
            Some("bold_italic") => (true, true),
            _ => (false, false),
        };
        let family = match element.attribute("font-family") {
            Some("monospace") => FontFamily::Monospace,
            Some("serif") => FontFamily::Serif,
            _ => FontFamily::SansSerif,
        };
        let size = non_negative_f64(element, "font-size")?.unwrap_or(Font::default().size);

        Ok(Self {
            key: element.attribute("k").unwrap_or_default().to_string(),
            font: Font {
                family,
                size,
                bold,
                italic,
            },
            fill: color(element, "fill").unwrap_or(Color::BLACK),
            stroke: color(element, "stroke").unwrap_or(Color::BLACK),
            stroke_width: non_negative_f64(element, "stroke-width")?.unwrap_or(0.0),
        })
    }
}

impl Symbol {
    /// Reads a `symbol` element.
    pub fn parse(element: &ThemeElement, dir: Option<&Path>) -> Result<Self, ThemeError> {
        Ok(Self {
            image: symbol_image(element, dir)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;

    fn element(name: &str, attributes: &[(&str, &str)]) -> ThemeElement {
        attributes
            .iter()
            .fold(ThemeElement::new(name), |element, (name, value)| {
                element.with_attribute(*name, *value)
            })
    }

    #[test]
    fn width_scaling() {
        assert_abs_diff_eq!(scaled_width(2.0, 10), 2.0);
        assert_abs_diff_eq!(scaled_width(2.0, 12), 2.0);
        assert_abs_diff_eq!(scaled_width(2.0, 14), 4.5);
    }

    #[test]
    fn line_attributes() {
        let line = LineStroke::parse(
            &element(
                "line",
                &[
                    ("stroke", "#FF0000"),
                    ("stroke-width", "1.5"),
                    ("stroke-dasharray", "4, 2"),
                    ("stroke-linecap", "butt"),
                ],
            ),
            3,
        )
        .unwrap();

        assert_eq!(line.stroke, Some(Color::RED));
        assert_eq!(line.dash_pattern, vec![4.0, 2.0]);
        assert_eq!(line.cap, LineCap::Butt);
        assert_eq!(line.join, LineJoin::Round);

        let paint = PathInstruction::LineStroke(line).paint(13);
        let pen = paint.pen.unwrap();
        assert_abs_diff_eq!(pen.width, 2.25);
        assert!(paint.brush.is_none());
    }

    #[test]
    fn line_without_stroke_color_has_no_pen() {
        let line = LineStroke::parse(&element("line", &[("stroke", "bogus")]), 0).unwrap();
        assert!(PathInstruction::LineStroke(line).paint(10).pen.is_none());
    }

    #[test]
    fn area_pattern_takes_precedence() {
        let area = AreaFill::parse(
            &element("area", &[("fill", "#00FF00"), ("src", "file:patterns/wood.png")]),
            Some(Path::new("/themes/osm")),
            0,
        )
        .unwrap();

        let paint = PathInstruction::AreaFill(area).paint(10);
        let expected = Path::new("/themes/osm/patterns/wood.png");
        assert_matches!(paint.brush, Some(Brush::Pattern(image)) if image.path() == expected);
        assert!(paint.pen.is_none());
    }

    #[test]
    fn invalid_numbers() {
        assert_matches!(
            LineStroke::parse(&element("line", &[("stroke-width", "-1")]), 0),
            Err(ThemeError::InvalidAttribute { attribute, .. }) if attribute == "stroke-width"
        );
        assert!(LineStroke::parse(&element("line", &[("stroke-dasharray", "2,x")]), 0).is_err());
        assert!(TextLabel::parse(&element("caption", &[("font-size", "big")])).is_err());
        assert!(Symbol::parse(&element("symbol", &[("symbol-width", "-3")]), None).is_err());
    }

    #[test]
    fn text_defaults_and_halo() {
        let label = TextLabel::parse(&element("caption", &[("k", "name")])).unwrap();
        assert_eq!(label.fill, Color::BLACK);
        assert_abs_diff_eq!(label.font.size, 9.0);
        assert!(label.halo().is_none());

        let label = TextLabel::parse(&element(
            "caption",
            &[
                ("k", "name"),
                ("fill", "#000000"),
                ("stroke", "#FFFFFF"),
                ("stroke-width", "2"),
                ("font-style", "bold_italic"),
                ("font-family", "serif"),
            ],
        ))
        .unwrap();
        assert_eq!(
            label.halo(),
            Some(Halo {
                color: Color::WHITE,
                width: 2.0
            })
        );
        assert!(label.font.bold && label.font.italic);
        assert_eq!(label.font.family, FontFamily::Serif);
    }

    #[test]
    fn resource_paths() {
        let dir = Some(Path::new("/themes/osm"));
        assert_eq!(
            resource_path("file:/symbols/peak.svg", dir),
            PathBuf::from("/themes/osm/symbols/peak.svg")
        );
        assert_eq!(
            resource_path("symbols/peak.svg", dir),
            PathBuf::from("symbols/peak.svg")
        );
        assert_eq!(
            resource_path("C:\\symbols\\peak.svg", dir),
            PathBuf::from("C:\\symbols\\peak.svg")
        );
    }
}
