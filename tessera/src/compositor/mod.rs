//! Composition of one raster tile from map entities and a render theme.

use std::cell::OnceCell;
use std::collections::HashSet;

use nalgebra::Point2;
use tessera_mapsforge::{MapData, Path, Point, Tag};
use tessera_types::contour::Contour;
use tessera_types::transform::ScreenTransform;
use tessera_types::{Coordinates, Rect};

use crate::render::{Canvas, DevicePath, Layer, Pixmap, Renderer};
use crate::theme::{PathInstruction, RenderTheme, StyleCache, Styled};

mod labels;
pub use labels::{PathLabel, PointLabel, TextItem};

struct PathEntry {
    path: Path,
    geometry: OnceCell<DevicePath>,
}

/// Value of the tag with the given key. An empty value counts as no label.
fn label_text<'t>(tags: &'t [Tag], key: &str) -> Option<&'t str> {
    tags.iter()
        .find(|tag| tag.key == key)
        .map(|tag| tag.value.as_str())
        .filter(|value| !value.is_empty())
}

/// Draws one tile.
///
/// Paths are drawn first, stacked by layer and then by the declaration order of their
/// instructions. Labels follow: point labels, area labels and line labels, each placed only if
/// it does not overlap any label accepted before it.
pub struct TileCompositor<'a> {
    theme: &'a RenderTheme,
    transform: &'a dyn ScreenTransform,
    rect: Rect,
    zoom: u8,
    points: Vec<Point>,
    paths: Vec<PathEntry>,
}

impl<'a> TileCompositor<'a> {
    /// Loads the entities of the tile rectangle (in device pixels of the transform) from the map.
    pub fn new(
        map: &MapData,
        theme: &'a RenderTheme,
        transform: &'a dyn ScreenTransform,
        rect: Rect,
        zoom: u8,
    ) -> Self {
        let (points, paths) = map.entities_in_rect(&transform.rect_to_geo(&rect), zoom);
        Self::with_entities(theme, transform, rect, zoom, points, paths)
    }

    /// Creates a compositor for the given entities.
    pub fn with_entities(
        theme: &'a RenderTheme,
        transform: &'a dyn ScreenTransform,
        rect: Rect,
        zoom: u8,
        mut points: Vec<Point>,
        paths: Vec<Path>,
    ) -> Self {
        points.sort_by(|a, b| b.id.cmp(&a.id));

        Self {
            theme,
            transform,
            rect,
            zoom,
            points,
            paths: paths
                .into_iter()
                .map(|path| PathEntry {
                    path,
                    geometry: OnceCell::new(),
                })
                .collect(),
        }
    }

    /// Renders the tile with the device pixel ratio.
    pub fn render(&self, renderer: &dyn Renderer, ratio: f64) -> Pixmap {
        let width = self.rect.width().round().max(0.0) as u32;
        let height = self.rect.height().round().max(0.0) as u32;
        let mut canvas = renderer.create_canvas(width, height, ratio);

        self.draw_paths(&mut *canvas);

        let area = Rect::new(0.0, 0.0, width as f64, height as f64);
        let mut items = vec![];
        self.point_labels(&*canvas, &mut items);
        self.area_labels(&*canvas, &area, &mut items);
        self.line_labels(&*canvas, &area, &mut items);

        log::trace!(
            "Tile {:?} at zoom {}: {} paths, {} points, {} labels",
            self.rect,
            self.zoom,
            self.paths.len(),
            self.points.len(),
            items.len()
        );

        for item in &items {
            item.paint(&mut *canvas);
        }

        canvas.finish()
    }

    fn device_point(&self, coordinates: &Coordinates) -> Point2<f64> {
        let p = self.transform.ll2xy(coordinates);
        Point2::new(p.x - self.rect.x_min, p.y - self.rect.y_min)
    }

    fn geometry<'e>(&self, entry: &'e PathEntry) -> &'e DevicePath {
        entry.geometry.get_or_init(|| {
            DevicePath::new(
                entry
                    .path
                    .polygon
                    .rings()
                    .iter()
                    .map(|ring| ring.iter().map(|c| self.device_point(c)).collect())
                    .collect(),
            )
        })
    }

    fn draw_paths(&self, canvas: &mut dyn Canvas) {
        let mut styles = StyleCache::new(self.theme);
        let mut instructions: Vec<(&PathEntry, &Styled<PathInstruction>)> = vec![];
        for entry in &self.paths {
            let path = &entry.path;
            for style in styles.paths(self.zoom, path.closed, &path.tags) {
                instructions.push((entry, style));
            }
        }
        instructions.sort_by_key(|(entry, style)| (entry.path.layer, style.instruction.z_order()));

        let mut area_batch: Option<usize> = None;
        for (entry, style) in instructions {
            let z_order = style.instruction.z_order();
            if area_batch.is_some_and(|batch| batch != z_order) {
                canvas.flush_layer();
                area_batch = None;
            }

            let paint = style.instruction.paint(self.zoom);
            let geometry = self.geometry(entry);
            if style.instruction.is_area() {
                canvas.draw_path(geometry, &paint, Layer::Scratch);
                area_batch = Some(z_order);
            } else {
                canvas.draw_path(geometry, &paint, Layer::Output);
            }
        }

        if area_batch.is_some() {
            canvas.flush_layer();
        }
    }

    fn point_labels(&self, canvas: &dyn Canvas, items: &mut Vec<TextItem>) {
        let labels = self.theme.point_labels(self.zoom);
        let symbols = self.theme.point_symbols(self.zoom);

        for point in &self.points {
            let label = labels.iter().find_map(|label| {
                if !label.rule.matches_tags(&point.tags) {
                    return None;
                }
                label_text(&point.tags, &label.instruction.key)
                    .map(|text| (text, label.instruction.paint()))
            });
            let symbol = symbols
                .iter()
                .find(|symbol| symbol.rule.matches_tags(&point.tags));
            if label.is_none() && symbol.is_none() {
                continue;
            }

            let image = symbol.and_then(|symbol| symbol.instruction.image.as_ref());
            let anchor = self.device_point(&point.coordinates);
            if let Some(item) = PointLabel::new(canvas, anchor, label, image).map(TextItem::Point) {
                if !item.collides(items) {
                    items.push(item);
                }
            }
        }
    }

    fn area_labels(&self, canvas: &dyn Canvas, area: &Rect, items: &mut Vec<TextItem>) {
        let labels = self.theme.area_labels(self.zoom);
        let symbols = self.theme.area_symbols(self.zoom);

        for entry in &self.paths {
            let path = &entry.path;
            if !path.closed {
                continue;
            }

            let label = labels.iter().find_map(|label| {
                if !label.rule.matches_closed(path.closed, &path.tags) {
                    return None;
                }
                label_text(&path.tags, &label.instruction.key)
                    .map(|text| (text, label.instruction.paint()))
            });
            let symbol = symbols
                .iter()
                .find(|symbol| symbol.rule.matches_tags(&path.tags));
            if label.is_none() && symbol.is_none() {
                continue;
            }

            // Labelled areas also get line labels, even when no instruction draws them.
            let geometry = self.geometry(entry);
            let anchor = match &path.label_pos {
                Some(pos) => Some(self.device_point(pos)),
                None => geometry.outer().and_then(|ring| ring.centroid()),
            };
            let Some(anchor) = anchor else {
                continue;
            };

            let image = symbol.and_then(|symbol| symbol.instruction.image.as_ref());
            if let Some(item) = PointLabel::new(canvas, anchor, label, image).map(TextItem::Point) {
                if area.contains_rect(item.bbox()) && !item.collides(items) {
                    items.push(item);
                }
            }
        }
    }

    fn line_labels(&self, canvas: &dyn Canvas, area: &Rect, items: &mut Vec<TextItem>) {
        let labels = self.theme.path_labels(self.zoom);
        let mut refs = HashSet::new();

        for label in labels {
            for entry in &self.paths {
                let Some(geometry) = entry.geometry.get() else {
                    continue;
                };
                let path = &entry.path;
                if !label.rule.matches_closed(path.closed, &path.tags) {
                    continue;
                }

                let key = label.instruction.key.as_str();
                let Some(text) = label_text(&path.tags, key) else {
                    continue;
                };
                let is_ref = key == "ref";
                if is_ref && refs.contains(text) {
                    continue;
                }

                let Some(line) = geometry.outer() else {
                    continue;
                };
                let paint = label.instruction.paint();
                let Some(item) = PathLabel::new(canvas, line, area, text, paint).map(TextItem::Path)
                else {
                    continue;
                };
                if !item.collides(items) {
                    items.push(item);
                    if is_ref {
                        refs.insert(text);
                    }
                }
            }
        }
    }
}

/// Composes the tile `rect` of the web-mercator pixel space at `zoom`.
pub fn compose_tile(
    map: &MapData,
    theme: &RenderTheme,
    renderer: &dyn Renderer,
    transform: &dyn ScreenTransform,
    rect: Rect,
    zoom: u8,
    ratio: f64,
) -> Pixmap {
    TileCompositor::new(map, theme, transform, rect, zoom).render(renderer, ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::recording::{CanvasOp, RecordingRenderer};
    use crate::render::Brush;
    use crate::theme::{ThemeElement, ThemeOptions};
    use crate::Color;
    use assert_matches::assert_matches;
    use tessera_types::Polygon;

    /// Geographic degrees used directly as tile pixels.
    struct Plane;

    impl ScreenTransform for Plane {
        fn ll2xy(&self, coordinates: &Coordinates) -> Point2<f64> {
            Point2::new(coordinates.lon, coordinates.lat)
        }

        fn xy2ll(&self, point: &Point2<f64>) -> Coordinates {
            Coordinates::new(point.x, point.y)
        }
    }

    fn tile() -> Rect {
        Rect::new(0.0, 0.0, 256.0, 256.0)
    }

    fn element(name: &str, attributes: &[(&str, &str)]) -> ThemeElement {
        attributes
            .iter()
            .fold(ThemeElement::new(name), |element, (name, value)| {
                element.with_attribute(*name, *value)
            })
    }

    fn rule(attributes: &[(&str, &str)], children: Vec<ThemeElement>) -> ThemeElement {
        children
            .into_iter()
            .fold(element("rule", attributes), ThemeElement::with_child)
    }

    fn theme(rules: Vec<ThemeElement>) -> RenderTheme {
        let root = rules
            .into_iter()
            .fold(ThemeElement::new("rendertheme"), ThemeElement::with_child);
        RenderTheme::from_element(&root, &ThemeOptions::default()).unwrap()
    }

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
    }

    fn line(points: &[(f64, f64)], layer: u8, tags: Vec<Tag>) -> Path {
        let ring = points.iter().map(|(x, y)| Coordinates::new(*x, *y)).collect();
        Path::new(layer, tags, Polygon::new(vec![ring]), None)
    }

    fn square(x: f64, y: f64, size: f64, layer: u8, tags: Vec<Tag>) -> Path {
        line(
            &[(x, y), (x + size, y), (x + size, y + size), (x, y + size), (x, y)],
            layer,
            tags,
        )
    }

    fn render(theme: &RenderTheme, points: Vec<Point>, paths: Vec<Path>) -> Vec<CanvasOp> {
        let renderer = RecordingRenderer::new();
        let pixmap = TileCompositor::with_entities(theme, &Plane, tile(), 14, points, paths)
            .render(&renderer, 2.0);
        assert_eq!((pixmap.width(), pixmap.height()), (512, 512));

        renderer.finished().remove(0)
    }

    fn stroke_colors(ops: &[CanvasOp]) -> Vec<Color> {
        ops.iter()
            .filter_map(|op| match op {
                CanvasOp::Path { paint, .. } => paint.pen.as_ref().map(|pen| pen.color),
                _ => None,
            })
            .collect()
    }

    fn texts(ops: &[CanvasOp]) -> Vec<&str> {
        ops.iter()
            .filter_map(|op| match op {
                CanvasOp::Text { text, .. } | CanvasOp::TextAlong { text, .. } => {
                    Some(text.as_str())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn paths_stacked_by_layer_then_z_order() {
        // Line instructions z0..z5, each selected by its own `id` tag and drawn in its own gray.
        let rules = (0..6)
            .map(|z| {
                let value = format!("z{z}");
                let color = format!("#{z:02X}{z:02X}{z:02X}");
                rule(
                    &[("k", "id"), ("v", value.as_str())],
                    vec![element("line", &[("stroke", color.as_str()), ("stroke-width", "1")])],
                )
            })
            .collect();
        let theme = theme(rules);

        let coords = [(10.0, 10.0), (100.0, 100.0)];
        let paths = vec![
            line(&coords, 2, tags(&[("id", "z5")])),
            line(&coords, 0, tags(&[("id", "z1")])),
            line(&coords, 2, tags(&[("id", "z3")])),
        ];

        let ops = render(&theme, vec![], paths);
        let gray = |v: u8| Color::rgba(v, v, v, 255);
        assert_eq!(stroke_colors(&ops), [gray(1), gray(3), gray(5)]);
    }

    #[test]
    fn area_batches_flush_on_style_change() {
        let theme = theme(vec![
            rule(
                &[("k", "landuse"), ("v", "forest")],
                vec![element("area", &[("fill", "#8000FF00")])],
            ),
            rule(
                &[("k", "highway"), ("v", "*")],
                vec![element("line", &[("stroke", "#000000")])],
            ),
            rule(
                &[("k", "natural"), ("v", "water")],
                vec![element("area", &[("fill", "#800000FF")])],
            ),
        ]);

        let paths = vec![
            square(10.0, 10.0, 50.0, 0, tags(&[("landuse", "forest")])),
            square(40.0, 40.0, 50.0, 0, tags(&[("landuse", "forest")])),
            line(&[(0.0, 0.0), (200.0, 200.0)], 0, tags(&[("highway", "track")])),
            square(100.0, 100.0, 50.0, 0, tags(&[("natural", "water")])),
            square(120.0, 120.0, 50.0, 1, tags(&[("landuse", "forest")])),
        ];

        let ops = render(&theme, vec![], paths);
        let sequence: Vec<_> = ops
            .iter()
            .map(|op| match op {
                CanvasOp::Path { layer, .. } => format!("{layer:?}"),
                CanvasOp::FlushLayer => "Flush".to_string(),
                _ => "Other".to_string(),
            })
            .collect();

        assert_eq!(
            sequence,
            [
                "Scratch", "Scratch", "Flush", // forest batch, broken by the line
                "Output", // highway
                "Scratch", "Flush", // water
                "Scratch", "Flush", // forest on layer 1
            ]
        );
        let forest = Some(Brush::Color(Color::rgba(0, 255, 0, 128)));
        assert_matches!(&ops[0], CanvasOp::Path { paint, .. } if paint.brush == forest);
    }

    #[test]
    fn geometry_is_tile_local() {
        let theme = theme(vec![rule(
            &[("k", "highway"), ("v", "*")],
            vec![element("line", &[("stroke", "#000000")])],
        )]);
        let renderer = RecordingRenderer::new();
        let rect = Rect::new(256.0, 512.0, 512.0, 768.0);
        let path = line(&[(300.0, 600.0), (400.0, 700.0)], 0, tags(&[("highway", "primary")]));

        TileCompositor::with_entities(&theme, &Plane, rect, 14, vec![], vec![path])
            .render(&renderer, 1.0);

        let ops = renderer.finished().remove(0);
        let expected = vec![Point2::new(44.0, 88.0), Point2::new(144.0, 188.0)];
        assert_matches!(&ops[0], CanvasOp::Path { path, .. } if path.rings()[0] == expected);
    }

    #[test]
    fn point_labels_prefer_higher_rank() {
        let theme = theme(vec![rule(
            &[("e", "node"), ("k", "place"), ("v", "*")],
            vec![element("caption", &[("k", "name"), ("font-size", "12")])],
        )]);
        let at = Coordinates::new(100.0, 100.0);
        let points = vec![
            Point::new(at, 0, tags(&[("place", "village"), ("name", "Lhota")])),
            Point::new(at, 0, tags(&[("place", "city"), ("name", "Praha")])),
            Point::new(
                Coordinates::new(200.0, 30.0),
                0,
                tags(&[("place", "town"), ("name", "")]),
            ),
        ];

        let ops = render(&theme, points, vec![]);
        assert_eq!(texts(&ops), ["Praha"]);
    }

    #[test]
    fn first_label_rule_with_value_wins() {
        let theme = theme(vec![rule(
            &[("e", "node"), ("k", "natural"), ("v", "peak")],
            vec![
                element("caption", &[("k", "name")]),
                element("caption", &[("k", "ele")]),
            ],
        )]);
        let points = vec![
            Point::new(
                Coordinates::new(50.0, 50.0),
                0,
                tags(&[("natural", "peak"), ("ele", "1603")]),
            ),
            Point::new(
                Coordinates::new(150.0, 150.0),
                0,
                tags(&[("natural", "peak"), ("name", "Sněžka"), ("ele", "1603")]),
            ),
        ];

        let ops = render(&theme, points, vec![]);
        let mut labels = texts(&ops);
        labels.sort();
        assert_eq!(labels, ["1603", "Sněžka"]);
    }

    #[test]
    fn area_labels() {
        let theme = theme(vec![rule(
            &[("e", "way"), ("k", "natural"), ("v", "water")],
            vec![
                element("area", &[("fill", "#0000FF")]),
                element(
                    "caption",
                    &[
                        ("k", "name"),
                        ("fill", "#000000"),
                        ("stroke", "#FFFFFF"),
                        ("stroke-width", "2"),
                    ],
                ),
            ],
        )]);

        let water = |name: &str| tags(&[("natural", "water"), ("name", name)]);
        let mut placed = square(20.0, 20.0, 100.0, 0, water("Lake"));
        placed.label_pos = Some(Coordinates::new(30.0, 40.0));
        let paths = vec![
            placed,
            square(150.0, 150.0, 60.0, 0, water("Pond")),
            // Centroid at the tile edge, label would not fit.
            square(-40.0, 200.0, 80.0, 0, water("Edge")),
            // Open paths get no area label.
            line(&[(10.0, 200.0), (60.0, 200.0)], 0, water("Open")),
        ];

        let ops = render(&theme, vec![], paths);
        let labels: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                CanvasOp::Text {
                    text,
                    position,
                    paint,
                } => Some((text.as_str(), *position, paint.halo)),
                _ => None,
            })
            .collect();

        assert_eq!(labels.len(), 2);
        // "Lake" is 4 * 0.6 * 9 px wide and 9 px high, centered on the label position.
        assert_eq!(labels[0].0, "Lake");
        approx::assert_abs_diff_eq!(labels[0].1.x, 30.0 - 10.8);
        approx::assert_abs_diff_eq!(labels[0].1.y, 40.0 - 4.5);
        assert_eq!(labels[0].2.map(|halo| halo.color), Some(Color::WHITE));
        // "Pond" is centered on the centroid.
        assert_eq!(labels[1].0, "Pond");
        approx::assert_abs_diff_eq!(labels[1].1.x, 180.0 - 10.8, epsilon = 1e-9);
    }

    #[test]
    fn ref_labels_are_deduplicated() {
        let theme = theme(vec![rule(
            &[("e", "way"), ("k", "highway"), ("v", "*")],
            vec![
                element("line", &[("stroke", "#000000")]),
                element("pathText", &[("k", "ref")]),
                element("pathText", &[("k", "name")]),
            ],
        )]);

        let road = |y: f64, key: &str, value: &str| {
            line(
                &[(10.0, y), (240.0, y)],
                0,
                tags(&[("highway", "primary"), (key, value)]),
            )
        };
        let paths = vec![
            road(20.0, "ref", "D1"),
            road(120.0, "ref", "D1"),
            road(180.0, "ref", "D2"),
            road(60.0, "name", "Main"),
            road(220.0, "name", "Main"),
        ];

        let ops = render(&theme, vec![], paths);
        assert_eq!(texts(&ops), ["D1", "D2", "Main", "Main"]);
    }

    #[test]
    fn unstyled_paths_get_no_line_labels() {
        let theme = theme(vec![
            rule(
                &[("e", "way"), ("k", "highway"), ("v", "*")],
                vec![element("pathText", &[("k", "name")])],
            ),
        ]);
        let paths = vec![line(
            &[(10.0, 20.0), (240.0, 20.0)],
            0,
            tags(&[("highway", "primary"), ("name", "Main")]),
        )];

        assert!(render(&theme, vec![], paths).is_empty());
    }

    #[test]
    fn labelled_area_gets_line_labels() {
        let theme = theme(vec![rule(
            &[("e", "way"), ("k", "natural"), ("v", "water")],
            vec![
                element("caption", &[("k", "name")]),
                element("pathText", &[("k", "ref")]),
            ],
        )]);
        let mut lake = square(
            20.0,
            20.0,
            200.0,
            0,
            tags(&[("natural", "water"), ("name", "Lake"), ("ref", "R1")]),
        );
        lake.label_pos = Some(Coordinates::new(30.0, 40.0));

        let ops = render(&theme, vec![], vec![lake]);
        assert_eq!(texts(&ops), ["Lake", "R1"]);
    }

    #[test]
    fn empty_tile() {
        let ops = render(&RenderTheme::builtin(), vec![], vec![]);
        assert!(ops.is_empty());
    }
}
