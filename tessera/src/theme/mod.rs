//! Cascading render theme.
//!
//! A theme is a tree of `rule` elements. Every rule narrows the constraints inherited from its
//! parent (entity type, zoom range, closed state, tag filters) and the drawing instructions
//! declared inside it apply to entities that satisfy the whole chain.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use quick_cache::unsync::Cache;
use tessera_mapsforge::Tag;

use crate::error::ThemeError;

mod builder;
mod element;
mod instruction;
mod rule;

use builder::{enabled_categories, Pools, ThemeBuilder};
pub use element::ThemeElement;
pub use instruction::{
    resource_path, scaled_width, AreaFill, LineStroke, PathInstruction, Styled, Symbol, TextLabel,
};
pub use rule::{Closed, EntityType, Filter, Rule, MAX_ZOOM};

const DEFAULT_THEME: &str = include_str!("default.json");

/// Capacity of the [`StyleCache`].
pub const STYLE_CACHE_CAPACITY: usize = 1024;

/// Theme loading options.
#[derive(Debug, Clone, Default)]
pub struct ThemeOptions {
    /// Directory against which image sources are resolved.
    pub dir: Option<PathBuf>,
    /// Enabled rule categories. When not set, categories of the `stylemenu` layers marked as
    /// enabled are used.
    pub categories: Option<HashSet<String>>,
}

/// Render theme: instruction pools built from a theme tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTheme {
    pools: Pools,
}

impl Default for RenderTheme {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RenderTheme {
    /// Builds the theme from its element tree.
    pub fn from_element(root: &ThemeElement, options: &ThemeOptions) -> Result<Self, ThemeError> {
        let categories = match &options.categories {
            Some(categories) => categories.clone(),
            None => enabled_categories(root),
        };

        let pools = ThemeBuilder::new(options.dir.as_deref(), &categories).build(root)?;
        Ok(Self { pools })
    }

    /// Parses a JSON theme document.
    pub fn from_json(json: &str, options: &ThemeOptions) -> Result<Self, ThemeError> {
        let root: ThemeElement = serde_json::from_str(json)?;
        Self::from_element(&root, options)
    }

    /// Loads a JSON theme file. Image sources are resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ThemeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let options = ThemeOptions {
            dir: path.parent().map(Path::to_path_buf),
            categories: None,
        };
        Self::from_json(&json, &options)
    }

    /// Loads a theme file, falling back to the built-in theme if the file is not given or
    /// cannot be loaded.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::builtin();
        };

        match Self::load(path) {
            Ok(theme) => theme,
            Err(err) => {
                log::warn!("{}: {err}, using the default theme", path.display());
                Self::builtin()
            }
        }
    }

    /// Theme compiled into the library.
    pub fn builtin() -> Self {
        Self::from_json(DEFAULT_THEME, &ThemeOptions::default()).unwrap_or_else(|err| {
            log::error!("Failed to load the built-in theme: {err}");
            Self::empty()
        })
    }

    /// Theme that draws nothing.
    pub fn empty() -> Self {
        Self {
            pools: Pools::default(),
        }
    }

    /// Area and line instructions for a path, in declaration order.
    pub fn paths(&self, zoom: u8, closed: bool, tags: &[Tag]) -> Vec<&Styled<PathInstruction>> {
        self.pools
            .paths
            .iter()
            .filter(|s| s.rule.matches(zoom, EntityType::Way, closed, tags))
            .collect()
    }

    /// Labels drawn along paths.
    pub fn path_labels(&self, zoom: u8) -> Vec<&Styled<TextLabel>> {
        zoom_filter(&self.pools.path_labels, zoom)
    }

    /// Labels of points.
    pub fn point_labels(&self, zoom: u8) -> Vec<&Styled<TextLabel>> {
        zoom_filter(&self.pools.point_labels, zoom)
    }

    /// Labels of closed paths.
    pub fn area_labels(&self, zoom: u8) -> Vec<&Styled<TextLabel>> {
        zoom_filter(&self.pools.area_labels, zoom)
    }

    /// Symbols of points.
    pub fn point_symbols(&self, zoom: u8) -> Vec<&Styled<Symbol>> {
        self.symbols(zoom, EntityType::Node)
    }

    /// Symbols of closed paths.
    pub fn area_symbols(&self, zoom: u8) -> Vec<&Styled<Symbol>> {
        self.symbols(zoom, EntityType::Way)
    }

    fn symbols(&self, zoom: u8, entity_type: EntityType) -> Vec<&Styled<Symbol>> {
        self.pools
            .symbols
            .iter()
            .filter(|s| s.rule.matches_zoom(zoom) && s.rule.entity_type().accepts(entity_type))
            .collect()
    }

    /// Number of area and line instructions.
    pub fn path_instruction_count(&self) -> usize {
        self.pools.paths.len()
    }
}

fn zoom_filter<T>(pool: &[Styled<T>], zoom: u8) -> Vec<&Styled<T>> {
    pool.iter().filter(|s| s.rule.matches_zoom(zoom)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct StyleKey {
    zoom: u8,
    closed: bool,
    tags: Vec<Tag>,
}

/// Memoizes [`RenderTheme::paths`] for repeated tag sets.
pub struct StyleCache<'a> {
    theme: &'a RenderTheme,
    cache: Cache<StyleKey, Vec<usize>>,
}

impl<'a> StyleCache<'a> {
    /// Creates an empty cache.
    pub fn new(theme: &'a RenderTheme) -> Self {
        Self {
            theme,
            cache: Cache::new(STYLE_CACHE_CAPACITY),
        }
    }

    /// Same as [`RenderTheme::paths`].
    pub fn paths(
        &mut self,
        zoom: u8,
        closed: bool,
        tags: &[Tag],
    ) -> Vec<&'a Styled<PathInstruction>> {
        let theme: &'a RenderTheme = self.theme;
        let pool = &theme.pools.paths;
        let key = StyleKey {
            zoom,
            closed,
            tags: tags.to_vec(),
        };

        if let Some(indices) = self.cache.get(&key) {
            return indices.iter().map(|&i| &pool[i]).collect();
        }

        let indices: Vec<usize> = pool
            .iter()
            .enumerate()
            .filter(|(_, s)| s.rule.matches(zoom, EntityType::Way, closed, tags))
            .map(|(i, _)| i)
            .collect();
        let styles = indices.iter().map(|&i| &pool[i]).collect();
        self.cache.insert(key, indices);

        styles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
    }

    fn theme(json: &str) -> RenderTheme {
        RenderTheme::from_json(json, &ThemeOptions::default()).unwrap()
    }

    const THEME: &str = r##"{
        "name": "rendertheme",
        "children": [
            {"name": "stylemenu", "children": [
                {"name": "layer", "attributes": {"id": "base", "enabled": "true"}, "children": [
                    {"name": "cat", "attributes": {"id": "roads"}}
                ]},
                {"name": "layer", "attributes": {"id": "extra"}, "children": [
                    {"name": "cat", "attributes": {"id": "rails"}}
                ]}
            ]},
            {"name": "rule", "attributes": {"e": "way", "k": "natural", "v": "water"}, "children": [
                {"name": "area", "attributes": {"fill": "#0000FF"}},
                {"name": "caption", "attributes": {"k": "name"}}
            ]},
            {"name": "rule", "attributes": {"e": "way", "k": "highway", "v": "*", "cat": "roads"}, "children": [
                {"name": "line", "attributes": {"stroke": "#000000", "stroke-width": "2"}},
                {"name": "rule", "attributes": {"k": "highway", "v": "primary", "zoom-min": "10"}, "children": [
                    {"name": "line", "attributes": {"stroke": "#FF0000"}}
                ]},
                {"name": "pathText", "attributes": {"k": "ref"}}
            ]},
            {"name": "rule", "attributes": {"e": "way", "k": "railway", "v": "*", "cat": "rails"}, "children": [
                {"name": "line", "attributes": {"stroke": "#555555"}}
            ]},
            {"name": "rule", "attributes": {"e": "node", "k": "place", "v": "*"}, "children": [
                {"name": "caption", "attributes": {"k": "name", "font-size": "0"}},
                {"name": "caption", "attributes": {"k": "name", "font-size": "12"}},
                {"name": "symbol", "attributes": {"src": "file:city.svg"}}
            ]},
            {"name": "rule", "attributes": {"k": "amenity", "v": "*"}, "children": [
                {"name": "symbol", "attributes": {"src": "amenity.png"}}
            ]}
        ]
    }"##;

    #[test]
    fn paths_in_declaration_order() {
        let theme = theme(THEME);
        let styles = theme.paths(12, false, &tags(&[("highway", "primary")]));
        let z: Vec<_> = styles.iter().map(|s| s.instruction.z_order()).collect();
        assert_eq!(z, [1, 2]);

        let styles = theme.paths(9, false, &tags(&[("highway", "primary")]));
        assert_eq!(styles.len(), 1);
    }

    #[test]
    fn disabled_category_is_skipped() {
        let theme = theme(THEME);
        assert!(theme.paths(12, false, &tags(&[("railway", "rail")])).is_empty());

        let options = ThemeOptions {
            dir: None,
            categories: Some(HashSet::from(["rails".to_string()])),
        };
        let theme = RenderTheme::from_json(THEME, &options).unwrap();
        assert_eq!(theme.paths(12, false, &tags(&[("railway", "rail")])).len(), 1);
        assert!(theme.paths(12, false, &tags(&[("highway", "primary")])).is_empty());
    }

    #[test]
    fn label_and_symbol_pools() {
        let theme = theme(THEME);
        assert_eq!(theme.path_labels(5).len(), 1);
        assert_eq!(theme.area_labels(5).len(), 1);
        assert_eq!(theme.point_labels(5).len(), 1);
        assert_eq!(theme.point_labels(5)[0].instruction.font.size, 12.0);

        assert_eq!(theme.point_symbols(5).len(), 2);
        assert_eq!(theme.area_symbols(5).len(), 1);
    }

    #[test]
    fn not_a_theme() {
        let result = RenderTheme::from_json(r#"{"name": "html"}"#, &ThemeOptions::default());
        assert_matches!(result, Err(ThemeError::NotATheme));
    }

    #[test]
    fn invalid_attribute_aborts_load() {
        let json = r#"{"name": "rendertheme", "children": [
            {"name": "rule", "attributes": {"k": "highway", "v": "*"}, "children": [
                {"name": "line", "attributes": {"stroke-width": "-2"}}
            ]}
        ]}"#;
        let result = RenderTheme::from_json(json, &ThemeOptions::default());
        assert_matches!(result, Err(ThemeError::InvalidAttribute { .. }));
    }

    #[test]
    fn fallback_to_builtin() {
        let builtin = RenderTheme::builtin();
        assert!(builtin.path_instruction_count() > 0);

        let theme = RenderTheme::load_or_default(Some(Path::new("/nonexistent/theme.json")));
        assert_eq!(theme, builtin);
        assert_eq!(RenderTheme::load_or_default(None), builtin);
    }

    #[test]
    fn builtin_styles_common_features() {
        let theme = RenderTheme::builtin();
        assert!(!theme.paths(14, true, &tags(&[("natural", "water")])).is_empty());
        assert!(!theme.paths(14, false, &tags(&[("highway", "primary")])).is_empty());
        assert!(theme
            .paths(14, false, &tags(&[("highway", "primary"), ("area", "yes")]))
            .is_empty());
        assert!(theme.paths(14, false, &tags(&[("boundary", "administrative")])).is_empty());
        assert!(!theme.point_labels(10).is_empty());
    }

    #[test]
    fn load_resolves_sources_against_theme_dir() {
        let dir = std::env::temp_dir().join(format!("tessera-theme-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("theme.json");
        std::fs::write(&path, THEME).unwrap();

        let theme = RenderTheme::load(&path).unwrap();
        let symbols = theme.point_symbols(5);
        let image = symbols[0].instruction.image.as_ref().unwrap();
        assert_eq!(image.path(), dir.join("city.svg"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn style_cache_matches_uncached_query() {
        let theme = theme(THEME);
        let mut cache = StyleCache::new(&theme);
        let road = tags(&[("highway", "primary")]);

        for _ in 0..2 {
            let cached = cache.paths(12, false, &road);
            assert_eq!(cached, theme.paths(12, false, &road));
        }
        assert_eq!(cache.paths(9, false, &road), theme.paths(9, false, &road));
    }
}
