//! Cascading match predicates.

use tessera_mapsforge::Tag;

use crate::error::ThemeError;
use crate::theme::element::ThemeElement;

/// Highest zoom level a rule can match.
pub const MAX_ZOOM: u8 = 127;

/// Entity type a rule applies to.
///
/// Narrowing a parent constraint with a child's is a bitwise OR: `node` under `way` gives
/// [`EntityType::Invalid`], which matches nothing.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EntityType {
    /// Both nodes and ways.
    #[default]
    Any,
    /// Point entities.
    Node,
    /// Path entities.
    Way,
    /// Contradicting constraints.
    Invalid,
}

impl EntityType {
    fn bits(self) -> u8 {
        self as u8
    }

    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::Any,
            1 => Self::Node,
            2 => Self::Way,
            _ => Self::Invalid,
        }
    }

    /// Combines the inherited constraint with an own one.
    pub fn narrow(self, other: Self) -> Self {
        Self::from_bits(self.bits() | other.bits())
    }

    /// Returns true if entities of the queried type are accepted.
    pub fn accepts(self, queried: EntityType) -> bool {
        self == Self::Any || self == queried
    }
}

/// Closed-polygon constraint of a rule.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Closed {
    /// Both closed and open paths.
    #[default]
    Any,
    /// Closed paths only.
    Yes,
    /// Open paths only.
    No,
    /// Contradicting constraints.
    Invalid,
}

impl Closed {
    fn from_bits(bits: u8) -> Self {
        match bits & 3 {
            0 => Self::Any,
            1 => Self::Yes,
            2 => Self::No,
            _ => Self::Invalid,
        }
    }

    /// Combines the inherited constraint with an own one.
    pub fn narrow(self, other: Self) -> Self {
        Self::from_bits(self as u8 | other as u8)
    }

    /// Returns true if a path with the given state is accepted.
    pub fn accepts(self, closed: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Yes => closed,
            Self::No => !closed,
            Self::Invalid => false,
        }
    }
}

/// Key/value condition of a rule.
///
/// An empty string in `keys` or `values` is a wildcard entry (written as `*` in themes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Filter {
    keys: Vec<String>,
    values: Vec<String>,
    negated: bool,
}

fn wildcard_eq(entry: &str, value: &str) -> bool {
    entry.is_empty() || entry == value
}

impl Filter {
    /// Builds a filter from `k` and `v` attribute values.
    ///
    /// Alternatives are separated by `|`, `*` means any. A `~` among the values makes the filter
    /// negated.
    pub fn new(keys: &str, values: &str) -> Self {
        let split = |s: &str| -> Vec<String> {
            s.split('|')
                .map(|part| if part == "*" { "" } else { part })
                .map(str::to_string)
                .collect()
        };

        let keys = split(keys);
        let mut values = split(values);
        let len = values.len();
        values.retain(|v| v != "~");
        let negated = values.len() != len;

        Self {
            keys,
            values,
            negated,
        }
    }

    /// Returns true if the filter accepts every tag set.
    pub fn is_tautology(&self) -> bool {
        !self.negated
            && self.keys.iter().any(String::is_empty)
            && self.values.iter().any(String::is_empty)
    }

    /// Whether the filter was negated with `~`.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Checks the tags.
    ///
    /// A plain filter needs a tag with one of the keys and a tag with one of the values. A negated
    /// filter passes when none of the keys is present or when one of the values is.
    pub fn matches(&self, tags: &[Tag]) -> bool {
        let key_matches = self.keys.iter().any(String::is_empty)
            || self
                .keys
                .iter()
                .any(|k| tags.iter().any(|tag| wildcard_eq(k, &tag.key)));
        let value_matches = self.values.iter().any(String::is_empty)
            || self
                .values
                .iter()
                .any(|v| tags.iter().any(|tag| wildcard_eq(v, &tag.value)));

        if self.negated {
            !key_matches || value_matches
        } else {
            key_matches && value_matches
        }
    }
}

/// Accumulated predicate of a `rule` element and all its ancestors.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    entity_type: EntityType,
    closed: Closed,
    zoom_min: u8,
    zoom_max: u8,
    filters: Vec<Filter>,
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            entity_type: EntityType::Any,
            closed: Closed::Any,
            zoom_min: 0,
            zoom_max: MAX_ZOOM,
            filters: vec![],
        }
    }
}

fn parse_zoom(element: &ThemeElement, attribute: &str) -> Result<Option<u8>, ThemeError> {
    let Some(value) = element.attribute(attribute) else {
        return Ok(None);
    };

    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|zoom| *zoom >= 0)
        .map(|zoom| Some(zoom.min(MAX_ZOOM as i64) as u8))
        .ok_or_else(|| ThemeError::InvalidAttribute {
            attribute: attribute.to_string(),
            value: value.to_string(),
        })
}

impl Rule {
    /// Creates a rule that narrows `parent` with the attributes of a `rule` element.
    pub fn cascade(parent: &Rule, element: &ThemeElement) -> Result<Rule, ThemeError> {
        let mut rule = parent.clone();

        let entity_type = match element.attribute("e") {
            Some("way") => EntityType::Way,
            Some("node") => EntityType::Node,
            _ => EntityType::Any,
        };
        rule.entity_type = rule.entity_type.narrow(entity_type);

        let closed = match element.attribute("closed") {
            Some("yes") => Closed::Yes,
            Some("no") => Closed::No,
            _ => Closed::Any,
        };
        rule.closed = rule.closed.narrow(closed);

        if let Some(zoom_min) = parse_zoom(element, "zoom-min")? {
            rule.zoom_min = rule.zoom_min.max(zoom_min);
        }
        if let Some(zoom_max) = parse_zoom(element, "zoom-max")? {
            rule.zoom_max = rule.zoom_max.min(zoom_max);
        }

        let filter = Filter::new(
            element.attribute("k").unwrap_or("*"),
            element.attribute("v").unwrap_or("*"),
        );
        if !filter.is_tautology() {
            rule.filters.push(filter);
        }

        Ok(rule)
    }

    /// Entity type constraint.
    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    /// Closed-state constraint.
    pub fn closed(&self) -> Closed {
        self.closed
    }

    /// Inclusive zoom range.
    pub fn zoom_range(&self) -> (u8, u8) {
        (self.zoom_min, self.zoom_max)
    }

    /// Accumulated filters.
    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Returns true if the zoom level is in the rule's range.
    pub fn matches_zoom(&self, zoom: u8) -> bool {
        (self.zoom_min..=self.zoom_max).contains(&zoom)
    }

    /// Checks the tag filters only.
    pub fn matches_tags(&self, tags: &[Tag]) -> bool {
        self.filters.iter().all(|filter| filter.matches(tags))
    }

    /// Checks the closed-state constraint and the tag filters.
    pub fn matches_closed(&self, closed: bool, tags: &[Tag]) -> bool {
        self.closed.accepts(closed) && self.matches_tags(tags)
    }

    /// Full check of all constraints.
    pub fn matches(&self, zoom: u8, entity_type: EntityType, closed: bool, tags: &[Tag]) -> bool {
        self.entity_type.accepts(entity_type)
            && self.matches_zoom(zoom)
            && self.matches_closed(closed, tags)
    }
}
