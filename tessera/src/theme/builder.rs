use std::collections::HashSet;
use std::path::Path;

use crate::error::ThemeError;
use crate::theme::element::ThemeElement;
use crate::theme::instruction::{AreaFill, LineStroke, PathInstruction, Styled, Symbol, TextLabel};
use crate::theme::rule::{EntityType, Rule};

/// Instruction pools of a theme, in declaration order.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Pools {
    pub paths: Vec<Styled<PathInstruction>>,
    pub path_labels: Vec<Styled<TextLabel>>,
    pub point_labels: Vec<Styled<TextLabel>>,
    pub area_labels: Vec<Styled<TextLabel>>,
    pub symbols: Vec<Styled<Symbol>>,
}

/// Categories enabled by `stylemenu` layers with `enabled="true"`.
pub(crate) fn enabled_categories(root: &ThemeElement) -> HashSet<String> {
    root.children
        .iter()
        .filter(|e| e.name == "stylemenu")
        .flat_map(|menu| menu.children.iter())
        .filter(|e| e.name == "layer" && e.attribute("enabled") == Some("true"))
        .flat_map(|layer| layer.children.iter())
        .filter(|e| e.name == "cat")
        .filter_map(|cat| cat.attribute("id"))
        .map(str::to_string)
        .collect()
}

/// Walks the rule tree, attaching every instruction to the rule snapshot it is declared under.
pub(crate) struct ThemeBuilder<'a> {
    dir: Option<&'a Path>,
    categories: &'a HashSet<String>,
    pools: Pools,
}

impl<'a> ThemeBuilder<'a> {
    pub fn new(dir: Option<&'a Path>, categories: &'a HashSet<String>) -> Self {
        Self {
            dir,
            categories,
            pools: Pools::default(),
        }
    }

    pub fn build(mut self, root: &ThemeElement) -> Result<Pools, ThemeError> {
        if root.name != "rendertheme" {
            return Err(ThemeError::NotATheme);
        }

        let rule = Rule::default();
        for child in root.children.iter().filter(|e| e.name == "rule") {
            self.rule(child, &rule)?;
        }

        Ok(self.pools)
    }

    fn rule(&mut self, element: &ThemeElement, parent: &Rule) -> Result<(), ThemeError> {
        if let Some(cat) = element.attribute("cat") {
            if !self.categories.contains(cat) {
                log::trace!("Skipping rule of disabled category {cat}");
                return Ok(());
            }
        }

        let rule = Rule::cascade(parent, element)?;
        for child in &element.children {
            match child.name.as_str() {
                "rule" => self.rule(child, &rule)?,
                "area" => {
                    let area = AreaFill::parse(child, self.dir, self.pools.paths.len())?;
                    self.push_path(&rule, PathInstruction::AreaFill(area));
                }
                "line" => {
                    let line = LineStroke::parse(child, self.pools.paths.len())?;
                    self.push_path(&rule, PathInstruction::LineStroke(line));
                }
                "pathText" => {
                    let label = TextLabel::parse(child)?;
                    if label.font.size > 0.0 {
                        self.pools.path_labels.push(styled(&rule, label));
                    }
                }
                "caption" => {
                    let label = TextLabel::parse(child)?;
                    if label.font.size > 0.0 {
                        let entity_type = rule.entity_type();
                        if entity_type.accepts(EntityType::Way) {
                            self.pools.area_labels.push(styled(&rule, label.clone()));
                        }
                        if entity_type.accepts(EntityType::Node) {
                            self.pools.point_labels.push(styled(&rule, label));
                        }
                    }
                }
                "symbol" => {
                    let symbol = Symbol::parse(child, self.dir)?;
                    self.pools.symbols.push(styled(&rule, symbol));
                }
                other => log::trace!("Ignoring theme element {other}"),
            }
        }

        Ok(())
    }

    fn push_path(&mut self, rule: &Rule, instruction: PathInstruction) {
        self.pools.paths.push(styled(rule, instruction));
    }
}

fn styled<T>(rule: &Rule, instruction: T) -> Styled<T> {
    Styled {
        rule: rule.clone(),
        instruction,
    }
}
