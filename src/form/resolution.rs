use std::collections::HashSet;

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

use crate::domain::{ConfigError, FieldArray, FieldDeclaration, FieldPath, FormConfig};

use super::evaluator;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("two visible fields resolve to '{path}'")]
    PathCollision { path: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedKind {
    Leaf,
    /// The array itself, surfaced even with zero items for add/remove controls.
    Array,
}

#[derive(Debug, Clone)]
pub struct ResolvedField<'a> {
    pub path: FieldPath,
    pub kind: ResolvedKind,
    pub visible: bool,
    /// Set on entries that belong to (or are) an `alwaysRegistered` array.
    pub always_registered: bool,
    pub declaration: &'a FieldDeclaration,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// Fail the pass when two visible entries share a path.
    pub strict_collisions: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            strict_collisions: true,
        }
    }
}

/// Flat, declaration-ordered outcome of one resolution pass.
#[derive(Debug, Clone, Default)]
pub struct VisibilityResolution<'a> {
    entries: Vec<ResolvedField<'a>>,
}

impl<'a> VisibilityResolution<'a> {
    pub fn entries(&self) -> &[ResolvedField<'a>] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedField<'a>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry for `path`, preferring a visible one when hidden twins exist.
    pub fn get(&self, path: &FieldPath) -> Option<&ResolvedField<'a>> {
        let mut fallback = None;
        for entry in self.entries.iter().filter(|entry| entry.path == *path) {
            if entry.visible {
                return Some(entry);
            }
            fallback.get_or_insert(entry);
        }
        fallback
    }

    pub fn is_visible(&self, path: &FieldPath) -> bool {
        self.get(path).is_some_and(|entry| entry.visible)
    }

    pub fn visible_paths(&self) -> Vec<&FieldPath> {
        self.entries
            .iter()
            .filter(|entry| entry.visible)
            .map(|entry| &entry.path)
            .collect()
    }

    /// Leaf path to visibility flag, in declaration order.
    pub fn leaves(&self) -> IndexMap<String, bool> {
        self.collapsed()
            .into_iter()
            .filter(|(_, entry)| entry.kind == ResolvedKind::Leaf)
            .map(|(path, entry)| (path.to_string(), entry.visible))
            .collect()
    }

    pub fn arrays(&self) -> impl Iterator<Item = &ResolvedField<'a>> {
        self.entries
            .iter()
            .filter(|entry| entry.kind == ResolvedKind::Array)
    }

    /// Declaration of the array resolved at `path`, preferring a visible twin.
    pub fn array(&self, path: &FieldPath) -> Option<&'a FieldArray> {
        let mut fallback = None;
        for entry in self.arrays().filter(|entry| entry.path == *path) {
            let declaration = entry.declaration.as_field_array();
            if entry.visible {
                return declaration;
            }
            fallback = fallback.or(declaration);
        }
        fallback
    }

    /// One entry per storage path; a visible entry wins over hidden twins.
    pub(crate) fn collapsed(&self) -> IndexMap<&FieldPath, &ResolvedField<'a>> {
        let mut merged: IndexMap<&FieldPath, &ResolvedField<'a>> = IndexMap::new();
        for entry in &self.entries {
            let replace = merged
                .get(&entry.path)
                .is_none_or(|existing| !existing.visible && entry.visible);
            if replace {
                merged.insert(&entry.path, entry);
            }
        }
        merged
    }
}

/// Resolve visibility for every declaration of `config` against `values`.
pub fn resolve<'a>(
    config: &'a FormConfig,
    values: &Value,
) -> Result<VisibilityResolution<'a>, ResolveError> {
    resolve_with_options(config, values, ResolveOptions::default())
}

pub fn resolve_with_options<'a>(
    config: &'a FormConfig,
    values: &Value,
    options: ResolveOptions,
) -> Result<VisibilityResolution<'a>, ResolveError> {
    let mut resolver = Resolver {
        options,
        entries: Vec::new(),
        visible: HashSet::new(),
    };
    resolver.walk(config.fields(), values, &FieldPath::root(), true, false)?;
    trace!(
        entries = resolver.entries.len(),
        visible = resolver.visible.len(),
        "resolved field visibility"
    );
    Ok(VisibilityResolution {
        entries: resolver.entries,
    })
}

struct Resolver<'a> {
    options: ResolveOptions,
    entries: Vec<ResolvedField<'a>>,
    visible: HashSet<FieldPath>,
}

impl<'a> Resolver<'a> {
    /// `visible` is false once an ancestor is hidden; from then on conditions
    /// are no longer evaluated.
    fn walk(
        &mut self,
        fields: &'a [FieldDeclaration],
        scope: &Value,
        prefix: &FieldPath,
        visible: bool,
        always_registered: bool,
    ) -> Result<(), ResolveError> {
        for field in fields {
            match field {
                FieldDeclaration::Conditional(_) | FieldDeclaration::DynamicSection(_) => {
                    let shown = visible && evaluator::is_visible(field, scope);
                    self.walk(field.children(), scope, prefix, shown, always_registered)?;
                }
                FieldDeclaration::FieldArray(array) => {
                    let name = FieldPath::parse(&array.name)?;
                    let path = prefix.join(&name);
                    let always_registered = always_registered || array.always_registered;
                    self.emit(ResolvedField {
                        path: path.clone(),
                        kind: ResolvedKind::Array,
                        visible,
                        always_registered,
                        declaration: field,
                    })?;
                    let items = name.lookup(scope).and_then(Value::as_array);
                    for (index, item) in items.into_iter().flatten().enumerate() {
                        let item_prefix = path.index(index);
                        self.walk(&array.fields, item, &item_prefix, visible, always_registered)?;
                    }
                }
                leaf => {
                    let path = prefix.join(&FieldPath::parse(leaf.name())?);
                    self.emit(ResolvedField {
                        path,
                        kind: ResolvedKind::Leaf,
                        visible,
                        always_registered,
                        declaration: leaf,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, entry: ResolvedField<'a>) -> Result<(), ResolveError> {
        if entry.visible
            && !self.visible.insert(entry.path.clone())
            && self.options.strict_collisions
        {
            return Err(ResolveError::PathCollision {
                path: entry.path.to_string(),
            });
        }
        self.entries.push(entry);
        Ok(())
    }
}
