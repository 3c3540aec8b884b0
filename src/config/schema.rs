use crate::validate::{validate_definition, ValidationError};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// One regex substitution: every match of `target` is replaced with
/// `replacement`, which may reference `target`'s capture groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchRule {
    target: String,
    replacement: String,
}

impl PatchRule {
    pub fn new(target: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            replacement: replacement.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    fn from_value(index: usize, rule: usize, value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or(ValidationError::RuleNotAnObject { index, rule })?;
        let target = rule_string_field(object, index, rule, "target")?;
        let replacement = rule_string_field(object, index, rule, "replacement")?;
        Ok(Self {
            target,
            replacement,
        })
    }
}

/// A named group of rules, gated by a locator pattern.
///
/// Serializes to the patch-file shape, where the rules live under `patches`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchDefinition {
    name: String,
    locator: String,
    #[serde(rename = "patches")]
    rules: Vec<PatchRule>,
}

impl PatchDefinition {
    pub fn new(name: impl Into<String>, locator: impl Into<String>, rules: Vec<PatchRule>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            rules,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Build a definition from one element of a patch file, checking that the
    /// required fields exist and carry the right JSON types.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or(ValidationError::NotAnObject { index })?;

        let name = string_field(object, index, "name")?;
        let locator = string_field(object, index, "locator")?;

        let rules = match object.get("patches") {
            None => {
                return Err(ValidationError::MissingField {
                    index,
                    field: "patches",
                })
            }
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(rule, item)| PatchRule::from_value(index, rule, item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ValidationError::WrongType {
                    index,
                    field: "patches",
                    expected: "a list",
                })
            }
        };

        Ok(Self {
            name,
            locator,
            rules,
        })
    }
}

fn string_field(
    object: &Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<String, ValidationError> {
    match object.get(field) {
        None => Err(ValidationError::MissingField { index, field }),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ValidationError::WrongType {
            index,
            field,
            expected: "a string",
        }),
    }
}

fn rule_string_field(
    object: &Map<String, Value>,
    index: usize,
    rule: usize,
    field: &'static str,
) -> Result<String, ValidationError> {
    match object.get(field) {
        None => Err(ValidationError::MissingRuleField { index, rule, field }),
        Some(Value::String(value)) => Ok(value.clone()),
        Some(_) => Err(ValidationError::RuleWrongType { index, rule, field }),
    }
}

#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("patch index {index} out of range (collection has {len} patches)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Ordered patch definitions; insertion order is application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PatchCollection {
    patches: Vec<PatchDefinition>,
}

/// Aggregate counts shown when listing a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSummary {
    pub total_patches: usize,
    pub total_rules: usize,
    pub patch_names: Vec<String>,
}

impl PatchCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a patch file document. A single object is accepted as a
    /// one-element collection.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let patches = match value {
            Value::Object(_) => vec![PatchDefinition::from_value(0, value)?],
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, item)| PatchDefinition::from_value(index, item))
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(ValidationError::NotACollection),
        };
        Ok(Self { patches })
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PatchDefinition> {
        self.patches.iter()
    }

    pub fn as_slice(&self) -> &[PatchDefinition] {
        &self.patches
    }

    pub fn get(&self, index: usize) -> Result<&PatchDefinition, CollectionError> {
        self.patches
            .get(index)
            .ok_or(CollectionError::IndexOutOfRange {
                index,
                len: self.patches.len(),
            })
    }

    /// Append a definition after checking it the same way a loaded file is.
    pub fn push(&mut self, patch: PatchDefinition) -> Result<(), CollectionError> {
        validate_definition(self.patches.len(), &patch)?;
        self.patches.push(patch);
        Ok(())
    }

    pub fn update(&mut self, index: usize, patch: PatchDefinition) -> Result<(), CollectionError> {
        let len = self.patches.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
        validate_definition(index, &patch)?;
        self.patches[index] = patch;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<PatchDefinition, CollectionError> {
        let len = self.patches.len();
        if index >= len {
            return Err(CollectionError::IndexOutOfRange { index, len });
        }
        Ok(self.patches.remove(index))
    }

    pub fn clear(&mut self) {
        self.patches.clear();
    }

    /// Merge another collection after this one (import with merge).
    pub fn extend(&mut self, other: PatchCollection) {
        self.patches.extend(other.patches);
    }

    /// Case-insensitive substring search over definition names. Each hit
    /// comes with its index in the collection.
    pub fn search(&self, query: &str) -> Vec<(usize, &PatchDefinition)> {
        let query = query.to_lowercase();
        self.patches
            .iter()
            .enumerate()
            .filter(|(_, patch)| patch.name.to_lowercase().contains(&query))
            .collect()
    }

    /// Copy out the definitions at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Result<PatchCollection, CollectionError> {
        let patches = indices
            .iter()
            .map(|&index| self.get(index).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patches })
    }

    /// Keep only the definitions whose name is in `names`, preserving order.
    pub fn filter_by_names(&self, names: &[String]) -> PatchCollection {
        let patches = self
            .patches
            .iter()
            .filter(|patch| names.iter().any(|name| name == &patch.name))
            .cloned()
            .collect();
        Self { patches }
    }

    pub fn summary(&self) -> CollectionSummary {
        CollectionSummary {
            total_patches: self.patches.len(),
            total_rules: self.patches.iter().map(|p| p.rules.len()).sum(),
            patch_names: self.patches.iter().map(|p| p.name.clone()).collect(),
        }
    }
}

impl From<Vec<PatchDefinition>> for PatchCollection {
    fn from(patches: Vec<PatchDefinition>) -> Self {
        Self { patches }
    }
}

impl IntoIterator for PatchCollection {
    type Item = PatchDefinition;
    type IntoIter = std::vec::IntoIter<PatchDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatchCollection {
    type Item = &'a PatchDefinition;
    type IntoIter = std::slice::Iter<'a, PatchDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.patches.iter()
    }
}
