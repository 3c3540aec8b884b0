//! Patch set validation.
//!
//! Two levels of checking run before anything touches the disk:
//!
//! - [`validate`] is the creation-time check used when patches are loaded,
//!   added or saved: names are non-empty and every locator and rule target
//!   compiles.
//! - [`validate_for_apply`] is what the engine runs before a patch run. On
//!   top of [`validate`] it requires at least one rule per definition and
//!   checks every replacement template against the groups its target
//!   actually defines.
//!
//! # Replacement syntax
//!
//! Replacements use the `regex` crate's template syntax: `$1`, `${1}`,
//! `$name`, `${name}`, and `$$` for a literal dollar sign. Python-style
//! back-references (`\1`, `\g<name>`) are *not* interpreted and would be
//! inserted literally; [`lint_replacements`] flags them. Locators or targets
//! that rely on look-around or back-references inside the pattern do not
//! compile with this engine and are rejected as invalid patterns.

use crate::cache;
use crate::config::{PatchCollection, PatchDefinition};
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Validation errors. Each variant names the offending definition by its
/// index in the collection (and the rule index where relevant).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("patch collection must be a single patch object or an array of patches")]
    NotACollection,

    #[error("patch {index} must be an object")]
    NotAnObject { index: usize },

    #[error("patch {index} missing required field: {field}")]
    MissingField { index: usize, field: &'static str },

    #[error("patch {index} '{field}' must be {expected}")]
    WrongType {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("patch {index}, rule {rule} must be an object")]
    RuleNotAnObject { index: usize, rule: usize },

    #[error("patch {index}, rule {rule} missing '{field}'")]
    MissingRuleField {
        index: usize,
        rule: usize,
        field: &'static str,
    },

    #[error("patch {index}, rule {rule} '{field}' must be a string")]
    RuleWrongType {
        index: usize,
        rule: usize,
        field: &'static str,
    },

    #[error("patch {index} has an empty name")]
    EmptyName { index: usize },

    #[error("patch {index} has invalid locator pattern: {reason}")]
    InvalidLocatorPattern { index: usize, reason: String },

    #[error("patch {index}, rule {rule} has invalid target pattern: {reason}")]
    InvalidTargetPattern {
        index: usize,
        rule: usize,
        reason: String,
    },

    #[error("patch {index} ('{name}') has no rules")]
    EmptyRules { index: usize, name: String },

    #[error("patch {index}, rule {rule} replacement references unknown group '{group}'")]
    UnknownReplacementGroup {
        index: usize,
        rule: usize,
        group: String,
    },
}

/// Creation-time validation of a whole collection; stops at the first failure.
pub fn validate(patches: &PatchCollection) -> Result<(), ValidationError> {
    for (index, patch) in patches.iter().enumerate() {
        validate_definition(index, patch)?;
    }
    Ok(())
}

/// Creation-time validation of one definition sitting at `index`.
pub fn validate_definition(index: usize, patch: &PatchDefinition) -> Result<(), ValidationError> {
    if patch.name().trim().is_empty() {
        return Err(ValidationError::EmptyName { index });
    }

    compile_locator(index, patch)?;

    for (rule_index, rule) in patch.rules().iter().enumerate() {
        compile_target(index, rule_index, rule.target())?;
    }

    Ok(())
}

/// Apply-time validation: everything [`validate`] checks, plus non-empty
/// rule lists and replacement group references.
pub fn validate_for_apply(patches: &PatchCollection) -> Result<(), ValidationError> {
    for (index, patch) in patches.iter().enumerate() {
        validate_definition_for_apply(index, patch)?;
    }
    Ok(())
}

/// Apply-time validation of one definition sitting at `index`.
pub fn validate_definition_for_apply(
    index: usize,
    patch: &PatchDefinition,
) -> Result<(), ValidationError> {
    validate_definition(index, patch)?;

    if patch.rules().is_empty() {
        return Err(ValidationError::EmptyRules {
            index,
            name: patch.name().to_string(),
        });
    }

    for (rule_index, rule) in patch.rules().iter().enumerate() {
        let target = compile_target(index, rule_index, rule.target())?;
        check_replacement(index, rule_index, &target, rule.replacement())?;
    }
    Ok(())
}

pub(crate) fn compile_locator(index: usize, patch: &PatchDefinition) -> Result<Regex, ValidationError> {
    if patch.locator().is_empty() {
        return Err(ValidationError::InvalidLocatorPattern {
            index,
            reason: "pattern is empty".to_string(),
        });
    }
    cache::get_or_compile(patch.locator()).map_err(|e| ValidationError::InvalidLocatorPattern {
        index,
        reason: e.to_string(),
    })
}

pub(crate) fn compile_target(index: usize, rule: usize, target: &str) -> Result<Regex, ValidationError> {
    cache::get_or_compile(target).map_err(|e| ValidationError::InvalidTargetPattern {
        index,
        rule,
        reason: e.to_string(),
    })
}

/// Check that every group a replacement template references exists in `target`.
pub fn check_replacement(
    index: usize,
    rule: usize,
    target: &Regex,
    replacement: &str,
) -> Result<(), ValidationError> {
    for group in group_references(replacement) {
        let known = match group.parse::<usize>() {
            Ok(n) => n < target.captures_len(),
            Err(_) => target.capture_names().flatten().any(|name| name == group),
        };
        if !known {
            return Err(ValidationError::UnknownReplacementGroup {
                index,
                rule,
                group: group.to_string(),
            });
        }
    }
    Ok(())
}

/// Extract group references from a `regex` replacement template.
///
/// Mirrors the crate's own parsing: `$$` is an escaped dollar, `${...}` takes
/// everything up to the closing brace, and a bare `$` takes the longest run
/// of `[_0-9A-Za-z]`. A `$` that starts no reference is literal.
fn group_references(template: &str) -> Vec<&str> {
    let bytes = template.as_bytes();
    let mut refs = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        match bytes.get(i + 1) {
            Some(b'$') => i += 2,
            Some(b'{') => match template[i + 2..].find('}') {
                Some(close) => {
                    let name = &template[i + 2..i + 2 + close];
                    if !name.is_empty() {
                        refs.push(name);
                    }
                    i += close + 3;
                }
                None => i += 1,
            },
            _ => {
                let start = i + 1;
                let len = bytes[start..]
                    .iter()
                    .take_while(|b| b.is_ascii_alphanumeric() || **b == b'_')
                    .count();
                if len > 0 {
                    refs.push(&template[start..start + len]);
                }
                i = start + len;
            }
        }
    }

    refs
}

static PYTHON_BACKREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:[0-9]+|g<[^>]*>)").expect("backreference lint pattern is valid")
});

/// A replacement that looks like it was written for a Python-style engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementLint {
    pub index: usize,
    pub rule: usize,
    pub name: String,
    pub found: String,
}

impl std::fmt::Display for ReplacementLint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "patch {} ('{}'), rule {}: replacement contains '{}', which is inserted literally; use $N or ${{name}}",
            self.index, self.name, self.rule, self.found
        )
    }
}

/// Report replacements containing `\1` / `\g<name>` style back-references.
pub fn lint_replacements(patches: &PatchCollection) -> Vec<ReplacementLint> {
    let mut lints = Vec::new();
    for (index, patch) in patches.iter().enumerate() {
        for (rule, patch_rule) in patch.rules().iter().enumerate() {
            if let Some(found) = PYTHON_BACKREF.find(patch_rule.replacement()) {
                lints.push(ReplacementLint {
                    index,
                    rule,
                    name: patch.name().to_string(),
                    found: found.as_str().to_string(),
                });
            }
        }
    }
    lints
}
