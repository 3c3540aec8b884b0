//! Locator matching and rule application over decoded text.

use crate::config::PatchCollection;
use crate::validate::{compile_locator, compile_target, validate_for_apply, ValidationError};
use regex::Regex;
use std::borrow::Cow;

struct CompiledRule {
    target: Regex,
    replacement: String,
}

struct CompiledDefinition {
    name: String,
    locator: Regex,
    rules: Vec<CompiledRule>,
}

/// A definition whose locator matched, with the text length before and
/// after its rules ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DefinitionMatch {
    pub definition: usize,
    pub before_len: usize,
    pub after_len: usize,
}

/// A patch collection with every pattern compiled, ready to run.
pub(crate) struct CompiledPatchSet {
    definitions: Vec<CompiledDefinition>,
}

impl CompiledPatchSet {
    pub fn compile(patches: &PatchCollection) -> Result<Self, ValidationError> {
        validate_for_apply(patches)?;

        let mut definitions = Vec::with_capacity(patches.len());
        for (index, patch) in patches.iter().enumerate() {
            let locator = compile_locator(index, patch)?;
            let rules = patch
                .rules()
                .iter()
                .enumerate()
                .map(|(rule, r)| {
                    Ok(CompiledRule {
                        target: compile_target(index, rule, r.target())?,
                        replacement: r.replacement().to_string(),
                    })
                })
                .collect::<Result<Vec<_>, ValidationError>>()?;
            definitions.push(CompiledDefinition {
                name: patch.name().to_string(),
                locator,
                rules,
            });
        }

        Ok(Self { definitions })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.definitions.iter().map(|d| d.name.as_str())
    }

    pub fn name(&self, definition: usize) -> &str {
        self.definitions
            .get(definition)
            .map(|d| d.name.as_str())
            .unwrap_or_default()
    }

    /// Run every definition against `text`, in collection order.
    ///
    /// A definition applies when its locator matches anywhere in the
    /// *current* text, so it sees the output of earlier definitions. Its rules
    /// then run in order, each replacing all matches of its target.
    pub fn rewrite<'t>(
        &self,
        text: &'t str,
        mut on_match: impl FnMut(DefinitionMatch),
    ) -> Cow<'t, str> {
        let mut current = Cow::Borrowed(text);

        for (definition, def) in self.definitions.iter().enumerate() {
            if !def.locator.is_match(&current) {
                continue;
            }

            let before_len = current.len();
            for rule in &def.rules {
                let replaced = match rule.target.replace_all(&current, rule.replacement.as_str()) {
                    Cow::Borrowed(_) => None,
                    Cow::Owned(s) => Some(s),
                };
                if let Some(s) = replaced {
                    current = Cow::Owned(s);
                }
            }

            on_match(DefinitionMatch {
                definition,
                before_len,
                after_len: current.len(),
            });
        }

        current
    }
}
