//! Typed representation of a single configurable clang-format option.
//!
//! Every option is one of four variants:
//!
//! | Variant         | Value                         | Example                       |
//! |-----------------|-------------------------------|-------------------------------|
//! | `Toggle`        | boolean                       | `BinPackArguments: true`      |
//! | `Input`         | free-form scalar              | `ColumnLimit: 100`            |
//! | `MultipleToggle`| ordered named boolean flags   | `BraceWrapping:` + sub-flags  |
//! | `MultipleInput` | free-form multi-line text     | `IncludeCategories:` + list   |
//!
//! All variant-specific behaviour (copy, change detection, candidate
//! enumeration, rendering) matches on [`OptionValue`] so a new variant
//! cannot be forgotten at any consumption site.

use serde::Serialize;
use thiserror::Error;

/// Errors raised when two options are combined incorrectly.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OptionError {
    /// Values can only move between options of the same shape.
    #[error("cannot copy {from_kind} option `{from_name}` into {to_kind} option `{to_name}`")]
    VariantMismatch {
        to_name: String,
        to_kind: &'static str,
        from_name: String,
        from_kind: &'static str,
    },
}

/// A value measured from the samples that can seed a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Width in characters of the widest sample line.
    WidestLine,
}

/// Measurements taken once per detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observations {
    pub widest_line: usize,
}

impl Observations {
    pub fn from_samples<S: AsRef<str>>(samples: &[S]) -> Self {
        let widest_line = samples
            .iter()
            .flat_map(|sample| sample.as_ref().lines())
            .map(|line| line.chars().count())
            .max()
            .unwrap_or(0);

        Self { widest_line }
    }

    fn value_of(&self, observation: Observation) -> Option<String> {
        match observation {
            Observation::WidestLine => {
                (self.widest_line > 0).then(|| self.widest_line.to_string())
            }
        }
    }
}

/// Where the detector looks for candidate values of an `Input` option.
///
/// An input with no probes and no observation is never searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchSpace {
    pub probes: &'static [&'static str],
    pub observe: Option<Observation>,
}

/// One named flag of a `MultipleToggle` option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleFlag {
    pub name: String,
    pub value: bool,
}

impl ToggleFlag {
    pub fn new(name: impl Into<String>, value: bool) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// The variant-specific value of an option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum OptionValue {
    Toggle(bool),
    Input(String),
    MultipleToggle(Vec<ToggleFlag>),
    MultipleInput(String),
}

impl OptionValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Toggle(_) => "toggle",
            Self::Input(_) => "input",
            Self::MultipleToggle(_) => "multiple-toggle",
            Self::MultipleInput(_) => "multiple-input",
        }
    }

    /// Short single-line rendering for listings and progress output.
    pub fn summary(&self) -> String {
        match self {
            Self::Toggle(value) => value.to_string(),
            Self::Input(value) => value.clone(),
            Self::MultipleToggle(flags) => flags
                .iter()
                .map(|flag| format!("{}={}", flag.name, flag.value))
                .collect::<Vec<_>>()
                .join(", "),
            Self::MultipleInput(text) => match text.lines().count() {
                0 => String::new(),
                1 => text.trim().to_string(),
                n => format!("<{} lines>", n),
            },
        }
    }
}

/// A configurable formatting option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatOption {
    pub name: String,
    pub enabled: bool,
    pub value: OptionValue,
    #[serde(skip)]
    pub search: SearchSpace,
}

impl FormatOption {
    pub fn new(name: impl Into<String>, value: OptionValue) -> Self {
        Self {
            name: name.into(),
            enabled: false,
            value,
            search: SearchSpace::default(),
        }
    }

    pub fn with_search(mut self, search: SearchSpace) -> Self {
        self.search = search;
        self
    }

    fn mismatch(&self, other: &FormatOption) -> OptionError {
        OptionError::VariantMismatch {
            to_name: self.name.clone(),
            to_kind: self.value.kind(),
            from_name: other.name.clone(),
            from_kind: other.value.kind(),
        }
    }

    /// Copy the value (not the name or enabled flag) of `other` into `self`.
    ///
    /// Multi-toggles must carry the same flags in the same order.
    pub fn copy_value_from(&mut self, other: &FormatOption) -> Result<(), OptionError> {
        let error = self.mismatch(other);
        match (&mut self.value, &other.value) {
            (OptionValue::Toggle(to), OptionValue::Toggle(from)) => *to = *from,
            (OptionValue::Input(to), OptionValue::Input(from))
            | (OptionValue::MultipleInput(to), OptionValue::MultipleInput(from)) => {
                to.clone_from(from);
            }
            (OptionValue::MultipleToggle(to), OptionValue::MultipleToggle(from)) => {
                let same_flags = to.len() == from.len()
                    && to.iter().zip(from).all(|(t, f)| t.name == f.name);
                if !same_flags {
                    return Err(error);
                }
                for (t, f) in to.iter_mut().zip(from) {
                    t.value = f.value;
                }
            }
            _ => return Err(error),
        }
        Ok(())
    }

    /// Whether this option's value differs from `default`.
    ///
    /// Empty inputs count as unset and never differ.
    pub fn differs_from(&self, default: &FormatOption) -> bool {
        match (&self.value, &default.value) {
            (OptionValue::Toggle(value), OptionValue::Toggle(default)) => value != default,
            (OptionValue::Input(value), OptionValue::Input(default))
            | (OptionValue::MultipleInput(value), OptionValue::MultipleInput(default)) => {
                !value.is_empty() && value != default
            }
            (OptionValue::MultipleToggle(flags), OptionValue::MultipleToggle(defaults)) => flags
                .iter()
                .zip(defaults)
                .any(|(flag, default)| flag.value != default.value),
            _ => true,
        }
    }

    /// The part of this option that differs from `default`, if any.
    ///
    /// Unchanged sub-flags of a multi-toggle are dropped.
    pub fn changed_against(&self, default: &FormatOption) -> Option<FormatOption> {
        if !self.differs_from(default) {
            return None;
        }

        let value = match (&self.value, &default.value) {
            (OptionValue::MultipleToggle(flags), OptionValue::MultipleToggle(defaults)) => {
                OptionValue::MultipleToggle(
                    flags
                        .iter()
                        .zip(defaults)
                        .filter(|(flag, default)| flag.value != default.value)
                        .map(|(flag, _)| flag.clone())
                        .collect(),
                )
            }
            (value, _) => value.clone(),
        };

        Some(FormatOption {
            name: self.name.clone(),
            enabled: self.enabled,
            value,
            search: self.search,
        })
    }

    /// Number of independent greedy decisions the detector makes for this
    /// option: one per sub-flag for multi-toggles, none for free text.
    pub fn decision_count(&self) -> usize {
        match &self.value {
            OptionValue::Toggle(_) => 1,
            OptionValue::Input(_) => {
                usize::from(!self.search.probes.is_empty() || self.search.observe.is_some())
            }
            OptionValue::MultipleToggle(flags) => flags.len(),
            OptionValue::MultipleInput(_) => 0,
        }
    }

    /// Candidate values for one decision, relative to the current value.
    ///
    /// The current value itself is never a candidate. Inputs list the
    /// observed value first, then the static probes in declaration order.
    pub fn candidates(&self, decision: usize, observations: &Observations) -> Vec<OptionValue> {
        match &self.value {
            OptionValue::Toggle(value) => vec![OptionValue::Toggle(!value)],
            OptionValue::Input(current) => {
                let observed = self
                    .search
                    .observe
                    .and_then(|observation| observations.value_of(observation));
                let mut values: Vec<String> = Vec::new();
                for value in observed
                    .into_iter()
                    .chain(self.search.probes.iter().map(|p| p.to_string()))
                {
                    if value != *current && !values.contains(&value) {
                        values.push(value);
                    }
                }
                values.into_iter().map(OptionValue::Input).collect()
            }
            OptionValue::MultipleToggle(flags) => match flags.get(decision) {
                Some(flag) => {
                    let mut flipped = flags.clone();
                    flipped[decision].value = !flag.value;
                    vec![OptionValue::MultipleToggle(flipped)]
                }
                None => Vec::new(),
            },
            OptionValue::MultipleInput(_) => Vec::new(),
        }
    }
}
