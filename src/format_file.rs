//! Reading and writing `.clang-format` files.
//!
//! Import understands the subset of YAML that [`CandidateConfiguration::render`]
//! produces, which is also what hand-written configurations usually look like:
//!
//! ```text
//! # comment
//! ---
//! Language: Cpp
//! BasedOnStyle: Google          (absent: Custom)
//! ColumnLimit: 100              scalar
//! BraceWrapping:                nested flags
//!   AfterClass: true
//! IncludeCategories:            nested text, kept verbatim
//!   - Regex: '.*'
//!     Priority: 1
//! ...
//! ```

use crate::catalog::{Catalog, FormatStyle};
use crate::formatter::CandidateConfiguration;
use crate::options::{FormatOption, OptionValue};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImportError {
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
}

fn malformed(line: usize, message: impl Into<String>) -> ImportError {
    ImportError::Malformed {
        line,
        message: message.into(),
    }
}

/// A parsed configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedConfiguration {
    pub style: FormatStyle,
    /// The style's full working set; keys present in the file are enabled.
    pub options: Vec<FormatOption>,
}

impl ImportedConfiguration {
    pub fn candidate(&self, catalog: &Catalog) -> CandidateConfiguration {
        CandidateConfiguration::from_working_set(self.style, &self.options, catalog)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Import
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Entry {
    line: usize,
    key: String,
    value: String,
    nested: Vec<(usize, String)>,
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['\'', '"'] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Drop a trailing `# comment`. A `#` inside quotes or glued to a word is
/// part of the value.
fn strip_comment(value: &str) -> &str {
    let mut quote = None;
    let mut previous = ' ';
    for (at, c) in value.char_indices() {
        match quote {
            Some(open) if c == open => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '#' && previous.is_whitespace() => return value[..at].trim_end(),
            None => {}
        }
        previous = c;
    }
    value
}

fn split_key(line: usize, text: &str) -> Result<(String, String), ImportError> {
    let (key, value) = text
        .split_once(':')
        .ok_or_else(|| malformed(line, format!("expected `key: value`, found `{}`", text.trim())))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(malformed(line, "missing key"));
    }
    Ok((key.to_string(), strip_comment(value.trim()).to_string()))
}

fn parse_bool(line: usize, key: &str, value: &str) -> Result<bool, ImportError> {
    match unquote(value) {
        v if v.eq_ignore_ascii_case("true") => Ok(true),
        v if v.eq_ignore_ascii_case("false") => Ok(false),
        "" => Err(malformed(line, format!("`{}` is missing a value", key))),
        v => Err(malformed(line, format!("`{}` expects true or false, found `{}`", key, v))),
    }
}

/// Split the file into top-level entries with their indented lines.
fn entries(text: &str) -> Result<Vec<Entry>, ImportError> {
    let mut entries: Vec<Entry> = Vec::new();
    let mut open = false;

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if trimmed == "---" || trimmed == "..." {
            open = false;
            continue;
        }

        if raw.starts_with([' ', '\t']) {
            match entries.last_mut() {
                Some(entry) if open => entry.nested.push((line, raw.trim_end().to_string())),
                _ => return Err(malformed(line, "unexpected indented line")),
            }
            continue;
        }

        let (key, value) = split_key(line, raw)?;
        if entries.iter().any(|entry| entry.key == key) {
            return Err(malformed(line, format!("duplicate key `{}`", key)));
        }
        open = value.is_empty();
        entries.push(Entry {
            line,
            key,
            value,
            nested: Vec::new(),
        });
    }
    Ok(entries)
}

fn apply(option: &mut FormatOption, entry: Entry) -> Result<(), ImportError> {
    let Entry {
        line,
        key,
        value,
        nested,
    } = entry;

    match &mut option.value {
        OptionValue::Toggle(current) => {
            if let Some((nested_line, _)) = nested.first() {
                return Err(malformed(*nested_line, format!("`{}` takes a single value", key)));
            }
            *current = parse_bool(line, &key, &value)?;
        }
        OptionValue::Input(current) => {
            if let Some((nested_line, _)) = nested.first() {
                return Err(malformed(*nested_line, format!("`{}` takes a single value", key)));
            }
            if value.is_empty() {
                return Err(malformed(line, format!("`{}` is missing a value", key)));
            }
            *current = unquote(&value).to_string();
        }
        OptionValue::MultipleToggle(flags) => {
            if !value.is_empty() {
                return Err(malformed(line, format!("`{}` expects nested flags", key)));
            }
            for (nested_line, text) in nested {
                let (name, value) = split_key(nested_line, &text)?;
                let flag = flags
                    .iter_mut()
                    .find(|flag| flag.name == name)
                    .ok_or_else(|| malformed(nested_line, format!("unknown `{}` flag `{}`", key, name)))?;
                flag.value = parse_bool(nested_line, &name, &value)?;
            }
        }
        OptionValue::MultipleInput(current) => {
            *current = if nested.is_empty() {
                value
            } else {
                nested
                    .into_iter()
                    .map(|(_, text)| text)
                    .collect::<Vec<_>>()
                    .join("\n")
            };
        }
    }

    option.enabled = true;
    Ok(())
}

/// Parse a configuration file against the catalog.
pub fn import(text: &str, catalog: &Catalog) -> Result<ImportedConfiguration, ImportError> {
    let entries = entries(text)?;

    let mut style = FormatStyle::Custom;
    let mut rest = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry.key.as_str() {
            "Language" => {
                let language = unquote(&entry.value);
                if language != "Cpp" {
                    return Err(malformed(
                        entry.line,
                        format!("unsupported language `{}`", language),
                    ));
                }
            }
            "BasedOnStyle" => {
                let name = unquote(&entry.value);
                style = FormatStyle::from_based_on(name)
                    .ok_or_else(|| malformed(entry.line, format!("unknown style `{}`", name)))?;
            }
            _ => rest.push(entry),
        }
    }

    let mut options = catalog.working_set(style);
    for entry in rest {
        let option = options
            .iter_mut()
            .find(|option| option.name == entry.key)
            .ok_or_else(|| malformed(entry.line, format!("unknown option `{}`", entry.key)))?;
        apply(option, entry)?;
    }

    Ok(ImportedConfiguration { style, options })
}

// ─────────────────────────────────────────────────────────────────────────────
// Export
// ─────────────────────────────────────────────────────────────────────────────

pub fn export(path: &Path, candidate: &CandidateConfiguration) -> io::Result<()> {
    fs::write(path, candidate.render())
}
