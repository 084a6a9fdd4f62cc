//! Class-definition filters
//!
//! Filter files are newline-delimited records:
//!
//! ```text
//! # keep cache tests, drop slow ones
//! INCLUDE CLASS_NAME Cache.*
//! EXCLUDE CLASS_NAME .*Slow.*
//! ```
//!
//! A class is kept iff it matches at least one include (or no includes
//! exist) and matches no exclude. Matching is an unanchored regex search.

use std::path::Path;

use regex::Regex;

use crate::error::EngineError;

const INCLUDE_PREFIX: &str = "INCLUDE CLASS_NAME ";
const EXCLUDE_PREFIX: &str = "EXCLUDE CLASS_NAME ";

/// A single class-name filter record.
#[derive(Clone, Debug)]
pub enum FilterDefinition {
    IncludeClassName(Regex),
    ExcludeClassName(Regex),
}

/// Load filter definitions from a file.
pub fn load_filter_file(path: impl AsRef<Path>) -> Result<Vec<FilterDefinition>, EngineError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|error| {
        EngineError::FilterParse(format!("failed to read {}: {error}", path.display()))
    })?;
    parse_filter_definitions(&content)
}

/// Parse filter records. Blank lines and `#` comments are ignored.
pub fn parse_filter_definitions(content: &str) -> Result<Vec<FilterDefinition>, EngineError> {
    let mut filters = Vec::new();

    for (line_number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let filter = if let Some(pattern) = line.strip_prefix(INCLUDE_PREFIX) {
            FilterDefinition::IncludeClassName(compile(pattern, line_number)?)
        } else if let Some(pattern) = line.strip_prefix(EXCLUDE_PREFIX) {
            FilterDefinition::ExcludeClassName(compile(pattern, line_number)?)
        } else {
            return Err(EngineError::FilterParse(format!(
                "unrecognized filter record on line {}: [{line}]",
                line_number + 1
            )));
        };

        filters.push(filter);
    }

    Ok(filters)
}

fn compile(pattern: &str, line_number: usize) -> Result<Regex, EngineError> {
    Regex::new(pattern.trim()).map_err(|error| {
        EngineError::FilterParse(format!(
            "invalid regex on line {}: {error}",
            line_number + 1
        ))
    })
}

/// Evaluate the include/exclude rule for one class name.
pub fn keep_class(filters: &[FilterDefinition], class_name: &str) -> bool {
    let mut has_include = false;
    let mut included = false;

    for filter in filters {
        match filter {
            FilterDefinition::IncludeClassName(pattern) => {
                has_include = true;
                if pattern.is_match(class_name) {
                    included = true;
                }
            }
            FilterDefinition::ExcludeClassName(pattern) => {
                if pattern.is_match(class_name) {
                    return false;
                }
            }
        }
    }

    !has_include || included
}
