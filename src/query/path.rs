use std::fmt;

use crate::config::QueryConfig;
use crate::errors::QueryError;

/// A validated dotted field path such as `author.address.city`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Split a dotted path and validate every segment.
    ///
    /// Segments may not be empty, start with `$`, contain brackets or NUL, or
    /// exceed `max_field_name_length`. A path may have at most
    /// `max_depth + 1` segments.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidField`] or [`QueryError::TooDeep`].
    pub fn parse(raw: &str, config: &QueryConfig) -> Result<Self, QueryError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(invalid(raw, "empty field name"));
        }

        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        for segment in &segments {
            validate_segment(raw, segment, config)?;
        }

        let path = Self { segments };
        path.check_depth(config)?;
        Ok(path)
    }

    /// Fail when the path has more than `max_depth + 1` segments.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::TooDeep`].
    pub fn check_depth(&self, config: &QueryConfig) -> Result<(), QueryError> {
        if self.segments.len() > config.max_depth + 1 {
            return Err(QueryError::TooDeep {
                key: self.to_string(),
                max_depth: config.max_depth,
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn first(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }

    /// True when `prefix` names this path or one of its ancestors.
    #[must_use]
    pub fn starts_with(&self, prefix: &FieldPath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// The part of this path below `prefix`, or `None` when `prefix` is not a
    /// strict ancestor.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &FieldPath) -> Option<FieldPath> {
        if self.segments.len() > prefix.segments.len() && self.starts_with(prefix) {
            Some(Self {
                segments: self.segments[prefix.segments.len()..].to_vec(),
            })
        } else {
            None
        }
    }

    #[must_use]
    pub fn join(&self, child: &FieldPath) -> FieldPath {
        let mut segments = self.segments.clone();
        segments.extend(child.segments.iter().cloned());
        Self { segments }
    }

    /// The path without its last segment.
    #[must_use]
    pub fn parent(&self) -> Option<FieldPath> {
        (self.segments.len() > 1).then(|| Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }
}

fn invalid(field: &str, reason: &'static str) -> QueryError {
    QueryError::InvalidField {
        field: field.to_string(),
        reason,
    }
}

fn validate_segment(raw: &str, segment: &str, config: &QueryConfig) -> Result<(), QueryError> {
    if segment.is_empty() {
        return Err(invalid(raw, "empty path segment"));
    }
    if segment.starts_with('$') {
        return Err(invalid(raw, "segments may not start with '$'"));
    }
    if segment.contains(['[', ']', '\0']) {
        return Err(invalid(raw, "segments may not contain brackets or NUL"));
    }
    if segment.chars().count() > config.max_field_name_length {
        return Err(invalid(raw, "field name too long"));
    }
    Ok(())
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}
