//! Limits applied while translating a query string.
//!
//! Every limit exists to keep a hostile query string from producing an
//! arbitrarily large or deep condition tree. Resources pick up
//! [`QueryConfig::default`] unless they override
//! [`CRUDResource::query_config`](crate::CRUDResource::query_config).

use serde::{Deserialize, Serialize};

/// Query translation limits.
///
/// Deserializes from any serde format with every field optional, so a host
/// application can keep the limits in its own configuration file:
///
/// ```rust
/// # use mongocrate::QueryConfig;
/// let config: QueryConfig = serde_json::from_str(r#"{"max_limit": 500}"#).unwrap();
/// assert_eq!(config.max_limit, 500);
/// assert_eq!(config.max_depth, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum bracket nesting of one query key (`a[b][c]` has depth 2).
    pub max_depth: usize,
    /// Reject keys deeper than `max_depth` instead of folding the remainder
    /// into a single literal segment.
    pub strict_depth: bool,
    /// Pairs after this count are ignored.
    pub max_parameters: usize,
    /// Highest numeric bracket index treated as a list position.
    pub array_limit: usize,
    /// Maximum nesting of populate paths.
    pub max_populate_depth: usize,
    /// Page size when the request does not ask for one.
    pub default_limit: u64,
    /// Upper clamp for `limit` and `random`.
    pub max_limit: u64,
    /// Longest accepted decoded value.
    pub max_value_length: usize,
    /// Longest accepted `$regex` pattern.
    pub max_regex_length: usize,
    /// Longest accepted field name segment.
    pub max_field_name_length: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            strict_depth: false,
            max_parameters: 1000,
            array_limit: 20,
            max_populate_depth: 3,
            default_limit: 20,
            max_limit: 100,
            max_value_length: 10_000,
            max_regex_length: 256,
            max_field_name_length: 100,
        }
    }
}

impl QueryConfig {
    /// Clamp a requested page size into `[1, max_limit]`.
    #[must_use]
    pub fn clamp_limit(&self, requested: u64) -> u64 {
        requested.clamp(1, self.max_limit.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: QueryConfig =
            serde_json::from_str(r#"{"max_depth": 2, "strict_depth": true}"#).unwrap();
        assert_eq!(config.max_depth, 2);
        assert!(config.strict_depth);
        assert_eq!(config.max_limit, QueryConfig::default().max_limit);
        assert_eq!(config.array_limit, 20);
    }

    #[test]
    fn test_clamp_limit() {
        let config = QueryConfig::default();
        assert_eq!(config.clamp_limit(0), 1);
        assert_eq!(config.clamp_limit(50), 50);
        assert_eq!(config.clamp_limit(10_000), 100);
    }

    #[test]
    fn test_clamp_limit_with_zero_max() {
        let config = QueryConfig {
            max_limit: 0,
            ..QueryConfig::default()
        };
        assert_eq!(config.clamp_limit(10), 1);
    }
}
