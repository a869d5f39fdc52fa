use super::qs::QueryValue;
use crate::config::QueryConfig;
use crate::errors::QueryError;

/// Resolved `skip` / `limit` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

fn number(params: &QueryValue, name: &'static str) -> Result<Option<u64>, QueryError> {
    let Some(value) = params.get(name) else {
        return Ok(None);
    };
    let raw = value
        .as_scalar()
        .ok_or_else(|| QueryError::invalid_parameter(name, "expected a single number"))?
        .trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<u64>()
        .map(Some)
        .map_err(|_| QueryError::invalid_value(name, "a non-negative integer", raw))
}

/// Read `limit`, `offset` and `page` (1-based).
///
/// `offset` wins over `page`. The limit falls back to
/// [`QueryConfig::default_limit`] and is clamped to `[1, max_limit]`.
///
/// # Errors
///
/// Returns an error when a value is not a non-negative integer or `page` is 0.
pub fn parse_pagination(params: &QueryValue, config: &QueryConfig) -> Result<Pagination, QueryError> {
    let limit = config.clamp_limit(number(params, "limit")?.unwrap_or(config.default_limit));

    let offset = match (number(params, "offset")?, number(params, "page")?) {
        (Some(offset), _) => offset,
        (None, Some(0)) => {
            return Err(QueryError::invalid_parameter("page", "pages start at 1"));
        }
        (None, Some(page)) => (page - 1).saturating_mul(limit),
        (None, None) => 0,
    };

    Ok(Pagination { offset, limit })
}
