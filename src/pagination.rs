use axum::http::{HeaderMap, HeaderValue};

/// Sanitize resource name by removing control characters for HTTP headers
fn sanitize_resource_name(name: &str) -> String {
    name.chars().filter(|c| c.is_ascii() && !c.is_ascii_control()).collect()
}

/// Build the `Content-Range` and `X-Total-Count` headers of a list response.
///
/// # Arguments
///
/// * `offset` - Index of the first returned item.
/// * `limit` - Page size.
/// * `total_count` - Number of items matching the query.
/// * `resource_name` - Unit of the range, usually the plural resource name.
///
/// The resource name is stripped of characters that are not allowed in a
/// header value. When `offset` is at or past the end, the range is `*`.
#[must_use]
pub fn calculate_content_range(
    offset: u64,
    limit: u64,
    total_count: u64,
    resource_name: &str,
) -> HeaderMap {
    let safe_name = sanitize_resource_name(resource_name);
    let safe_name = if safe_name.trim().is_empty() {
        "items".to_string()
    } else {
        safe_name
    };

    let mut headers = HeaderMap::new();
    let content_range = if offset >= total_count {
        format!("{safe_name} */{total_count}")
    } else {
        let last = offset
            .saturating_add(limit.max(1))
            .saturating_sub(1)
            .min(total_count - 1);
        format!("{safe_name} {offset}-{last}/{total_count}")
    };
    if let Ok(value) = HeaderValue::from_str(&content_range) {
        headers.insert("Content-Range", value);
    }
    headers.insert("X-Total-Count", HeaderValue::from(total_count));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_range(headers: &HeaderMap) -> &str {
        headers.get("Content-Range").unwrap().to_str().unwrap()
    }

    #[test]
    fn test_content_range_normal() {
        let headers = calculate_content_range(0, 10, 100, "users");
        assert_eq!(content_range(&headers), "users 0-9/100");
        assert_eq!(headers.get("X-Total-Count").unwrap(), "100");
    }

    #[test]
    fn test_content_range_last_page() {
        let headers = calculate_content_range(90, 20, 95, "users");
        assert_eq!(content_range(&headers), "users 90-94/95");
    }

    #[test]
    fn test_content_range_zero_items() {
        let headers = calculate_content_range(0, 10, 0, "users");
        assert_eq!(content_range(&headers), "users */0");
        assert_eq!(headers.get("X-Total-Count").unwrap(), "0");
    }

    #[test]
    fn test_content_range_offset_past_end() {
        let headers = calculate_content_range(50, 10, 10, "users");
        assert_eq!(content_range(&headers), "users */10");
        assert_eq!(headers.get("X-Total-Count").unwrap(), "10");
        let headers = calculate_content_range(10, 10, 10, "users");
        assert_eq!(content_range(&headers), "users */10");
    }

    #[test]
    fn test_content_range_strips_control_characters() {
        let headers = calculate_content_range(0, 10, 100, "users\r\nInjected: evil");
        let value = content_range(&headers);
        assert!(!value.contains('\r'));
        assert!(!value.contains('\n'));
    }

    #[test]
    fn test_content_range_non_ascii_name() {
        let headers = calculate_content_range(0, 10, 100, "用户");
        assert_eq!(content_range(&headers), "items 0-9/100");
    }

    #[test]
    fn test_content_range_large_numbers() {
        let headers = calculate_content_range(u64::MAX - 100, 10, u64::MAX, "users");
        assert!(content_range(&headers).starts_with("users "));
    }
}
