//! Small helpers shared by the core and its hosts.

/// Trimmed text, or `None` when nothing but whitespace was given.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Canonical form of an http(s) base URL: trimmed, no trailing slash.
///
/// `None` for any other scheme or for a URL with nothing after the scheme.
pub fn http_base_url(raw: &str) -> Option<String> {
    let url = raw.trim().trim_end_matches('/');
    let host = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    (!host.is_empty()).then(|| url.to_string())
}

/// Milliseconds since the Unix epoch; every stored timestamp uses this unit.
pub fn unix_millis_now() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
