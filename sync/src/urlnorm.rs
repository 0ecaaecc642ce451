use url::Url;

/// Query parameters that identify tracking noise rather than the posting.
fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || key == "trk"
}

/// Canonicalize a URL for equality comparison: drop the fragment, drop
/// tracking query parameters, strip trailing slashes from the path, and
/// lower-case the result. Returns None for empty or unparsable input, so
/// two records without URLs never match on this key.
pub fn canonical_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let mut parsed = Url::parse(trimmed).ok()?;
    parsed.set_fragment(None);

    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        let query: String = kept
            .iter()
            .map(|(k, v)| {
                if v.is_empty() {
                    k.clone()
                } else {
                    format!("{k}={v}")
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        parsed.set_query(Some(&query));
    }

    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);

    Some(parsed.to_string().to_lowercase())
}
