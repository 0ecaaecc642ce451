use errors::{ConfigError, ConfigResult};
use regex::Regex;
use std::sync::OnceLock;

fn dashed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("static pattern")
    })
}

fn plain_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[0-9a-fA-F]{32}").expect("static pattern"))
}

/// Normalize a free-form container reference to a plain lowercase 32-hex id.
///
/// Accepts a raw 32-hex id, a dashed UUID, or a URL containing either (query
/// strings and fragments included). Anything else is a configuration error.
pub fn normalize_container_id(input: &str) -> ConfigResult<String> {
    let trimmed = input.trim();

    if let Some(m) = dashed_re().find(trimmed) {
        return Ok(m.as_str().replace('-', "").to_lowercase());
    }
    if let Some(m) = plain_re().find(trimmed) {
        return Ok(m.as_str().to_lowercase());
    }

    Err(ConfigError::InvalidContainerId {
        input: trimmed.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEX: &str = "89abcdef0123456789abcdef01234567";

    #[test]
    fn test_raw_hex_accepted() {
        assert_eq!(normalize_container_id(HEX).unwrap(), HEX);
        assert_eq!(
            normalize_container_id(&HEX.to_uppercase()).unwrap(),
            HEX
        );
    }

    #[test]
    fn test_dashed_uuid_accepted() {
        let dashed = "89abcdef-0123-4567-89ab-cdef01234567";
        assert_eq!(normalize_container_id(dashed).unwrap(), HEX);
    }

    #[test]
    fn test_url_forms_accepted() {
        let url = format!("https://www.notion.so/acme/Tracker-{HEX}?v=deadbeef");
        assert_eq!(normalize_container_id(&url).unwrap(), HEX);

        let url = "https://www.notion.so/acme/89abcdef-0123-4567-89ab-cdef01234567";
        assert_eq!(normalize_container_id(url).unwrap(), HEX);
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(normalize_container_id("not an id").is_err());
        assert!(normalize_container_id("").is_err());
        assert!(normalize_container_id("1234").is_err());
    }
}
