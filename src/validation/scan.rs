use crate::error::{AppError, Result};

/// Query parameters a wrapping URL may carry the credential in, by priority.
const CREDENTIAL_QUERY_KEYS: [&str; 2] = ["qr", "code"];

/// The shortest accepted device fingerprint.
pub const MIN_FINGERPRINT_LEN: usize = 8;
/// The longest accepted device fingerprint.
pub const MAX_FINGERPRINT_LEN: usize = 128;

/// Reduces scanner output to the bare credential text.
///
/// Strips bidirectional control marks and surrounding whitespace,
/// percent-decodes, and unwraps `http(s)` URLs (`qr` / `code` query
/// parameter, else the last path segment). Total: anything it cannot make
/// sense of is passed through for the parser to reject.
pub fn normalize_scanned_text(raw: &str) -> String {
    let stripped: String = raw.chars().filter(|c| !is_bidi_mark(*c)).collect();
    let trimmed = stripped.trim();

    let decoded = percent_decode(trimmed).unwrap_or_else(|| trimmed.to_string());

    match extract_from_url(&decoded) {
        Some(inner) => inner,
        None => decoded,
    }
}

/// Validates a client-supplied device fingerprint.
pub fn validate_fingerprint(fingerprint: &str) -> Result<()> {
    if fingerprint.len() < MIN_FINGERPRINT_LEN {
        return Err(AppError::Validation(format!(
            "Device fingerprint must be at least {} characters long",
            MIN_FINGERPRINT_LEN
        )));
    }

    if fingerprint.len() > MAX_FINGERPRINT_LEN {
        return Err(AppError::Validation(format!(
            "Device fingerprint must be at most {} characters",
            MAX_FINGERPRINT_LEN
        )));
    }

    if !fingerprint
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=' | '-' | '_'))
    {
        return Err(AppError::Validation(
            "Device fingerprint contains unsupported characters".to_string(),
        ));
    }

    Ok(())
}

fn is_bidi_mark(c: char) -> bool {
    matches!(
        c,
        '\u{200E}' | '\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2066}'..='\u{2069}' | '\u{FEFF}'
    )
}

/// Decodes `%XX` escapes. Malformed escapes stay literal; returns `None` when
/// there is nothing to decode or the result is not UTF-8.
fn percent_decode(text: &str) -> Option<String> {
    if !text.contains('%') {
        return None;
    }

    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8(out).ok()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

fn extract_from_url(text: &str) -> Option<String> {
    let lower = text.get(..8).unwrap_or(text).to_ascii_lowercase();
    let rest = if lower.starts_with("https://") {
        &text[8..]
    } else if lower.starts_with("http://") {
        &text[7..]
    } else {
        return None;
    };

    let rest = rest.split('#').next().unwrap_or(rest);
    let (location, query) = match rest.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (rest, None),
    };

    if let Some(query) = query {
        let pairs: Vec<(&str, &str)> = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .collect();
        for key in CREDENTIAL_QUERY_KEYS {
            if let Some((_, value)) = pairs.iter().find(|(k, v)| *k == key && !v.trim().is_empty()) {
                return Some(value.trim().to_string());
            }
        }
    }

    let path = location.split_once('/').map(|(_, path)| path)?;
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .last()
        .map(|segment| segment.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIAL: &str = "6f1c2a1e-6d3b-4f7a-9a51-0c8e7b7d2f10|42|q3K9xZ_-aB12cD34:0a1b2c";

    #[test]
    fn test_bare_credential_passes_through() {
        assert_eq!(normalize_scanned_text(CREDENTIAL), CREDENTIAL);
    }

    #[test]
    fn test_strips_bidi_marks_and_whitespace() {
        let wrapped = format!("  \u{200F}{}\u{202C}\u{200E}\n", CREDENTIAL);
        assert_eq!(normalize_scanned_text(&wrapped), CREDENTIAL);
    }

    #[test]
    fn test_percent_decodes() {
        let encoded = CREDENTIAL.replace('|', "%7C").replace(':', "%3A");
        assert_eq!(normalize_scanned_text(&encoded), CREDENTIAL);
    }

    #[test]
    fn test_extracts_query_parameter() {
        let url = format!(
            "https://attend.example.edu/scan?lang=ar&qr={}",
            CREDENTIAL.replace('|', "%7C").replace(':', "%3A")
        );
        assert_eq!(normalize_scanned_text(&url), CREDENTIAL);

        let url = format!("HTTP://attend.example.edu/?code={}", CREDENTIAL);
        assert_eq!(normalize_scanned_text(&url), CREDENTIAL);
    }

    #[test]
    fn test_extracts_last_path_segment() {
        let url = format!("https://attend.example.edu/s/{}/", CREDENTIAL);
        assert_eq!(normalize_scanned_text(&url), CREDENTIAL);
    }

    #[test]
    fn test_never_fails_on_garbage() {
        for raw in ["", "%", "%zz%4", "https://", "http://host", "%C3%28", "\u{202E}"] {
            let _ = normalize_scanned_text(raw);
        }
        assert_eq!(normalize_scanned_text("%zz"), "%zz");
        assert_eq!(normalize_scanned_text("%C3%28"), "%C3%28");
        assert_eq!(normalize_scanned_text("http://host"), "http://host");
    }

    #[test]
    fn test_validate_fingerprint() {
        assert!(validate_fingerprint("TW96aWxsYS81LjAgKFgxMTsg").is_ok());
        assert!(validate_fingerprint("short").is_err());
        assert!(validate_fingerprint(&"a".repeat(MAX_FINGERPRINT_LEN + 1)).is_err());
        assert!(validate_fingerprint("has spaces in it").is_err());
    }
}
