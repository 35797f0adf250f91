//! Encoding helpers for credentials and cookies.

use base64::engine::{general_purpose::STANDARD, Engine};

/// Build the `Authorization` header value for HTTP Basic auth.
pub fn encode_basic_auth(login: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", login, password)))
}

/// Find `name` in a raw cookie string and return its decoded value.
///
/// Pairs are separated by `;` and may carry leading spaces. Pairs without an
/// `=` or whose value does not decode to UTF-8 are skipped.
pub fn read_cookie_token(cookie_header: &str, name: &str) -> Option<String> {
    for pair in cookie_header.split(';') {
        let pair = pair.trim_start_matches(' ');
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key != name {
            continue;
        }
        match urlencoding::decode(value) {
            Ok(decoded) if !decoded.is_empty() => return Some(decoded.into_owned()),
            _ => continue,
        }
    }
    None
}

/// Format a single `name=value` cookie pair with the value URL-encoded.
pub fn write_cookie(name: &str, value: &str) -> String {
    format!("{}={}", name, urlencoding::encode(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_basic_auth() {
        // echo -n 'alice:secret' | base64
        assert_eq!(encode_basic_auth("alice", "secret"), "Basic YWxpY2U6c2VjcmV0");
        assert_eq!(encode_basic_auth("", ""), "Basic Og==");
    }

    #[test]
    fn test_encode_basic_auth_utf8() {
        let header = encode_basic_auth("zoë", "pässword:with:colons");
        let encoded = header.strip_prefix("Basic ").expect("missing scheme");
        let decoded = STANDARD.decode(encoded).expect("invalid base64");
        assert_eq!(String::from_utf8(decoded).unwrap(), "zoë:pässword:with:colons");
    }

    #[test]
    fn test_read_cookie_token_basic() {
        let header = "theme=dark; girderToken=abc123; lang=en";
        assert_eq!(read_cookie_token(header, "girderToken").as_deref(), Some("abc123"));
        assert_eq!(read_cookie_token(header, "theme").as_deref(), Some("dark"));
        assert_eq!(read_cookie_token(header, "missing"), None);
    }

    #[test]
    fn test_read_cookie_token_leading_spaces_and_no_spaces() {
        assert_eq!(
            read_cookie_token("a=1;   girderToken=xyz", "girderToken").as_deref(),
            Some("xyz")
        );
        assert_eq!(read_cookie_token("a=1;girderToken=xyz", "girderToken").as_deref(), Some("xyz"));
    }

    #[test]
    fn test_read_cookie_token_skips_malformed_pairs() {
        let header = "garbage; =novalue; girderToken=%FF; other; girderToken=good";
        assert_eq!(read_cookie_token(header, "girderToken").as_deref(), Some("good"));
        assert_eq!(read_cookie_token("", "girderToken"), None);
        assert_eq!(read_cookie_token(";;;", "girderToken"), None);
    }

    #[test]
    fn test_read_cookie_token_prefix_name_does_not_match() {
        // "girderTokenOld" must not be mistaken for "girderToken"
        let header = "girderTokenOld=stale; girderToken=fresh";
        assert_eq!(read_cookie_token(header, "girderToken").as_deref(), Some("fresh"));
    }

    #[test]
    fn test_read_cookie_token_empty_value_is_absent() {
        assert_eq!(read_cookie_token("girderToken=", "girderToken"), None);
    }

    #[test]
    fn test_cookie_round_trip() {
        for token in ["abc123", "with space", "semi;colon", "eq=uals", "ünïcode", "%41"] {
            let cookie = write_cookie("girderToken", token);
            assert_eq!(read_cookie_token(&cookie, "girderToken").as_deref(), Some(token));
        }
    }
}
