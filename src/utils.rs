/// Shortens a secret for log output, keeping only a short prefix.
pub fn redact(secret: &str) -> String {
    let len = secret.chars().count();
    if len == 0 {
        return "<empty>".to_string();
    }
    if len <= 8 {
        return format!("<{} chars>", len);
    }
    let head: String = secret.chars().take(4).collect();
    format!("{}...<{} chars>", head, len)
}

/// Turns a playlist name into a single safe path component.
pub fn sanitize_component(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim().to_string();
    if cleaned.is_empty() {
        "playlist".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_hides_token_body() {
        let token = "BQD7xAbCdEfGhIjKlMnOpQrStUvWxYz==";
        let shown = redact(token);
        assert!(shown.starts_with("BQD7"));
        assert!(!shown.contains("AbCdEf"));
        assert!(shown.contains(&token.len().to_string()));
    }

    #[test]
    fn test_redact_short_and_empty() {
        assert_eq!(redact(""), "<empty>");
        assert_eq!(redact("abc"), "<3 chars>");
    }

    #[test]
    fn test_sanitize_component() {
        assert_eq!(sanitize_component("Release Radar"), "Release Radar");
        assert_eq!(sanitize_component("AC/DC: Best?"), "AC_DC_ Best_");
        assert_eq!(sanitize_component(".."), "playlist");
        assert_eq!(sanitize_component("   "), "playlist");
    }
}
