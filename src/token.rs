use std::fmt;

use crate::utils::redact;

/// An OAuth bearer token issued by the developer console.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Trims surrounding whitespace; blank input yields `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Keeps the value exactly as read; blank input yields `None`.
    pub fn verbatim(raw: String) -> Option<Self> {
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({})", redact(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims_and_rejects_blank() {
        assert_eq!(Token::parse("  abc\n").unwrap().as_str(), "abc");
        assert!(Token::parse(" \n\t").is_none());
    }

    #[test]
    fn test_debug_is_redacted() {
        let token = Token::parse("BQD7xAbCdEfGhIjKlMnOp==").unwrap();
        assert!(!format!("{:?}", token).contains("AbCdEf"));
    }
}
