use std::sync::LazyLock;

use parkway_common::{Error, Result};
use regex::Regex;

pub const MAX_NAME_CHARS: usize = 100;
pub const MAX_MAIL_BYTES: usize = 254;

static MAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("mail pattern is valid")
});

/// Validation and sanitization for user-supplied fields.
pub struct InputValidator;

impl InputValidator {
    /// Remove control characters, keeping newlines and tabs.
    pub fn sanitize(input: &str) -> String {
        input
            .chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
            .collect()
    }

    /// Returns the trimmed name.
    pub fn validate_name(name: &str) -> Result<String> {
        let name = Self::sanitize(name).trim().to_string();
        if name.is_empty() {
            return Err(Error::Validation("name cannot be empty".into()));
        }
        if name.chars().count() > MAX_NAME_CHARS {
            return Err(Error::Validation(format!(
                "name longer than {MAX_NAME_CHARS} characters"
            )));
        }
        Ok(name)
    }

    /// Returns the trimmed address.
    pub fn validate_mail(mail: &str) -> Result<String> {
        let mail = mail.trim();
        if mail.is_empty() {
            return Err(Error::Validation("mail cannot be empty".into()));
        }
        if mail.len() > MAX_MAIL_BYTES {
            return Err(Error::Validation("mail too long".into()));
        }
        if !MAIL_RE.is_match(mail) {
            return Err(Error::Validation(format!("invalid mail address: {mail}")));
        }
        Ok(mail.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::InputValidator;

    #[test]
    fn sanitizes_control_chars_but_keeps_newlines_and_tabs() {
        let input = "hello\u{0000}\u{001F}\n\tworld";
        let sanitized = InputValidator::sanitize(input);
        assert_eq!(sanitized, "hello\n\tworld");
    }

    #[test]
    fn name_is_trimmed_and_bounded() {
        assert_eq!(InputValidator::validate_name("  Ada \u{0007}").unwrap(), "Ada");
        assert!(InputValidator::validate_name("   ").is_err());
        assert!(InputValidator::validate_name(&"a".repeat(100)).is_ok());
        assert!(InputValidator::validate_name(&"a".repeat(101)).is_err());
        // Limit counts characters, not bytes.
        assert!(InputValidator::validate_name(&"é".repeat(100)).is_ok());
    }

    #[test]
    fn mail_shape_is_checked() {
        assert_eq!(
            InputValidator::validate_mail(" test@gmail.com ").unwrap(),
            "test@gmail.com"
        );
        assert!(InputValidator::validate_mail("first.last@mail.example.org").is_ok());

        for bad in ["", "plain", "@example.com", "a@b", "a@@b.com", "a b@c.com", "a@b..com"] {
            assert!(
                InputValidator::validate_mail(bad).is_err(),
                "{bad:?} should be rejected"
            );
        }

        let too_long = format!("{}@example.com", "a".repeat(250));
        assert!(InputValidator::validate_mail(&too_long).is_err());
    }
}
