//! Input checks shared by the HTTP handlers and the sync job.
//! Every failure is an `AppError::Validation`, which renders as 400.

use crate::error::{AppError, Result};
use crate::types::RESULT_DELIMITER;

pub const MAX_RESULT_LEN: usize = 20;
pub const MAX_MARKET_NAME_LEN: usize = 100;
pub const MIN_PASSWORD_LEN: usize = 8;

fn invalid(msg: &str) -> AppError {
    AppError::Validation(msg.to_string())
}

/// Digits and delimiters only, non-empty, at most [`MAX_RESULT_LEN`] chars.
/// Partial results such as `"123"` or `"123-4"` are accepted.
pub fn result_value(raw: &str) -> Result<&str> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(invalid("Result cannot be empty"));
    }
    if value.chars().count() > MAX_RESULT_LEN {
        return Err(invalid("Result is too long"));
    }
    if !value.chars().all(|c| c.is_ascii_digit() || c == RESULT_DELIMITER) {
        return Err(invalid("Result may only contain digits and '-'"));
    }
    Ok(value)
}

pub fn username(raw: &str) -> Result<&str> {
    let value = raw.trim();
    let len = value.chars().count();
    if !(3..=50).contains(&len) {
        return Err(invalid("Username must be 3-50 characters"));
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("Username may only contain letters, digits and '_'"));
    }
    Ok(value)
}

pub fn mobile(raw: &str) -> Result<&str> {
    let value = raw.trim();
    if value.len() != 10 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid("Mobile number must be 10 digits"));
    }
    Ok(value)
}

/// `local@domain.tld` shape only; deliverability is not checked.
pub fn email(raw: &str) -> Result<&str> {
    let value = raw.trim();
    let ok = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && !value.contains(char::is_whitespace)
                && domain
                    .rsplit_once('.')
                    .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2)
        }
        None => false,
    };
    if !ok {
        return Err(invalid("Invalid email address"));
    }
    Ok(value)
}

pub fn password(raw: &str) -> Result<&str> {
    if raw.chars().count() < MIN_PASSWORD_LEN {
        return Err(invalid("Password must be at least 8 characters"));
    }
    if !raw.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(invalid("Password must contain an uppercase letter"));
    }
    if !raw.chars().any(|c| c.is_ascii_digit()) {
        return Err(invalid("Password must contain a digit"));
    }
    Ok(raw)
}

pub fn market_name(raw: &str) -> Result<&str> {
    let value = raw.trim();
    let len = value.chars().count();
    if len == 0 || len > MAX_MARKET_NAME_LEN {
        return Err(invalid("Market name must be 1-100 characters"));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_format() {
        assert_eq!(result_value(" 123-45-678 ").unwrap(), "123-45-678");
        assert!(result_value("123").is_ok());
        assert!(result_value("").is_err());
        assert!(result_value("12a-45-678").is_err());
        assert!(result_value(&"1".repeat(21)).is_err());
    }

    #[test]
    fn username_rules() {
        assert!(username("user_1").is_ok());
        assert!(username("ab").is_err());
        assert!(username("has space").is_err());
        assert!(username(&"a".repeat(51)).is_err());
    }

    #[test]
    fn mobile_and_email() {
        assert!(mobile("9876543210").is_ok());
        assert!(mobile("98765").is_err());
        assert!(mobile("98765abcde").is_err());

        assert!(email("a@b.co").is_ok());
        assert!(email("a@b").is_err());
        assert!(email("@b.co").is_err());
        assert!(email("a@@b.co").is_err());
        assert!(email("a b@c.co").is_err());
    }

    #[test]
    fn password_strength() {
        assert!(password("Secret123").is_ok());
        assert!(password("Sh0rt").is_err());
        assert!(password("lowercase1").is_err());
        assert!(password("NoDigitsHere").is_err());
    }

    #[test]
    fn market_name_bounds() {
        assert_eq!(market_name("  Kalyan ").unwrap(), "Kalyan");
        assert!(market_name("   ").is_err());
        assert!(market_name(&"x".repeat(101)).is_err());
    }
}
