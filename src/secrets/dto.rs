use serde::Deserialize;

use crate::error::AppError;

pub const MAX_SECRET_LEN: usize = 1000;

#[derive(Debug, Deserialize)]
pub struct SecretForm {
    #[serde(default)]
    pub secret: String,
}

impl SecretForm {
    /// Trimmed secret text. Blank submissions are rejected so an empty string
    /// never shows up on the board.
    pub fn text(&self) -> Result<&str, AppError> {
        let text = self.secret.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("Your secret can't be empty.".into()));
        }
        if text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        {
            return Err(AppError::InvalidInput(
                "Your secret contains characters that can't be stored.".into(),
            ));
        }
        if text.chars().count() > MAX_SECRET_LEN {
            return Err(AppError::InvalidInput(format!(
                "Secrets are limited to {MAX_SECRET_LEN} characters."
            )));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(s: &str) -> SecretForm {
        SecretForm { secret: s.to_string() }
    }

    #[test]
    fn trims_and_accepts_text() {
        assert_eq!(form("  I sing in the shower \n").text().unwrap(), "I sing in the shower");
    }

    #[test]
    fn blank_is_rejected() {
        assert!(matches!(form("").text(), Err(AppError::InvalidInput(_))));
        assert!(matches!(form("   \t").text(), Err(AppError::InvalidInput(_))));
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(matches!(form("a\0b").text(), Err(AppError::InvalidInput(_))));
        assert!(matches!(form("bell\u{7}").text(), Err(AppError::InvalidInput(_))));
        assert_eq!(form("line one\r\nline two").text().unwrap(), "line one\r\nline two");
    }

    #[test]
    fn overlong_is_rejected() {
        let long = "x".repeat(MAX_SECRET_LEN + 1);
        assert!(matches!(form(&long).text(), Err(AppError::InvalidInput(_))));
        assert!(form(&"x".repeat(MAX_SECRET_LEN)).text().is_ok());
    }
}
