//! Request validation
//!
//! Checks run before any business logic. Every failing field is reported,
//! one line each: `Field validation for '<Field>' failed on the '<tag>' tag`.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::DocumentType;
use crate::error::PlatformError;

pub const MIN_PASSWORD_LEN: usize = 6;

static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

fn email_regex() -> &'static Regex {
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .unwrap_or_else(|error| panic!("email regex failed to compile: {error}"))
    })
}

#[derive(Debug, Default)]
pub struct FieldErrors {
    failures: Vec<String>,
}

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, field: &str, tag: &str) {
        self.failures
            .push(format!("Field validation for '{}' failed on the '{}' tag", field, tag));
    }

    pub fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "required");
        } else if !email_regex().is_match(value) {
            self.fail(field, "email");
        }
        self
    }

    pub fn password(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "required");
        } else if value.chars().count() < MIN_PASSWORD_LEN {
            self.fail(field, "min");
        }
        self
    }

    pub fn positive(&mut self, field: &str, value: i64) -> &mut Self {
        if value <= 0 {
            self.fail(field, "gt");
        }
        self
    }

    pub fn uuid(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.fail(field, "required");
        } else if uuid::Uuid::parse_str(value).is_err() {
            self.fail(field, "uuid");
        }
        self
    }

    pub fn required(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.fail(field, "required");
        }
        self
    }

    /// Parse a document type, recording a failure if it is not one of the
    /// enumerated values.
    pub fn document_type(&mut self, field: &str, value: &str) -> Option<DocumentType> {
        if value.is_empty() {
            self.fail(field, "required");
            return None;
        }
        match value.parse() {
            Ok(document_type) => Some(document_type),
            Err(_) => {
                self.fail(field, "oneof");
                None
            }
        }
    }

    pub fn finish(&self) -> Result<(), PlatformError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            let mut message = self.failures.join("\n");
            message.push('\n');
            Err(PlatformError::invalid_argument(message))
        }
    }
}
