use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Per-field validation messages, rendered to clients as
/// `{"field": ["message", ...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{field}: {}", messages.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_messages_per_field() {
        let mut errors = FieldErrors::new();
        errors.add("cooking_time", "Ensure this value is greater than or equal to 1.");
        errors.add("ingredients", "This list may not be empty.");
        errors.add("ingredients", "Duplicate ingredient 3.");

        assert_eq!(errors.messages("ingredients").len(), 2);
        assert!(errors.contains("cooking_time"));
        assert!(!errors.contains("tags"));

        let json = serde_json::to_value(&errors).unwrap();
        assert_eq!(json["ingredients"][1], "Duplicate ingredient 3.");
        assert_eq!(
            errors.to_string(),
            "cooking_time: Ensure this value is greater than or equal to 1.; ingredients: This list may not be empty., Duplicate ingredient 3."
        );
    }

    #[test]
    fn test_into_result() {
        assert!(FieldErrors::new().into_result().is_ok());
        assert!(FieldErrors::single("name", "required").into_result().is_err());
    }
}
