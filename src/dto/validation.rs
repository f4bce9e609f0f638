//! Validation helpers for DTOs.

use validator::ValidationError;

/// Rejects strings that are empty once surrounding whitespace is removed.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates an explicit question list: at least one id, none blank, no duplicates.
///
/// # Examples
///
/// ```ignore
/// validate_question_ids(&["q1".into(), "q2".into()]) // Ok
/// validate_question_ids(&[])                        // Err - empty
/// validate_question_ids(&["q1".into(), "q1".into()]) // Err - duplicate
/// ```
pub fn validate_question_ids(ids: &[String]) -> Result<(), ValidationError> {
    if ids.is_empty() {
        let mut err = ValidationError::new("question_ids_empty");
        err.message = Some("at least one question id is required".into());
        return Err(err);
    }

    if ids.iter().any(|id| id.trim().is_empty()) {
        let mut err = ValidationError::new("question_ids_blank");
        err.message = Some("question ids must not be blank".into());
        return Err(err);
    }

    let mut seen = std::collections::HashSet::new();
    if let Some(duplicate) = ids.iter().find(|id| !seen.insert(id.as_str())) {
        let mut err = ValidationError::new("question_ids_duplicate");
        err.message = Some(format!("question id `{duplicate}` is listed twice").into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_strings_are_rejected() {
        assert!(validate_not_blank("Ada").is_ok());
        assert!(validate_not_blank("").is_err());
        assert!(validate_not_blank("   ").is_err());
    }

    #[test]
    fn question_ids_must_be_unique_and_present() {
        assert!(validate_question_ids(&["q1".into(), "q2".into()]).is_ok());
        assert!(validate_question_ids(&[]).is_err());
        assert!(validate_question_ids(&["q1".into(), " ".into()]).is_err());
        assert!(validate_question_ids(&["q1".into(), "q1".into()]).is_err());
    }
}
