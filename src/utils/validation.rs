use crate::utils::error::ConfigError;
use std::collections::HashSet;

type Result<T> = std::result::Result<T, ConfigError>;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_positive_number<T>(field_name: &str, value: T, min_value: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min_value {
        return Err(ConfigError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

/// Every id must be non-empty and appear once.
pub fn validate_unique_ids<'a, I>(field_name: &str, ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    for id in ids {
        validate_non_empty_string(field_name, id)?;
        if !seen.insert(id) {
            return Err(ConfigError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: id.to_string(),
                reason: "Duplicate identifier".to_string(),
            });
        }
    }
    Ok(())
}

pub fn validate_reference(field_name: &str, value: &str, known: &HashSet<&str>) -> Result<()> {
    if !known.contains(value) {
        return Err(ConfigError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Unknown reference".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("batch_concurrency", 5, 1).is_ok());
        assert!(validate_positive_number("batch_concurrency", 0, 1).is_err());
    }

    #[test]
    fn test_validate_positive_number_keeps_wide_values() {
        // 超過 u32 的毫秒數不可被截斷成 0
        assert!(validate_positive_number("transaction_timeout_ms", 1u64 << 32, 1).is_ok());
        assert!(validate_positive_number("transaction_timeout_ms", u64::MAX, 1).is_ok());
        assert!(validate_positive_number("transaction_timeout_ms", 0u64, 1).is_err());
    }

    #[test]
    fn test_validate_non_empty_string() {
        assert!(validate_non_empty_string("student_id", "s-001").is_ok());
        assert!(validate_non_empty_string("student_id", "   ").is_err());
    }

    #[test]
    fn test_validate_unique_ids() {
        assert!(validate_unique_ids("offerings.id", ["A", "B"]).is_ok());
        assert!(validate_unique_ids("offerings.id", ["A", "A"]).is_err());
        assert!(validate_unique_ids("offerings.id", ["A", ""]).is_err());
    }

    #[test]
    fn test_validate_reference() {
        let known: HashSet<&str> = ["CS101"].into_iter().collect();
        assert!(validate_reference("offerings.course", "CS101", &known).is_ok());
        assert!(validate_reference("offerings.course", "CS999", &known).is_err());
    }
}
