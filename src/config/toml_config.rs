use crate::config::engine::EngineConfig;
use crate::core::batch::EnrollmentRequest;
use crate::domain::model::{OfferingId, StudentId};
use crate::utils::error::{ConfigError, EnrollmentError};
use crate::utils::validation::{
    validate_non_empty_string, validate_reference, validate_unique_ids, Validate,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

type Result<T> = std::result::Result<T, ConfigError>;

/// A catalog file: engine settings, seed rows and the requests to run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub courses: Vec<CourseEntry>,
    #[serde(default)]
    pub offerings: Vec<OfferingEntry>,
    #[serde(default)]
    pub enrollments: Vec<EnrollmentEntry>,
    #[serde(default)]
    pub requests: Vec<EnrollmentEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseEntry {
    pub code: String,
    pub credit_load: i64,
}

/// Offering rows are loaded as-is; capacity and credit problems surface at
/// enrollment time as `InvalidCourseData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferingEntry {
    pub id: String,
    pub course: String,
    pub capacity: i64,
    /// RFC 3339, e.g. `2025-09-01T09:00:00Z`.
    pub start_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentEntry {
    pub student_id: String,
    pub offering_id: String,
}

impl OfferingEntry {
    pub fn parsed_start_time(&self) -> std::result::Result<Option<DateTime<Utc>>, EnrollmentError> {
        self.start_time
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| EnrollmentError::InvalidTimestamp {
                        field: format!("offerings[{}].start_time", self.id),
                        details: format!("'{}': {}", raw, e),
                    })
            })
            .transpose()
    }
}

impl EnrollmentEntry {
    pub fn to_request(&self) -> EnrollmentRequest {
        EnrollmentRequest {
            student_id: StudentId::new(self.student_id.clone()),
            offering_id: OfferingId::new(self.offering_id.clone()),
        }
    }
}

impl CatalogConfig {
    /// 從 TOML 檔案載入目錄
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析目錄
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;
        Ok(toml::from_str(&processed_content)?)
    }

    /// 替換環境變數 (例如 ${TERM_START})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| {
            ConfigError::InvalidConfigValueError {
                field: "env_substitution".to_string(),
                value: String::new(),
                reason: e.to_string(),
            }
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn requests(&self) -> Vec<EnrollmentRequest> {
        self.requests.iter().map(EnrollmentEntry::to_request).collect()
    }
}

impl Validate for CatalogConfig {
    fn validate(&self) -> Result<()> {
        self.engine.validate()?;

        validate_unique_ids("courses.code", self.courses.iter().map(|c| c.code.as_str()))?;
        validate_unique_ids("offerings.id", self.offerings.iter().map(|o| o.id.as_str()))?;

        let course_codes: HashSet<&str> = self.courses.iter().map(|c| c.code.as_str()).collect();
        let offering_ids: HashSet<&str> = self.offerings.iter().map(|o| o.id.as_str()).collect();

        for offering in &self.offerings {
            validate_reference("offerings.course", &offering.course, &course_codes)?;
            offering.parsed_start_time()?;
        }

        for entry in &self.enrollments {
            validate_non_empty_string("enrollments.student_id", &entry.student_id)?;
            validate_reference("enrollments.offering_id", &entry.offering_id, &offering_ids)?;
        }

        // 請求可以指向不存在的開課，讓引擎回報 OfferingNotFound
        for entry in &self.requests {
            validate_non_empty_string("requests.student_id", &entry.student_id)?;
            validate_non_empty_string("requests.offering_id", &entry.offering_id)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"
[engine]
transaction_timeout_ms = 1000

[[courses]]
code = "CS101"
credit_load = 3

[[offerings]]
id = "CS101-A"
course = "CS101"
capacity = 30
start_time = "2025-09-01T09:00:00Z"

[[enrollments]]
student_id = "s-001"
offering_id = "CS101-A"

[[requests]]
student_id = "s-002"
offering_id = "CS101-A"
"#;

    #[test]
    fn test_parse_basic_catalog() {
        let config = CatalogConfig::from_toml_str(BASIC).unwrap();

        assert_eq!(config.engine.transaction_timeout_ms, 1000);
        assert_eq!(config.engine.lock_timeout_ms, 2000);
        assert_eq!(config.courses[0].credit_load, 3);
        assert_eq!(config.offerings[0].capacity, 30);
        assert!(config.validate().is_ok());

        let requests = config.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].student_id.as_str(), "s-002");
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("COURSE_ENROLL_TEST_START", "2025-09-02T13:00:00Z");

        let toml_content = r#"
[[courses]]
code = "MATH200"
credit_load = 2

[[offerings]]
id = "MATH200-A"
course = "MATH200"
capacity = 10
start_time = "${COURSE_ENROLL_TEST_START}"
"#;

        let config = CatalogConfig::from_toml_str(toml_content).unwrap();
        let start = config.offerings[0].parsed_start_time().unwrap().unwrap();
        assert_eq!(start.to_rfc3339(), "2025-09-02T13:00:00+00:00");

        std::env::remove_var("COURSE_ENROLL_TEST_START");
    }

    #[test]
    fn test_unparsable_start_time_is_invalid_timestamp() {
        let toml_content = r#"
[[courses]]
code = "CS101"
credit_load = 3

[[offerings]]
id = "CS101-A"
course = "CS101"
capacity = 30
start_time = "next monday"
"#;

        let config = CatalogConfig::from_toml_str(toml_content).unwrap();
        match config.validate() {
            Err(ConfigError::Enrollment(EnrollmentError::InvalidTimestamp { field, .. })) => {
                assert_eq!(field, "offerings[CS101-A].start_time");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_course_reference_rejected() {
        let toml_content = r#"
[[offerings]]
id = "CS101-A"
course = "CS101"
capacity = 30
"#;

        let config = CatalogConfig::from_toml_str(toml_content).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfigValueError { .. })
        ));
    }

    #[test]
    fn test_catalog_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(BASIC.as_bytes()).unwrap();

        let config = CatalogConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.offerings[0].id, "CS101-A");
    }
}
