use thiserror::Error;

/// Failures reported by an [`EnrollmentGateway`](crate::domain::ports::EnrollmentGateway)
/// or a [`TransactionManager`](crate::domain::ports::TransactionManager).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("unique constraint `{constraint}` violated")]
    UniqueViolation { constraint: &'static str },

    #[error("timed out waiting for lock on {resource}")]
    LockTimeout { resource: String },

    #[error("data store unavailable: {message}")]
    Unavailable { message: String },

    #[error("data store error: {message}")]
    Backend { message: String },
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }
}

/// The closed set of enrollment failures.
///
/// Callers dispatch on [`EnrollmentError::kind`] or the classification
/// predicates; the `Display` text is diagnostic only.
#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("student {student_id} is already enrolled in offering {offering_id}")]
    DuplicateEnrollment {
        student_id: String,
        offering_id: String,
    },

    #[error("offering {offering_id} is full ({current}/{capacity})")]
    CapacityExceeded {
        offering_id: String,
        current: i64,
        capacity: i64,
    },

    #[error("schedule conflict: requested {requested} overlaps enrolled {existing}")]
    ScheduleConflict {
        offering_id: String,
        conflicting_offering_id: String,
        requested: String,
        existing: String,
    },

    #[error("course offering not found: {offering_id}")]
    OfferingNotFound { offering_id: String },

    #[error("invalid course data for offering {offering_id}: {reason}")]
    InvalidCourseData { offering_id: String, reason: String },

    #[error("invalid timestamp for {field}: {details}")]
    InvalidTimestamp { field: String, details: String },

    #[error("database operation `{operation}` failed: {source}")]
    DatabaseOperation {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("transaction failed: {details}")]
    TransactionFailed {
        details: String,
        #[source]
        source: Option<StoreError>,
    },
}

/// Discriminant of [`EnrollmentError`] without its diagnostic payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub enum ErrorKind {
    DuplicateEnrollment,
    CapacityExceeded,
    ScheduleConflict,
    OfferingNotFound,
    InvalidCourseData,
    InvalidTimestamp,
    DatabaseOperation,
    TransactionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum ErrorCategory {
    BusinessRule,
    DataValidation,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorKind {
    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::DuplicateEnrollment
            | ErrorKind::CapacityExceeded
            | ErrorKind::ScheduleConflict => ErrorCategory::BusinessRule,
            ErrorKind::OfferingNotFound
            | ErrorKind::InvalidCourseData
            | ErrorKind::InvalidTimestamp => ErrorCategory::DataValidation,
            ErrorKind::DatabaseOperation | ErrorKind::TransactionFailed => ErrorCategory::System,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::DuplicateEnrollment => "duplicate_enrollment",
            ErrorKind::CapacityExceeded => "capacity_exceeded",
            ErrorKind::ScheduleConflict => "schedule_conflict",
            ErrorKind::OfferingNotFound => "offering_not_found",
            ErrorKind::InvalidCourseData => "invalid_course_data",
            ErrorKind::InvalidTimestamp => "invalid_timestamp",
            ErrorKind::DatabaseOperation => "database_operation",
            ErrorKind::TransactionFailed => "transaction_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EnrollmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnrollmentError::DuplicateEnrollment { .. } => ErrorKind::DuplicateEnrollment,
            EnrollmentError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            EnrollmentError::ScheduleConflict { .. } => ErrorKind::ScheduleConflict,
            EnrollmentError::OfferingNotFound { .. } => ErrorKind::OfferingNotFound,
            EnrollmentError::InvalidCourseData { .. } => ErrorKind::InvalidCourseData,
            EnrollmentError::InvalidTimestamp { .. } => ErrorKind::InvalidTimestamp,
            EnrollmentError::DatabaseOperation { .. } => ErrorKind::DatabaseOperation,
            EnrollmentError::TransactionFailed { .. } => ErrorKind::TransactionFailed,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        self.kind().category()
    }

    pub fn is_business_rule_violation(&self) -> bool {
        self.category() == ErrorCategory::BusinessRule
    }

    pub fn is_data_validation_error(&self) -> bool {
        self.category() == ErrorCategory::DataValidation
    }

    pub fn is_system_error(&self) -> bool {
        self.category() == ErrorCategory::System
    }

    /// System errors may succeed on a later attempt; everything else needs
    /// a different request or corrected data.
    pub fn is_retryable(&self) -> bool {
        self.is_system_error()
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.kind() {
            ErrorKind::DuplicateEnrollment => ErrorSeverity::Low,
            ErrorKind::CapacityExceeded | ErrorKind::ScheduleConflict => ErrorSeverity::Medium,
            ErrorKind::OfferingNotFound
            | ErrorKind::InvalidCourseData
            | ErrorKind::InvalidTimestamp => ErrorSeverity::High,
            ErrorKind::DatabaseOperation | ErrorKind::TransactionFailed => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.kind() {
            ErrorKind::DuplicateEnrollment => "The student is already enrolled; no action is needed",
            ErrorKind::CapacityExceeded => "Choose another section or wait for a seat to open",
            ErrorKind::ScheduleConflict => "Pick a section that does not overlap the current timetable",
            ErrorKind::OfferingNotFound => "Check the course offering identifier",
            ErrorKind::InvalidCourseData | ErrorKind::InvalidTimestamp => {
                "Fix the course or offering record before enrolling"
            }
            ErrorKind::DatabaseOperation | ErrorKind::TransactionFailed => {
                "Retry the request; contact an administrator if it keeps failing"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            EnrollmentError::DuplicateEnrollment { offering_id, .. } => {
                format!("You are already enrolled in {}", offering_id)
            }
            EnrollmentError::CapacityExceeded {
                offering_id,
                current,
                capacity,
            } => format!(
                "{} is full ({} of {} seats taken)",
                offering_id, current, capacity
            ),
            EnrollmentError::ScheduleConflict {
                requested,
                existing,
                conflicting_offering_id,
                ..
            } => format!(
                "The requested time {} overlaps {} ({})",
                requested, conflicting_offering_id, existing
            ),
            EnrollmentError::OfferingNotFound { offering_id } => {
                format!("Course offering {} does not exist", offering_id)
            }
            EnrollmentError::InvalidCourseData { offering_id, .. } => {
                format!("Course offering {} has invalid data", offering_id)
            }
            EnrollmentError::InvalidTimestamp { field, .. } => {
                format!("The time for {} is invalid", field)
            }
            EnrollmentError::DatabaseOperation { .. } | EnrollmentError::TransactionFailed { .. } => {
                "The enrollment service is temporarily unavailable".to_string()
            }
        }
    }

    pub(crate) fn database(operation: &'static str, source: StoreError) -> Self {
        EnrollmentError::DatabaseOperation { operation, source }
    }

    pub(crate) fn transaction(details: impl Into<String>, source: Option<StoreError>) -> Self {
        EnrollmentError::TransactionFailed {
            details: details.into(),
            source,
        }
    }
}

/// Errors raised while loading or validating a catalog configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid value for {field}: '{value}' ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),

    #[error("Failed to seed store: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, EnrollmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn all_errors() -> Vec<EnrollmentError> {
        vec![
            EnrollmentError::DuplicateEnrollment {
                student_id: "s1".into(),
                offering_id: "o1".into(),
            },
            EnrollmentError::CapacityExceeded {
                offering_id: "o1".into(),
                current: 10,
                capacity: 10,
            },
            EnrollmentError::ScheduleConflict {
                offering_id: "o1".into(),
                conflicting_offering_id: "o2".into(),
                requested: "a".into(),
                existing: "b".into(),
            },
            EnrollmentError::OfferingNotFound {
                offering_id: "o1".into(),
            },
            EnrollmentError::InvalidCourseData {
                offering_id: "o1".into(),
                reason: "capacity must be positive".into(),
            },
            EnrollmentError::InvalidTimestamp {
                field: "start_time".into(),
                details: "out of range".into(),
            },
            EnrollmentError::database("count_active_enrollments", StoreError::backend("boom")),
            EnrollmentError::transaction("commit failed", None),
        ]
    }

    #[test]
    fn test_each_error_has_exactly_one_classification() {
        for err in all_errors() {
            let flags = [
                err.is_business_rule_violation(),
                err.is_data_validation_error(),
                err.is_system_error(),
            ];
            assert_eq!(flags.iter().filter(|f| **f).count(), 1, "{:?}", err.kind());
        }
    }

    #[test]
    fn test_classification_matches_table() {
        let kinds: Vec<(ErrorKind, ErrorCategory)> =
            all_errors().iter().map(|e| (e.kind(), e.category())).collect();
        assert_eq!(
            kinds,
            vec![
                (ErrorKind::DuplicateEnrollment, ErrorCategory::BusinessRule),
                (ErrorKind::CapacityExceeded, ErrorCategory::BusinessRule),
                (ErrorKind::ScheduleConflict, ErrorCategory::BusinessRule),
                (ErrorKind::OfferingNotFound, ErrorCategory::DataValidation),
                (ErrorKind::InvalidCourseData, ErrorCategory::DataValidation),
                (ErrorKind::InvalidTimestamp, ErrorCategory::DataValidation),
                (ErrorKind::DatabaseOperation, ErrorCategory::System),
                (ErrorKind::TransactionFailed, ErrorCategory::System),
            ]
        );
    }

    #[test]
    fn test_only_system_errors_are_retryable() {
        for err in all_errors() {
            assert_eq!(err.is_retryable(), err.is_system_error());
        }
    }

    #[test]
    fn test_database_error_keeps_source() {
        use std::error::Error as _;

        let err = EnrollmentError::database("create_enrollment", StoreError::backend("disk full"));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("data store error: disk full"));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_capacity_message_includes_counts() {
        let err = EnrollmentError::CapacityExceeded {
            offering_id: "CS101-A".into(),
            current: 10,
            capacity: 10,
        };
        assert_eq!(err.to_string(), "offering CS101-A is full (10/10)");
        assert!(err.user_friendly_message().contains("10 of 10"));
    }
}
