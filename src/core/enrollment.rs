use crate::config::EngineConfig;
use crate::core::schedule::find_conflict;
use crate::core::transaction::{run_in_transaction, EnrollContext};
use crate::domain::model::{Enrollment, OfferingDetails, OfferingId, StudentId, TimeSlot};
use crate::domain::ports::EnrollmentGateway;
use crate::utils::error::{EnrollmentError, Result, StoreError};

/// Validates and commits enrollments against an [`EnrollmentGateway`].
///
/// Concurrency is handled with row locks: the student row is locked before
/// any read and the offering row before its seats are counted. Locks are
/// always taken in that order and held until the transaction ends, so two
/// requests for the last seat are serialized by the store.
pub struct EnrollmentService<G: EnrollmentGateway> {
    gateway: G,
    config: EngineConfig,
}

impl<G: EnrollmentGateway> EnrollmentService<G> {
    pub fn new(gateway: G, config: EngineConfig) -> Self {
        Self { gateway, config }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh context bounded by the configured transaction timeout.
    pub fn context(&self) -> EnrollContext {
        EnrollContext::with_timeout(self.config.transaction_timeout())
    }

    /// Enrolls `student_id` into `offering_id` if every rule holds.
    ///
    /// Checks run in order and stop at the first failure: duplicate,
    /// offering lookup, data integrity, capacity, schedule overlap. The
    /// insert is committed only when all pass.
    pub async fn enroll_student(
        &self,
        ctx: &EnrollContext,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> Result<Enrollment> {
        tracing::debug!("Enrolling {} into {}", student_id, offering_id);

        let result = run_in_transaction(&self.gateway, ctx, |tx| async move {
            self.validate_and_create(&tx, student_id, offering_id).await
        })
        .await;

        match &result {
            Ok(enrollment) => tracing::info!(
                "✅ Enrolled {} into {} (enrollment #{})",
                student_id,
                offering_id,
                enrollment.id
            ),
            Err(e) if e.is_system_error() => tracing::error!(
                "❌ Enrollment of {} into {} failed: {} (Category: {:?}, Severity: {:?})",
                student_id,
                offering_id,
                e,
                e.category(),
                e.severity()
            ),
            Err(e) => tracing::warn!(
                "🚫 Enrollment of {} into {} rejected [{}]: {}",
                student_id,
                offering_id,
                e.kind(),
                e
            ),
        }

        result
    }

    /// Current roster of an offering, outside any transaction.
    pub async fn roster(&self, offering_id: &OfferingId) -> Result<Vec<Enrollment>> {
        self.gateway
            .list_offering_roster(None, offering_id)
            .await
            .map_err(|e| EnrollmentError::database("list_offering_roster", e))
    }

    async fn validate_and_create(
        &self,
        tx: &G::Tx,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> Result<Enrollment> {
        let tx = Some(tx);

        self.gateway
            .lock_student(tx, student_id)
            .await
            .map_err(|e| EnrollmentError::database("lock_student", e))?;

        // 1. 重複選課
        let exists = self
            .gateway
            .enrollment_exists(tx, student_id, offering_id)
            .await
            .map_err(|e| EnrollmentError::database("enrollment_exists", e))?;
        if exists {
            return Err(duplicate(student_id, offering_id));
        }

        // 2. 開課資料
        let offering = self
            .gateway
            .get_offering_with_course_details(tx, offering_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => EnrollmentError::OfferingNotFound {
                    offering_id: offering_id.to_string(),
                },
                other => EnrollmentError::database("get_offering_with_course_details", other),
            })?;

        // 3. 資料完整性
        let candidate = checked_slot(&offering)?;

        // 4. 名額
        self.gateway
            .lock_offering(tx, offering_id)
            .await
            .map_err(|e| EnrollmentError::database("lock_offering", e))?;
        let current = self
            .gateway
            .count_active_enrollments(tx, offering_id)
            .await
            .map_err(|e| EnrollmentError::database("count_active_enrollments", e))?;
        if current >= offering.capacity {
            return Err(EnrollmentError::CapacityExceeded {
                offering_id: offering_id.to_string(),
                current,
                capacity: offering.capacity,
            });
        }

        // 5. 時段衝突
        let existing = self
            .gateway
            .list_student_enrollments_with_details(tx, student_id)
            .await
            .map_err(|e| EnrollmentError::database("list_student_enrollments_with_details", e))?;
        if let Some(conflict) = find_conflict(&candidate, &existing) {
            return Err(EnrollmentError::ScheduleConflict {
                offering_id: offering_id.to_string(),
                conflicting_offering_id: conflict.existing.offering_id.to_string(),
                requested: candidate.to_string(),
                existing: conflict.existing_slot.to_string(),
            });
        }

        // 6. 寫入；唯一鍵衝突代表並行的同一請求先提交
        self.gateway
            .create_enrollment(tx, student_id, offering_id)
            .await
            .map_err(|e| match e {
                StoreError::UniqueViolation { .. } => duplicate(student_id, offering_id),
                other => EnrollmentError::database("create_enrollment", other),
            })
    }
}

fn duplicate(student_id: &StudentId, offering_id: &OfferingId) -> EnrollmentError {
    EnrollmentError::DuplicateEnrollment {
        student_id: student_id.to_string(),
        offering_id: offering_id.to_string(),
    }
}

/// Rejects corrupt offering rows and returns the slot the offering occupies.
fn checked_slot(offering: &OfferingDetails) -> Result<TimeSlot> {
    let invalid = |reason: String| EnrollmentError::InvalidCourseData {
        offering_id: offering.offering_id.to_string(),
        reason,
    };

    if offering.capacity <= 0 {
        return Err(invalid(format!(
            "capacity must be positive, got {}",
            offering.capacity
        )));
    }
    if offering.credit_load <= 0 {
        return Err(invalid(format!(
            "credit load must be positive, got {}",
            offering.credit_load
        )));
    }
    let Some(start) = offering.start_time else {
        return Err(invalid("start time is missing".to_string()));
    };

    TimeSlot::from_credits(start, offering.credit_load).ok_or_else(|| {
        EnrollmentError::InvalidTimestamp {
            field: format!("offering {} end time", offering.offering_id),
            details: format!(
                "{} plus {} credits is out of range",
                start.to_rfc3339(),
                offering.credit_load
            ),
        }
    })
}
