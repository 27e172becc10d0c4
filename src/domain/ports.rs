use crate::domain::model::{
    Enrollment, OfferingDetails, OfferingId, ScheduledEnrollment, StudentId,
};
use crate::utils::error::StoreError;
use async_trait::async_trait;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Opens and finishes units of work against the data store.
///
/// `Tx` is an opaque handle. Clones refer to the same transaction, so the
/// boundary can keep one clone for commit/rollback while the enclosed work
/// owns another. Dropping every clone without committing rolls back.
#[async_trait]
pub trait TransactionManager: Send + Sync {
    type Tx: Clone + Send + Sync + 'static;

    async fn begin(&self) -> StoreResult<Self::Tx>;
    async fn commit(&self, tx: Self::Tx) -> StoreResult<()>;
    async fn rollback(&self, tx: Self::Tx) -> StoreResult<()>;
}

/// Reads and writes needed by the enrollment pipeline.
///
/// Every operation takes the transaction it participates in; `None` runs the
/// statement on its own and commits immediately.
#[async_trait]
pub trait EnrollmentGateway: TransactionManager {
    async fn enrollment_exists(
        &self,
        tx: Option<&Self::Tx>,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> StoreResult<bool>;

    /// Fails with [`StoreError::NotFound`] when the offering (or its course)
    /// does not exist.
    async fn get_offering_with_course_details(
        &self,
        tx: Option<&Self::Tx>,
        offering_id: &OfferingId,
    ) -> StoreResult<OfferingDetails>;

    async fn count_active_enrollments(
        &self,
        tx: Option<&Self::Tx>,
        offering_id: &OfferingId,
    ) -> StoreResult<i64>;

    async fn list_student_enrollments_with_details(
        &self,
        tx: Option<&Self::Tx>,
        student_id: &StudentId,
    ) -> StoreResult<Vec<ScheduledEnrollment>>;

    /// Fails with [`StoreError::UniqueViolation`] if the pair already exists.
    async fn create_enrollment(
        &self,
        tx: Option<&Self::Tx>,
        student_id: &StudentId,
        offering_id: &OfferingId,
    ) -> StoreResult<Enrollment>;

    /// Row lock on the student (`SELECT ... FOR UPDATE`), held until the
    /// transaction ends. A no-op outside a transaction.
    async fn lock_student(&self, tx: Option<&Self::Tx>, student_id: &StudentId)
        -> StoreResult<()>;

    /// Row lock on the offering, held until the transaction ends. A no-op
    /// outside a transaction.
    async fn lock_offering(
        &self,
        tx: Option<&Self::Tx>,
        offering_id: &OfferingId,
    ) -> StoreResult<()>;

    async fn list_offering_roster(
        &self,
        tx: Option<&Self::Tx>,
        offering_id: &OfferingId,
    ) -> StoreResult<Vec<Enrollment>>;
}
