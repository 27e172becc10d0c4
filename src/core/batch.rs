use crate::core::enrollment::EnrollmentService;
use crate::domain::model::{OfferingId, StudentId};
use crate::domain::ports::EnrollmentGateway;
use crate::utils::error::{EnrollmentError, ErrorKind, ErrorSeverity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentRequest {
    pub student_id: StudentId,
    pub offering_id: OfferingId,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentOutcome {
    pub student_id: StudentId,
    pub offering_id: OfferingId,
    pub enrollment_id: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub message: Option<String>,
    #[serde(skip)]
    pub severity: Option<ErrorSeverity>,
}

impl EnrollmentOutcome {
    fn from_result(
        request: EnrollmentRequest,
        result: Result<crate::domain::model::Enrollment, EnrollmentError>,
    ) -> Self {
        let (enrollment_id, error) = match result {
            Ok(enrollment) => (Some(enrollment.id), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            student_id: request.student_id,
            offering_id: request.offering_id,
            enrollment_id,
            error_kind: error.as_ref().map(EnrollmentError::kind),
            message: error.as_ref().map(ToString::to_string),
            severity: error.as_ref().map(EnrollmentError::severity),
        }
    }

    pub fn is_enrolled(&self) -> bool {
        self.enrollment_id.is_some()
    }
}

/// Summary of a batch run, in request order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnrollmentReport {
    pub total: usize,
    pub enrolled: usize,
    pub rejected: BTreeMap<ErrorKind, usize>,
    pub outcomes: Vec<EnrollmentOutcome>,
}

impl EnrollmentReport {
    fn from_outcomes(outcomes: Vec<EnrollmentOutcome>) -> Self {
        let mut rejected = BTreeMap::new();
        for kind in outcomes.iter().filter_map(|o| o.error_kind) {
            *rejected.entry(kind).or_insert(0) += 1;
        }
        Self {
            total: outcomes.len(),
            enrolled: outcomes.iter().filter(|o| o.is_enrolled()).count(),
            rejected,
            outcomes,
        }
    }

    pub fn rejected_count(&self, kind: ErrorKind) -> usize {
        self.rejected.get(&kind).copied().unwrap_or(0)
    }

    pub fn worst_severity(&self) -> Option<ErrorSeverity> {
        self.outcomes.iter().filter_map(|o| o.severity).max()
    }
}

/// Runs every request on its own task, at most `concurrency` at a time.
///
/// Each request gets its own context derived from the engine's transaction
/// timeout, so one slow request cannot eat into another's deadline.
pub async fn enroll_batch<G>(
    service: Arc<EnrollmentService<G>>,
    requests: Vec<EnrollmentRequest>,
    concurrency: usize,
) -> EnrollmentReport
where
    G: EnrollmentGateway + 'static,
{
    let permits = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();

    tracing::info!(
        "🚀 Running {} enrollment requests (concurrency {})",
        requests.len(),
        concurrency
    );

    for (index, request) in requests.iter().cloned().enumerate() {
        let service = Arc::clone(&service);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let result = match permits.acquire_owned().await {
                Ok(_permit) => {
                    let ctx = service.context();
                    service
                        .enroll_student(&ctx, &request.student_id, &request.offering_id)
                        .await
                }
                Err(_) => Err(EnrollmentError::transaction("batch semaphore closed", None)),
            };
            (index, EnrollmentOutcome::from_result(request, result))
        });
    }

    let mut slots: Vec<Option<EnrollmentOutcome>> = vec![None; requests.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::error!("Enrollment task failed: {}", e),
        }
    }

    // 任務 panic 時仍保留該請求的結果列
    let outcomes = slots
        .into_iter()
        .zip(requests)
        .map(|(slot, request)| {
            slot.unwrap_or_else(|| {
                EnrollmentOutcome::from_result(
                    request,
                    Err(EnrollmentError::transaction("enrollment task aborted", None)),
                )
            })
        })
        .collect();

    let report = EnrollmentReport::from_outcomes(outcomes);
    tracing::info!(
        "📊 Batch finished: {}/{} enrolled",
        report.enrolled,
        report.total
    );
    report
}
