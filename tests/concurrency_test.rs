use chrono::{DateTime, TimeZone, Utc};
use course_enroll::adapters::memory::OfferingRow;
use course_enroll::domain::ports::EnrollmentGateway;
use course_enroll::{
    EngineConfig, EnrollContext, EnrollmentError, EnrollmentService, ErrorKind, MemoryStore,
    OfferingId, StudentId,
};
use std::sync::Arc;

fn at(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 1, h, m, 0).unwrap()
}

fn service_with(offerings: &[(&str, i64, DateTime<Utc>)]) -> Arc<EnrollmentService<MemoryStore>> {
    let store = MemoryStore::default();
    store.insert_course("CS101", 3).unwrap();
    for (id, capacity, start) in offerings {
        store
            .insert_offering(
                OfferingId::new(*id),
                OfferingRow {
                    course_code: "CS101".to_string(),
                    capacity: *capacity,
                    start_time: Some(*start),
                },
            )
            .unwrap();
    }
    Arc::new(EnrollmentService::new(store, EngineConfig::default()))
}

async fn race(
    service: &Arc<EnrollmentService<MemoryStore>>,
    attempts: Vec<(String, String)>,
) -> Vec<Result<u64, EnrollmentError>> {
    let mut handles = Vec::new();
    for (student, offering) in attempts {
        let service = Arc::clone(service);
        handles.push(tokio::spawn(async move {
            service
                .enroll_student(
                    &EnrollContext::background(),
                    &StudentId::new(student),
                    &OfferingId::new(offering),
                )
                .await
                .map(|e| e.id)
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }
    results
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_last_seat_goes_to_exactly_one_student() {
    let service = service_with(&[("CS101-A", 1, at(9, 0))]);
    let attempts = (0..32)
        .map(|i| (format!("s-{}", i), "CS101-A".to_string()))
        .collect();

    let results = race(&service, attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "more than one student took the last seat");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
    }

    let count = service
        .gateway()
        .count_active_enrollments(None, &OfferingId::new("CS101-A"))
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_capacity_never_overrun() {
    let service = service_with(&[("CS101-A", 5, at(9, 0))]);
    let attempts = (0..60)
        .map(|i| (format!("s-{}", i), "CS101-A".to_string()))
        .collect();

    let results = race(&service, attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    let roster = service.roster(&OfferingId::new("CS101-A")).await.unwrap();
    assert_eq!(roster.len(), 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_duplicates_collapse_to_one() {
    let service = service_with(&[("CS101-A", 30, at(9, 0))]);
    let attempts = (0..16)
        .map(|_| ("s-1".to_string(), "CS101-A".to_string()))
        .collect();

    let results = race(&service, attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::DuplicateEnrollment);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_overlapping_sections_for_one_student() {
    // 同一學生同時選三個重疊時段，只能成功一個
    let service = service_with(&[
        ("CS101-A", 30, at(9, 0)),
        ("CS101-B", 30, at(9, 30)),
        ("CS101-C", 30, at(10, 0)),
    ]);
    let attempts = ["CS101-A", "CS101-B", "CS101-C"]
        .iter()
        .map(|o| ("s-1".to_string(), o.to_string()))
        .collect();

    let results = race(&service, attempts).await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::ScheduleConflict);
    }
}
