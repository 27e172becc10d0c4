use crate::domain::model::{ScheduledEnrollment, TimeSlot};

/// A clash between the requested slot and one of the student's enrollments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict<'a> {
    pub existing: &'a ScheduledEnrollment,
    pub existing_slot: TimeSlot,
}

/// Returns the first existing enrollment whose slot overlaps `candidate`.
///
/// Entries without a start time, with a non-positive credit load, or whose
/// end is unrepresentable are skipped: they are pre-existing bad rows and
/// must not block the request.
pub fn find_conflict<'a>(
    candidate: &TimeSlot,
    existing: &'a [ScheduledEnrollment],
) -> Option<Conflict<'a>> {
    existing.iter().find_map(|enrollment| {
        let Some(start) = enrollment.start_time else {
            tracing::debug!(
                "Skipping enrollment in {} without start time",
                enrollment.offering_id
            );
            return None;
        };
        let Some(slot) = TimeSlot::from_credits(start, enrollment.credit_load) else {
            tracing::debug!(
                "Skipping enrollment in {} with unusable credit load {}",
                enrollment.offering_id,
                enrollment.credit_load
            );
            return None;
        };

        candidate.overlaps(&slot).then_some(Conflict {
            existing: enrollment,
            existing_slot: slot,
        })
    })
}
