//! Assignment resolution.
//!
//! A week's effective assignee is layered: the most recent override or swap
//! entry in the ledger wins, otherwise the auto layer's assignment record.
//! The auto layer is materialized lazily, the first time a week is resolved,
//! and only ever consults *materialized* state of the previous week. Resolving
//! weeks out of order can therefore miss a back-to-back exclusion that an
//! ascending walk would have caught; callers that care should resolve a
//! contiguous range in ascending order (see [`upcoming_schedule`]).

use serde::Serialize;

use crate::db::{AssignmentRecord, Participant, RotationDb};
use crate::error::{is_unique_violation, RotationError};
use crate::week::WeekKey;

/// One row of an upcoming schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledWeek {
    pub week: WeekKey,
    pub assignee: Option<Participant>,
}

/// Make sure the auto layer has a record for `week`, computing one if needed.
///
/// Returns `None` when nobody can be selected (empty queue or everyone
/// skipped); nothing is written in that case so the next call tries again.
pub fn ensure_auto_assignment(
    db: &RotationDb,
    week: WeekKey,
) -> Result<Option<AssignmentRecord>, RotationError> {
    db.with_transaction(|db| {
        if let Some(existing) = db.get_assignment(week)? {
            return Ok(Some(existing));
        }

        let queue = db.list_active_participants()?;
        if queue.is_empty() {
            log::debug!("No active participants; week {} left unassigned", week);
            return Ok(None);
        }

        let previous = materialized_assignee_id(db, week.previous())?;
        let contested = queue.len() > 1;

        let mut selected = None;
        for candidate in &queue {
            if db.is_skipped(week, &candidate.id)? {
                continue;
            }
            if contested && previous.as_deref() == Some(candidate.id.as_str()) {
                continue;
            }
            selected = Some(candidate);
            break;
        }

        let Some(candidate) = selected else {
            log::warn!(
                "Every active participant is unavailable for week {}; no assignment made",
                week
            );
            return Ok(None);
        };

        let record = record_auto_assignment(db, week, &candidate.id)?;
        db.move_to_back(&candidate.id)?;

        log::info!("Auto-assigned {} to week {}", candidate.identity, week);
        Ok(Some(record))
    })
}

/// Insert the auto record. Losing the race for the week's single record
/// surfaces as the retryable `DuplicateAssignment`.
fn record_auto_assignment(
    db: &RotationDb,
    week: WeekKey,
    participant_id: &str,
) -> Result<AssignmentRecord, RotationError> {
    db.insert_assignment(week, participant_id).map_err(|e| {
        if is_unique_violation(&e) {
            RotationError::DuplicateAssignment(week)
        } else {
            RotationError::Database(e)
        }
    })
}

/// Effective assignee for a week, materializing the auto layer if needed.
pub fn resolve_week(db: &RotationDb, week: WeekKey) -> Result<Option<Participant>, RotationError> {
    db.with_transaction(|db| {
        ensure_auto_assignment(db, week)?;
        let assignee = match materialized_assignee_id(db, week)? {
            Some(id) => db.get_participant(&id)?,
            None => None,
        };
        log::debug!(
            "Week {} resolves to {}",
            week,
            assignee.as_ref().map(|p| p.identity.as_str()).unwrap_or("nobody")
        );
        Ok(assignee)
    })
}

/// Explicit entry for the week, else its assignment record. Never computes.
pub fn materialized_assignee_id(
    db: &RotationDb,
    week: WeekKey,
) -> Result<Option<String>, RotationError> {
    if let Some(id) = db.explicit_assignee_id(week)? {
        return Ok(Some(id));
    }
    Ok(db.get_assignment(week)?.map(|record| record.participant_id))
}

/// Resolve `count` consecutive weeks starting at `start`, in ascending order.
pub fn upcoming_schedule(
    db: &RotationDb,
    start: WeekKey,
    count: usize,
) -> Result<Vec<ScheduledWeek>, RotationError> {
    db.with_transaction(|db| {
        let mut schedule = Vec::with_capacity(count);
        for offset in 0..count {
            let week = start.offset(offset as i64);
            let assignee = resolve_week(db, week)?;
            schedule.push(ScheduledWeek { week, assignee });
        }
        Ok(schedule)
    })
}
