// Exception ledger service: skips and explicit assignments.

use crate::db::{ExceptionEntry, ExceptionKind, OverrideKind, Participant, RotationDb};
use crate::error::RotationError;
use crate::services::resolver;
use crate::week::WeekKey;

/// Mark a participant unavailable for a week and return who now covers it.
///
/// The week's auto record is dropped so the next resolution recomputes it
/// without the skipped participant.
pub fn record_skip(
    db: &RotationDb,
    week: WeekKey,
    participant_id: &str,
    created_by: &str,
) -> Result<Option<Participant>, RotationError> {
    db.with_transaction(|db| {
        db.append_exception(week, participant_id, ExceptionKind::Skip, created_by, None)?;
        if db.delete_assignment(week)? {
            log::info!("Skip recorded for week {}; auto assignment invalidated", week);
        }
        resolver::resolve_week(db, week)
    })
}

/// Append an explicit assignment and return the week's resolved assignee.
pub fn record_override(
    db: &RotationDb,
    week: WeekKey,
    participant_id: &str,
    created_by: &str,
    kind: OverrideKind,
    details: Option<&str>,
) -> Result<Option<Participant>, RotationError> {
    db.with_transaction(|db| {
        db.append_exception(week, participant_id, kind.into(), created_by, details)?;
        log::info!("{} recorded for week {} by {}", kind.as_str(), week, created_by);
        resolver::resolve_week(db, week)
    })
}

pub fn explicit_assignee(
    db: &RotationDb,
    week: WeekKey,
) -> Result<Option<Participant>, RotationError> {
    match db.explicit_assignee_id(week)? {
        Some(id) => Ok(db.get_participant(&id)?),
        None => Ok(None),
    }
}

pub fn is_skipped(
    db: &RotationDb,
    week: WeekKey,
    participant_id: &str,
) -> Result<bool, RotationError> {
    Ok(db.is_skipped(week, participant_id)?)
}

pub fn entries_for_week(
    db: &RotationDb,
    week: WeekKey,
) -> Result<Vec<ExceptionEntry>, RotationError> {
    Ok(db.exceptions_for_week(week)?)
}
