//! Back-to-back guard.
//!
//! Explicit assignments that would put a participant on two adjacent weeks
//! are held as a [`BackToBackApproval`] until both the participant and an
//! administrator sign off. Approvals are terminal once approved or rejected.

use serde::Serialize;

use crate::db::{
    ApproverRole, BackToBackApproval, NewApproval, OverrideKind, Participant, RotationDb,
    SwapStatus,
};
use crate::error::RotationError;
use crate::services::{ledger, resolver};
use crate::types::Actor;
use crate::week::WeekKey;

/// An explicit assignment to apply under the back-to-back guard.
#[derive(Debug, Clone)]
pub struct OverrideRequest<'a> {
    pub week: WeekKey,
    pub target: &'a Participant,
    /// Identity recorded as the ledger entry's creator.
    pub created_by: &'a str,
    pub kind: OverrideKind,
    pub details: Option<String>,
    /// Party initiating the action. Pre-approves when it is the target; only
    /// swap acceptance sets it.
    pub initiator: Option<&'a Actor>,
    pub swap_id: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum GuardOutcome {
    /// The entry was written. `approval` is set when an approval was opened
    /// and completed in the same call.
    Applied {
        assignee: Option<Participant>,
        approval: Option<BackToBackApproval>,
    },
    /// Held until both approval slots are filled.
    Pending { approval: BackToBackApproval },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ApprovalOutcome {
    NotFound,
    /// Already approved or rejected; returned unchanged.
    NotPending { approval: BackToBackApproval },
    Waiting {
        approval: BackToBackApproval,
        missing: Vec<ApproverRole>,
    },
    Completed {
        approval: BackToBackApproval,
        assignee: Option<Participant>,
    },
    Rejected { approval: BackToBackApproval },
}

/// True when the participant resolves for the week before or after `week`.
///
/// Resolving the neighbours can materialize their auto records.
pub fn would_conflict(
    db: &RotationDb,
    week: WeekKey,
    participant_id: &str,
) -> Result<bool, RotationError> {
    db.with_transaction(|db| {
        for neighbour in [week.previous(), week.next()] {
            if resolver::resolve_week(db, neighbour)?.is_some_and(|p| p.id == participant_id) {
                return Ok(true);
            }
        }
        Ok(false)
    })
}

/// Apply an explicit assignment, or open an approval if it would create a
/// back-to-back stint.
pub fn guarded_apply(
    db: &RotationDb,
    request: &OverrideRequest<'_>,
) -> Result<GuardOutcome, RotationError> {
    db.with_transaction(|db| {
        if !would_conflict(db, request.week, &request.target.id)? {
            let assignee = ledger::record_override(
                db,
                request.week,
                &request.target.id,
                request.created_by,
                request.kind,
                request.details.as_deref(),
            )?;
            return Ok(GuardOutcome::Applied {
                assignee,
                approval: None,
            });
        }

        let mut approval = match db.find_pending_approval(
            request.week,
            &request.target.id,
            request.kind,
        )? {
            Some(existing) => existing,
            None => db.insert_approval(&NewApproval {
                week: request.week,
                participant: request.target,
                kind: request.kind,
                requested_by: request.created_by,
                details: request.details.as_deref(),
                swap_id: request.swap_id,
            })?,
        };
        log::warn!(
            "Back-to-back detected for {} on week {}; approval {} required",
            request.target.identity,
            request.week,
            approval.id
        );

        if let Some(swap_id) = request.swap_id {
            if approval.swap_id.is_none() {
                db.link_approval_swap(&approval.id, swap_id)?;
            }
        }

        if let Some(actor) = request.initiator {
            if actor.identity == request.target.identity {
                db.set_approver(&approval.id, ApproverRole::Target, &actor.identity)?;
                if actor.is_admin {
                    db.set_approver(&approval.id, ApproverRole::Admin, &actor.identity)?;
                }
            }
        }
        approval = reload(db, &approval.id)?;

        if approval.is_satisfied() {
            let (approval, assignee) = complete(db, approval)?;
            return Ok(GuardOutcome::Applied {
                assignee,
                approval: Some(approval),
            });
        }
        Ok(GuardOutcome::Pending { approval })
    })
}

/// Record a sign-off. Fills the target and/or admin slot as requested, and
/// applies the held assignment once both are filled.
pub fn record_approval(
    db: &RotationDb,
    approval_id: &str,
    approver: &str,
    as_admin: bool,
    as_target: bool,
) -> Result<ApprovalOutcome, RotationError> {
    db.with_transaction(|db| {
        let Some(approval) = db.get_approval(approval_id)? else {
            return Ok(ApprovalOutcome::NotFound);
        };
        if !approval.is_pending() {
            return Ok(ApprovalOutcome::NotPending { approval });
        }

        if as_target {
            db.set_approver(approval_id, ApproverRole::Target, approver)?;
        }
        if as_admin {
            db.set_approver(approval_id, ApproverRole::Admin, approver)?;
        }

        let approval = reload(db, approval_id)?;
        if !approval.is_satisfied() {
            let missing = approval.missing_roles();
            return Ok(ApprovalOutcome::Waiting { approval, missing });
        }

        let (approval, assignee) = complete(db, approval)?;
        Ok(ApprovalOutcome::Completed { approval, assignee })
    })
}

/// Reject a pending approval. A linked swap request is declined with it.
pub fn reject_approval(
    db: &RotationDb,
    approval_id: &str,
    rejected_by: &str,
) -> Result<ApprovalOutcome, RotationError> {
    db.with_transaction(|db| {
        let Some(approval) = db.get_approval(approval_id)? else {
            return Ok(ApprovalOutcome::NotFound);
        };
        if !approval.is_pending() {
            return Ok(ApprovalOutcome::NotPending { approval });
        }

        db.reject_approval(approval_id, rejected_by)?;
        if let Some(swap_id) = approval.swap_id.as_deref() {
            db.resolve_swap(swap_id, SwapStatus::Declined)?;
        }
        log::info!("Approval {} rejected by {}", approval_id, rejected_by);

        Ok(ApprovalOutcome::Rejected {
            approval: reload(db, approval_id)?,
        })
    })
}

/// Apply the held assignment and close the approval.
fn complete(
    db: &RotationDb,
    approval: BackToBackApproval,
) -> Result<(BackToBackApproval, Option<Participant>), RotationError> {
    let assignee = ledger::record_override(
        db,
        approval.week,
        &approval.participant_id,
        &approval.requested_by,
        approval.kind,
        approval.details.as_deref(),
    )?;
    db.mark_approval_approved(&approval.id)?;
    if let Some(swap_id) = approval.swap_id.as_deref() {
        db.resolve_swap(swap_id, SwapStatus::Accepted)?;
    }
    log::info!(
        "Approval {} complete; {} assigned to week {}",
        approval.id,
        approval.participant_identity,
        approval.week
    );
    Ok((reload(db, &approval.id)?, assignee))
}

fn reload(db: &RotationDb, approval_id: &str) -> Result<BackToBackApproval, RotationError> {
    db.get_approval(approval_id)?
        .ok_or_else(|| RotationError::from(rusqlite::Error::QueryReturnedNoRows))
}
