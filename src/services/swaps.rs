// Swap workflow: peer requests that hand a week to someone else.
//
// A swap request names (week, requester, target). Only the most recent
// pending request for a triple is ever considered. Expiry is stored with the
// request and reported, never enforced.

use serde::Serialize;
use serde_json::json;

use crate::db::{BackToBackApproval, OverrideKind, Participant, PendingSwap, RotationDb, SwapStatus};
use crate::error::RotationError;
use crate::services::guard::{self, GuardOutcome, OverrideRequest};
use crate::types::Actor;
use crate::week::WeekKey;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SwapOutcome {
    /// No pending request matches.
    NotFound,
    Accepted {
        swap: PendingSwap,
        assignee: Option<Participant>,
    },
    /// The hand-over would be back-to-back; the request stays pending until
    /// the linked approval is resolved.
    AwaitingApproval {
        swap: PendingSwap,
        approval: BackToBackApproval,
    },
}

pub fn propose(
    db: &RotationDb,
    week: WeekKey,
    requester: &str,
    target: &str,
) -> Result<PendingSwap, RotationError> {
    db.with_transaction(|db| {
        let swap = db.insert_swap(week, requester, target)?;
        log::info!(
            "Swap {} proposed for week {}: {} -> {} (expires {})",
            swap.id,
            week,
            requester,
            target,
            swap.expires_at
        );
        Ok(swap)
    })
}

/// Accept a pending request on behalf of `target`. Accepting counts as the
/// target's consent to a back-to-back stint.
pub fn accept(
    db: &RotationDb,
    week: WeekKey,
    requester: &str,
    target: &Participant,
    target_is_admin: bool,
) -> Result<SwapOutcome, RotationError> {
    db.with_transaction(|db| {
        let Some(swap) = db.find_pending_swap(week, requester, &target.identity)? else {
            return Ok(SwapOutcome::NotFound);
        };

        let actor = Actor::new(&target.identity, target_is_admin);
        let details = json!({ "requester": requester, "swapId": swap.id }).to_string();
        let outcome = guard::guarded_apply(
            db,
            &OverrideRequest {
                week,
                target,
                created_by: &target.identity,
                kind: OverrideKind::Swap,
                details: Some(details),
                initiator: Some(&actor),
                swap_id: Some(&swap.id),
            },
        )?;

        match outcome {
            GuardOutcome::Applied { assignee, .. } => {
                db.resolve_swap(&swap.id, SwapStatus::Accepted)?;
                let swap = reload(db, &swap.id)?;
                Ok(SwapOutcome::Accepted { swap, assignee })
            }
            GuardOutcome::Pending { approval } => {
                Ok(SwapOutcome::AwaitingApproval { swap, approval })
            }
        }
    })
}

/// Decline the matching pending request. Returns the declined swap, or
/// `None` if nothing matched.
pub fn decline(
    db: &RotationDb,
    week: WeekKey,
    requester: &str,
    target: &str,
) -> Result<Option<PendingSwap>, RotationError> {
    db.with_transaction(|db| {
        let Some(swap) = db.find_pending_swap(week, requester, target)? else {
            return Ok(None);
        };
        db.resolve_swap(&swap.id, SwapStatus::Declined)?;
        log::info!("Swap {} declined by {}", swap.id, target);
        Ok(Some(reload(db, &swap.id)?))
    })
}

/// Administrator-driven swap: `second` takes the week, guarded like any
/// other explicit assignment. Nothing is pre-approved, even when the admin
/// is `second`.
pub fn admin_swap(
    db: &RotationDb,
    week: WeekKey,
    first: &Participant,
    second: &Participant,
    actor: &Actor,
) -> Result<GuardOutcome, RotationError> {
    let details = json!({ "first": first.identity, "second": second.identity }).to_string();
    guard::guarded_apply(
        db,
        &OverrideRequest {
            week,
            target: second,
            created_by: &actor.identity,
            kind: OverrideKind::Swap,
            details: Some(details),
            initiator: None,
            swap_id: None,
        },
    )
}

fn reload(db: &RotationDb, swap_id: &str) -> Result<PendingSwap, RotationError> {
    db.get_swap(swap_id)?
        .ok_or_else(|| RotationError::from(rusqlite::Error::QueryReturnedNoRows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::db::ApprovalStatus;
    use crate::services::{ledger, resolver};

    fn week(s: &str) -> WeekKey {
        WeekKey::parse(s).unwrap()
    }

    #[test]
    fn test_accept_without_conflict_assigns_target() {
        let db = test_db();
        db.upsert_participant("C", None, false).unwrap();
        db.upsert_participant("A", None, false).unwrap();
        db.upsert_participant("D", None, false).unwrap();
        let b = db.upsert_participant("B", None, false).unwrap();
        let w = week("2026-02-16");
        // W-1 -> C, W -> A; W+1 will resolve to D, so B is clear of both.
        let schedule = resolver::upcoming_schedule(&db, w.previous(), 2).unwrap();
        assert_eq!(schedule[1].assignee.as_ref().unwrap().identity, "A");

        propose(&db, w, "A", "B").unwrap();
        match accept(&db, w, "A", &b, false).unwrap() {
            SwapOutcome::Accepted { swap, assignee } => {
                assert_eq!(swap.status, SwapStatus::Accepted);
                assert_eq!(assignee.unwrap().identity, "B");
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
        assert_eq!(ledger::explicit_assignee(&db, w).unwrap().unwrap().identity, "B");
        let entry = &db.exceptions_for_week(w).unwrap()[0];
        assert_eq!(entry.created_by, "B");
        assert!(entry.details.as_deref().unwrap().contains("\"requester\":\"A\""));
    }

    #[test]
    fn test_accept_without_request_is_not_found() {
        let db = test_db();
        let b = db.upsert_participant("B", None, false).unwrap();
        let w = week("2026-02-16");
        assert_eq!(accept(&db, w, "A", &b, false).unwrap(), SwapOutcome::NotFound);
    }

    #[test]
    fn test_decline_closes_request() {
        let db = test_db();
        let b = db.upsert_participant("B", None, false).unwrap();
        let w = week("2026-02-16");
        propose(&db, w, "A", "B").unwrap();

        let declined = decline(&db, w, "A", "B").unwrap().unwrap();
        assert_eq!(declined.status, SwapStatus::Declined);
        assert!(decline(&db, w, "A", "B").unwrap().is_none());
        assert_eq!(accept(&db, w, "A", &b, false).unwrap(), SwapOutcome::NotFound);
    }

    #[test]
    fn test_conflicting_accept_waits_then_resolves_with_approval() {
        let db = test_db();
        db.upsert_participant("A", None, false).unwrap();
        let b = db.upsert_participant("B", None, false).unwrap();
        let w = week("2026-02-16");
        // W -> A, W+1 -> B. B taking W would be back-to-back.
        resolver::upcoming_schedule(&db, w, 2).unwrap();

        let swap = propose(&db, w, "A", "B").unwrap();
        let approval = match accept(&db, w, "A", &b, false).unwrap() {
            SwapOutcome::AwaitingApproval { swap: pending, approval } => {
                assert_eq!(pending.status, SwapStatus::Pending);
                assert_eq!(approval.target_approved_by.as_deref(), Some("B"));
                assert_eq!(approval.swap_id.as_deref(), Some(swap.id.as_str()));
                approval
            }
            other => panic!("expected AwaitingApproval, got {:?}", other),
        };

        guard::record_approval(&db, &approval.id, "ADMIN", true, false).unwrap();
        assert_eq!(db.get_swap(&swap.id).unwrap().unwrap().status, SwapStatus::Accepted);
        assert_eq!(resolver::resolve_week(&db, w).unwrap().unwrap().identity, "B");
    }

    #[test]
    fn test_rejected_approval_declines_linked_swap() {
        let db = test_db();
        db.upsert_participant("A", None, false).unwrap();
        let b = db.upsert_participant("B", None, false).unwrap();
        let w = week("2026-02-16");
        resolver::upcoming_schedule(&db, w, 2).unwrap();

        let swap = propose(&db, w, "A", "B").unwrap();
        let SwapOutcome::AwaitingApproval { approval, .. } = accept(&db, w, "A", &b, false).unwrap()
        else {
            panic!("expected AwaitingApproval");
        };

        guard::reject_approval(&db, &approval.id, "ADMIN").unwrap();
        assert_eq!(db.get_swap(&swap.id).unwrap().unwrap().status, SwapStatus::Declined);
        assert_eq!(resolver::resolve_week(&db, w).unwrap().unwrap().identity, "A");
    }

    #[test]
    fn test_admin_target_accept_completes_immediately() {
        let db = test_db();
        db.upsert_participant("A", None, false).unwrap();
        let b = db.upsert_participant("B", None, true).unwrap();
        let w = week("2026-02-16");
        resolver::upcoming_schedule(&db, w, 2).unwrap();

        propose(&db, w, "A", "B").unwrap();
        match accept(&db, w, "A", &b, true).unwrap() {
            SwapOutcome::Accepted { swap, assignee } => {
                assert_eq!(swap.status, SwapStatus::Accepted);
                assert_eq!(assignee.unwrap().identity, "B");
            }
            other => panic!("expected Accepted, got {:?}", other),
        }
        let approvals = db.list_pending_approvals().unwrap();
        assert!(approvals.is_empty());
    }

    #[test]
    fn test_admin_swapping_themself_in_is_not_preapproved() {
        let db = test_db();
        let a = db.upsert_participant("A", None, false).unwrap();
        let admin = db.upsert_participant("ADMIN", None, true).unwrap();
        let w = week("2026-02-16");
        // W -> A, W+1 -> ADMIN.
        resolver::upcoming_schedule(&db, w, 2).unwrap();
        let actor = Actor::new("ADMIN", true);

        match admin_swap(&db, w, &a, &admin, &actor).unwrap() {
            GuardOutcome::Pending { approval } => {
                assert!(approval.target_approved_by.is_none());
                assert!(approval.admin_approved_by.is_none());
            }
            other => panic!("expected Pending, got {:?}", other),
        }
        assert_eq!(resolver::resolve_week(&db, w).unwrap().unwrap().identity, "A");
    }

    #[test]
    fn test_admin_swap_is_guarded() {
        let db = test_db();
        let a = db.upsert_participant("A", None, false).unwrap();
        let b = db.upsert_participant("B", None, false).unwrap();
        let w = week("2026-02-16");
        resolver::upcoming_schedule(&db, w, 2).unwrap();
        let admin = Actor::new("ADMIN", true);

        match admin_swap(&db, w, &a, &b, &admin).unwrap() {
            GuardOutcome::Pending { approval } => {
                assert_eq!(approval.kind, OverrideKind::Swap);
                assert_eq!(approval.status, ApprovalStatus::Pending);
                assert_eq!(approval.requested_by, "ADMIN");
            }
            other => panic!("expected Pending, got {:?}", other),
        }
    }
}
