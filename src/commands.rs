//! Typed entry points for the chat surface.
//!
//! Each command takes the acting identity, checks what that identity may do,
//! and returns a [`CommandResponse`]. Refusals are a `Denied` response rather
//! than an error; errors are reserved for bad input and storage failures.
//! Parsing command text and rendering replies is left to the caller.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;

use crate::db::{OverrideKind, Participant, PendingSwap, RotationDb};
use crate::error::RotationError;
use crate::reminder::{self, ReminderSchedule};
use crate::services::guard::{self, ApprovalOutcome, GuardOutcome, OverrideRequest};
use crate::services::resolver::{self, ScheduledWeek};
use crate::services::swaps::{self, SwapOutcome};
use crate::services::{ledger, queue};
use crate::state::AppState;
use crate::types::Actor;
use crate::week::WeekKey;

const DEFAULT_SCHEDULE_WEEKS: usize = 6;
const MAX_SCHEDULE_WEEKS: usize = 12;

const COMMAND_LATENCY_BUDGET_MS: u128 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandResponse {
    OnCall {
        week: WeekKey,
        assignee: Option<Participant>,
    },
    Schedule {
        weeks: Vec<ScheduledWeek>,
    },
    Queue {
        participants: Vec<Participant>,
    },
    ParticipantAdded {
        participant: Participant,
    },
    ParticipantRemoved {
        identity: String,
        /// False when the identity was unknown or already inactive.
        removed: bool,
    },
    Override {
        week: WeekKey,
        outcome: GuardOutcome,
    },
    Skipped {
        week: WeekKey,
        participant: Participant,
        /// `None` when everyone is unavailable that week.
        covering: Option<Participant>,
    },
    SwapRequested {
        swap: PendingSwap,
    },
    SwapAccepted {
        week: WeekKey,
        outcome: SwapOutcome,
    },
    SwapDeclined {
        week: WeekKey,
        swap: Option<PendingSwap>,
    },
    AdminSwap {
        week: WeekKey,
        outcome: GuardOutcome,
    },
    Approval {
        outcome: ApprovalOutcome,
    },
    Settings {
        settings: BTreeMap<String, String>,
    },
    Denied {
        reason: String,
    },
}

fn denied(reason: &str) -> CommandResponse {
    CommandResponse::Denied {
        reason: reason.to_string(),
    }
}

fn log_command_latency(command: &str, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis();
    if elapsed_ms > COMMAND_LATENCY_BUDGET_MS {
        log::warn!(
            "{} exceeded latency budget: {}ms > {}ms",
            command,
            elapsed_ms,
            COMMAND_LATENCY_BUDGET_MS
        );
    } else {
        log::debug!("{} completed in {}ms", command, elapsed_ms);
    }
}

/// Run a command body in one transaction with the actor's standing resolved.
fn run<F>(state: &AppState, name: &str, actor: &str, f: F) -> Result<CommandResponse, RotationError>
where
    F: FnOnce(&RotationDb, &Actor) -> Result<CommandResponse, RotationError>,
{
    let started = Instant::now();
    let result = state.with_db(|db| {
        db.with_transaction(|db| {
            let actor = state.actor(db, actor)?;
            f(db, &actor)
        })
    });
    log_command_latency(name, started);
    if let Ok(CommandResponse::Denied { reason }) = &result {
        log::info!("{} denied for {}: {}", name, actor, reason);
    }
    result
}

fn active_participant(db: &RotationDb, identity: &str) -> Result<Option<Participant>, RotationError> {
    Ok(db
        .get_participant_by_identity(identity)?
        .filter(|p| p.is_active))
}

// =============================================================================
// Read-only
// =============================================================================

/// Effective assignee for a week (default: the current week).
pub fn who_is_on_call(
    state: &AppState,
    actor: &str,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "who_is_on_call", actor, |db, _| {
        let week = WeekKey::parse_or_current(week)?;
        let assignee = resolver::resolve_week(db, week)?;
        Ok(CommandResponse::OnCall { week, assignee })
    })
}

/// Upcoming schedule from the current week. The count is clamped to 1..=12.
pub fn upcoming(
    state: &AppState,
    actor: &str,
    weeks: Option<usize>,
) -> Result<CommandResponse, RotationError> {
    run(state, "upcoming", actor, |db, _| {
        let count = weeks
            .unwrap_or(DEFAULT_SCHEDULE_WEEKS)
            .clamp(1, MAX_SCHEDULE_WEEKS);
        let weeks = resolver::upcoming_schedule(db, WeekKey::current(), count)?;
        Ok(CommandResponse::Schedule { weeks })
    })
}

pub fn list(state: &AppState, actor: &str) -> Result<CommandResponse, RotationError> {
    run(state, "list", actor, |db, _| {
        Ok(CommandResponse::Queue {
            participants: queue::list_queue(db)?,
        })
    })
}

// =============================================================================
// Membership (admin only)
// =============================================================================

pub fn add_participant(
    state: &AppState,
    actor: &str,
    identity: &str,
    display_name: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "add_participant", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can add participants."));
        }
        let participant =
            queue::add_participant(db, identity, display_name, false, state.initial_admins())?;
        Ok(CommandResponse::ParticipantAdded { participant })
    })
}

pub fn remove_participant(
    state: &AppState,
    actor: &str,
    identity: &str,
) -> Result<CommandResponse, RotationError> {
    run(state, "remove_participant", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can remove participants."));
        }
        let removed = queue::remove_participant(db, identity, WeekKey::current())?;
        Ok(CommandResponse::ParticipantRemoved {
            identity: identity.to_string(),
            removed,
        })
    })
}

// =============================================================================
// Exceptions
// =============================================================================

/// Force `target` onto a week, subject to the back-to-back guard.
pub fn override_week(
    state: &AppState,
    actor: &str,
    target: &str,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "override_week", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can override the schedule."));
        }
        let week = WeekKey::parse_or_current(week)?;
        let Some(target) = active_participant(db, target)? else {
            return Ok(denied("Target user is not an active participant."));
        };

        let outcome = guard::guarded_apply(
            db,
            &OverrideRequest {
                week,
                target: &target,
                created_by: &actor.identity,
                kind: OverrideKind::Override,
                details: None,
                initiator: None,
                swap_id: None,
            },
        )?;
        Ok(CommandResponse::Override { week, outcome })
    })
}

/// Mark a participant unavailable. Anyone may skip themselves; skipping
/// someone else needs an admin.
pub fn skip(
    state: &AppState,
    actor: &str,
    target: Option<&str>,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "skip", actor, |db, actor| {
        let target = target.unwrap_or(actor.identity.as_str());
        if target != actor.identity && !actor.is_admin {
            return Ok(denied("Only admins can skip other users."));
        }
        let Some(participant) = active_participant(db, target)? else {
            return Ok(denied("Target user is not an active participant."));
        };
        let week = WeekKey::parse_or_current(week)?;

        let covering = ledger::record_skip(db, week, &participant.id, &actor.identity)?;
        Ok(CommandResponse::Skipped {
            week,
            participant,
            covering,
        })
    })
}

// =============================================================================
// Swaps
// =============================================================================

/// Ask `target` to take a week the actor is currently covering.
pub fn request_swap(
    state: &AppState,
    actor: &str,
    target: &str,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "request_swap", actor, |db, actor| {
        let week = WeekKey::parse_or_current(week)?;
        let current = resolver::resolve_week(db, week)?;
        if current.map(|p| p.identity).as_deref() != Some(actor.identity.as_str()) {
            return Ok(denied(&format!(
                "You can request a swap only for a week where you are on-call ({}).",
                week
            )));
        }
        if active_participant(db, target)?.is_none() {
            return Ok(denied("Target user is not an active participant."));
        }

        let swap = swaps::propose(db, week, &actor.identity, target)?;
        Ok(CommandResponse::SwapRequested { swap })
    })
}

pub fn accept_swap(
    state: &AppState,
    actor: &str,
    requester: &str,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "accept_swap", actor, |db, actor| {
        let week = WeekKey::parse_or_current(week)?;
        let requester_known = db.get_participant_by_identity(requester)?.is_some();
        let Some(target) = active_participant(db, &actor.identity)? else {
            return Ok(denied("Both users must be active participants."));
        };
        if !requester_known {
            return Ok(denied("Both users must be active participants."));
        }

        let outcome = swaps::accept(db, week, requester, &target, actor.is_admin)?;
        Ok(CommandResponse::SwapAccepted { week, outcome })
    })
}

pub fn decline_swap(
    state: &AppState,
    actor: &str,
    requester: &str,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "decline_swap", actor, |db, actor| {
        let week = WeekKey::parse_or_current(week)?;
        let swap = swaps::decline(db, week, requester, &actor.identity)?;
        Ok(CommandResponse::SwapDeclined { week, swap })
    })
}

/// Hand a week from `first` to `second` without the request handshake.
pub fn admin_swap(
    state: &AppState,
    actor: &str,
    first: &str,
    second: &str,
    week: Option<&str>,
) -> Result<CommandResponse, RotationError> {
    run(state, "admin_swap", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can swap other users."));
        }
        let week = WeekKey::parse_or_current(week)?;
        let (Some(first), Some(second)) =
            (active_participant(db, first)?, active_participant(db, second)?)
        else {
            return Ok(denied("Both users must be active participants."));
        };

        let outcome = swaps::admin_swap(db, week, &first, &second, actor)?;
        Ok(CommandResponse::AdminSwap { week, outcome })
    })
}

// =============================================================================
// Back-to-back approvals
// =============================================================================

/// Sign off on a held back-to-back assignment. The actor fills the target
/// slot if they are the participant and the admin slot if they are an admin.
pub fn approve(
    state: &AppState,
    actor: &str,
    approval_id: &str,
) -> Result<CommandResponse, RotationError> {
    run(state, "approve", actor, |db, actor| {
        let Some(approval) = db.get_approval(approval_id)?.filter(|a| a.is_pending()) else {
            return Ok(CommandResponse::Approval {
                outcome: ApprovalOutcome::NotFound,
            });
        };
        let is_target = approval.participant_identity == actor.identity;
        if !is_target && !actor.is_admin {
            return Ok(denied(
                "Only the target user or an admin can approve/reject this request.",
            ));
        }

        let outcome =
            guard::record_approval(db, approval_id, &actor.identity, actor.is_admin, is_target)?;
        Ok(CommandResponse::Approval { outcome })
    })
}

pub fn reject(
    state: &AppState,
    actor: &str,
    approval_id: &str,
) -> Result<CommandResponse, RotationError> {
    run(state, "reject", actor, |db, actor| {
        let Some(approval) = db.get_approval(approval_id)?.filter(|a| a.is_pending()) else {
            return Ok(CommandResponse::Approval {
                outcome: ApprovalOutcome::NotFound,
            });
        };
        if approval.participant_identity != actor.identity && !actor.is_admin {
            return Ok(denied(
                "Only the target user or an admin can approve/reject this request.",
            ));
        }

        let outcome = guard::reject_approval(db, approval_id, &actor.identity)?;
        Ok(CommandResponse::Approval { outcome })
    })
}

// =============================================================================
// Reminder settings (admin only)
// =============================================================================

pub fn config(state: &AppState, actor: &str) -> Result<CommandResponse, RotationError> {
    run(state, "config", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can view the configuration."));
        }
        Ok(CommandResponse::Settings {
            settings: db.get_settings()?,
        })
    })
}

pub fn set_reminder_channel(
    state: &AppState,
    actor: &str,
    channel: &str,
) -> Result<CommandResponse, RotationError> {
    run(state, "set_reminder_channel", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can change the configuration."));
        }
        reminder::set_channel(db, channel)?;
        Ok(CommandResponse::Settings {
            settings: db.get_settings()?,
        })
    })
}

/// Store a new reminder slot. The external trigger picks it up on its next
/// reload.
pub fn set_reminder_schedule(
    state: &AppState,
    actor: &str,
    day: &str,
    time: &str,
    timezone: &str,
) -> Result<CommandResponse, RotationError> {
    run(state, "set_reminder_schedule", actor, |db, actor| {
        if !actor.is_admin {
            return Ok(denied("Only admins can change the configuration."));
        }
        let schedule = ReminderSchedule::parse(day, time, timezone)?;
        reminder::set_schedule(db, &schedule)?;
        Ok(CommandResponse::Settings {
            settings: db.get_settings()?,
        })
    })
}
