// Queue service: membership changes and administrator checks.

use crate::db::{Participant, RotationDb};
use crate::error::RotationError;
use crate::services::resolver;
use crate::week::WeekKey;

/// Add a participant or reactivate an existing one by identity.
///
/// Identities listed in `initial_admins` always come back as administrators.
pub fn add_participant(
    db: &RotationDb,
    identity: &str,
    display_name: Option<&str>,
    is_admin: bool,
    initial_admins: &[String],
) -> Result<Participant, RotationError> {
    let should_be_admin = is_admin || initial_admins.iter().any(|id| id == identity);
    db.with_transaction(|db| {
        let participant = db.upsert_participant(identity, display_name, should_be_admin)?;
        log::info!(
            "Participant {} active at position {}",
            participant.identity,
            participant.queue_position
        );
        Ok(participant)
    })
}

/// Deactivate a participant. Returns `false` if unknown or already inactive.
///
/// When the participant covers `current_week`, that week's auto record is
/// discarded and the week resolved again without them.
pub fn remove_participant(
    db: &RotationDb,
    identity: &str,
    current_week: WeekKey,
) -> Result<bool, RotationError> {
    db.with_transaction(|db| {
        if !db.deactivate_participant(identity)? {
            return Ok(false);
        }
        db.reindex_queue()?;
        log::info!("Participant {} removed from rotation", identity);

        let covering = resolver::resolve_week(db, current_week)?;
        if covering.is_some_and(|p| p.identity == identity) {
            db.delete_assignment(current_week)?;
            let replacement = resolver::resolve_week(db, current_week)?;
            log::info!(
                "Week {} reassigned after removal: {}",
                current_week,
                replacement
                    .as_ref()
                    .map(|p| p.identity.as_str())
                    .unwrap_or("nobody")
            );
        }
        Ok(true)
    })
}

/// Active participants in rotation order.
pub fn list_queue(db: &RotationDb) -> Result<Vec<Participant>, RotationError> {
    Ok(db.list_active_participants()?)
}

pub fn admins(db: &RotationDb) -> Result<Vec<Participant>, RotationError> {
    Ok(db.list_admins()?)
}

/// Configured initial administrators, or active participants with the flag.
pub fn is_admin(
    db: &RotationDb,
    identity: &str,
    initial_admins: &[String],
) -> Result<bool, RotationError> {
    if initial_admins.iter().any(|id| id == identity) {
        return Ok(true);
    }
    Ok(db
        .get_participant_by_identity(identity)?
        .is_some_and(|p| p.is_active && p.is_admin))
}

/// Raise the admin flag on every known participant in `identities`.
/// Returns how many participants were updated.
pub fn bootstrap_admins(db: &RotationDb, identities: &[String]) -> Result<usize, RotationError> {
    if identities.is_empty() {
        return Ok(0);
    }
    db.with_transaction(|db| {
        let mut updated = 0;
        for identity in identities {
            if db.set_admin_flag(identity)? {
                updated += 1;
            }
        }
        Ok(updated)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::db::WeekTable;

    fn positions(db: &RotationDb) -> Vec<i64> {
        list_queue(db)
            .unwrap()
            .into_iter()
            .map(|p| p.queue_position)
            .collect()
    }

    #[test]
    fn test_density_after_mixed_membership_changes() {
        let db = test_db();
        let w = WeekKey::parse("2026-02-16").unwrap();
        for identity in ["A", "B", "C", "D"] {
            add_participant(&db, identity, None, false, &[]).unwrap();
        }
        assert!(remove_participant(&db, "B", w).unwrap());
        add_participant(&db, "E", None, false, &[]).unwrap();
        assert!(remove_participant(&db, "A", w).unwrap());
        add_participant(&db, "B", None, false, &[]).unwrap();

        let expected: Vec<i64> = (1..=positions(&db).len() as i64).collect();
        assert_eq!(positions(&db), expected);
        assert_eq!(list_queue(&db).unwrap().len(), 4);
    }

    #[test]
    fn test_remove_unknown_is_negative_result() {
        let db = test_db();
        let w = WeekKey::parse("2026-02-16").unwrap();
        assert!(!remove_participant(&db, "GHOST", w).unwrap());
        add_participant(&db, "A", None, false, &[]).unwrap();
        assert!(remove_participant(&db, "A", w).unwrap());
        assert!(!remove_participant(&db, "A", w).unwrap());
    }

    #[test]
    fn test_removing_current_assignee_reassigns_week() {
        let db = test_db();
        let w = WeekKey::parse("2026-02-16").unwrap();
        add_participant(&db, "A", None, false, &[]).unwrap();
        add_participant(&db, "B", None, false, &[]).unwrap();
        assert_eq!(resolver::resolve_week(&db, w).unwrap().unwrap().identity, "A");

        assert!(remove_participant(&db, "A", w).unwrap());
        assert_eq!(resolver::resolve_week(&db, w).unwrap().unwrap().identity, "B");
        assert_eq!(db.count_for_week(WeekTable::AssignmentRecords, w).unwrap(), 1);
    }

    #[test]
    fn test_removing_someone_else_keeps_week() {
        let db = test_db();
        let w = WeekKey::parse("2026-02-16").unwrap();
        add_participant(&db, "A", None, false, &[]).unwrap();
        add_participant(&db, "B", None, false, &[]).unwrap();
        let before = db.get_assignment(w).unwrap();
        assert!(before.is_none());
        resolver::resolve_week(&db, w).unwrap();
        let record = db.get_assignment(w).unwrap().unwrap();

        assert!(remove_participant(&db, "B", w).unwrap());
        assert_eq!(db.get_assignment(w).unwrap().unwrap(), record);
    }

    #[test]
    fn test_initial_admins_and_flagged_participants_are_admins() {
        let db = test_db();
        let initial = vec!["ROOT".to_string()];
        add_participant(&db, "A", None, true, &[]).unwrap();
        add_participant(&db, "B", None, false, &[]).unwrap();

        assert!(is_admin(&db, "ROOT", &initial).unwrap());
        assert!(is_admin(&db, "A", &initial).unwrap());
        assert!(!is_admin(&db, "B", &initial).unwrap());

        let w = WeekKey::parse("2026-02-16").unwrap();
        remove_participant(&db, "A", w).unwrap();
        assert!(!is_admin(&db, "A", &initial).unwrap());
    }

    #[test]
    fn test_add_promotes_initial_admin() {
        let db = test_db();
        let initial = vec!["A".to_string()];
        let a = add_participant(&db, "A", Some("Alex"), false, &initial).unwrap();
        assert!(a.is_admin);
        assert_eq!(admins(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_bootstrap_admins_marks_known_identities() {
        let db = test_db();
        add_participant(&db, "A", None, false, &[]).unwrap();
        add_participant(&db, "B", None, false, &[]).unwrap();

        let updated =
            bootstrap_admins(&db, &["A".to_string(), "NOPE".to_string()]).unwrap();
        assert_eq!(updated, 1);
        let admin_ids: Vec<String> = admins(&db).unwrap().into_iter().map(|p| p.identity).collect();
        assert_eq!(admin_ids, vec!["A"]);
        assert_eq!(bootstrap_admins(&db, &[]).unwrap(), 0);
    }
}
