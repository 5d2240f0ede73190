use super::*;

const APPROVAL_COLUMNS: &str = "id, week_start, participant_id, participant_identity, kind,
     requested_by, status, target_approved_by, admin_approved_by, details, swap_id,
     created_at, resolved_at";

/// Fields needed to open a back-to-back approval.
#[derive(Debug, Clone)]
pub struct NewApproval<'a> {
    pub week: WeekKey,
    pub participant: &'a Participant,
    pub kind: OverrideKind,
    pub requested_by: &'a str,
    pub details: Option<&'a str>,
    pub swap_id: Option<&'a str>,
}

impl RotationDb {
    // =========================================================================
    // Back-to-back approvals
    // =========================================================================

    /// Pending approval for the same (week, participant, kind), if any.
    pub fn find_pending_approval(
        &self,
        week: WeekKey,
        participant_id: &str,
        kind: OverrideKind,
    ) -> Result<Option<BackToBackApproval>, DbError> {
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM back_to_back_approvals
             WHERE week_start = ?1 AND participant_id = ?2 AND kind = ?3 AND status = 'pending'
             ORDER BY seq DESC
             LIMIT 1"
        );
        let approval = self
            .conn
            .query_row(
                &sql,
                params![week, participant_id, kind.as_str()],
                Self::map_approval_row,
            )
            .optional()?;
        Ok(approval)
    }

    pub fn insert_approval(&self, new: &NewApproval<'_>) -> Result<BackToBackApproval, DbError> {
        let id = new_id();
        self.conn.execute(
            "INSERT INTO back_to_back_approvals
                (id, week_start, participant_id, participant_identity, kind, requested_by,
                 status, details, swap_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?8, ?9)",
            params![
                id,
                new.week,
                new.participant.id,
                new.participant.identity,
                new.kind.as_str(),
                new.requested_by,
                new.details,
                new.swap_id,
                now_rfc3339(),
            ],
        )?;
        self.get_approval(&id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn get_approval(&self, id: &str) -> Result<Option<BackToBackApproval>, DbError> {
        let sql = format!("SELECT {APPROVAL_COLUMNS} FROM back_to_back_approvals WHERE id = ?1");
        let approval = self
            .conn
            .query_row(&sql, params![id], Self::map_approval_row)
            .optional()?;
        Ok(approval)
    }

    /// Pending approvals, oldest first.
    pub fn list_pending_approvals(&self) -> Result<Vec<BackToBackApproval>, DbError> {
        let sql = format!(
            "SELECT {APPROVAL_COLUMNS} FROM back_to_back_approvals
             WHERE status = 'pending'
             ORDER BY seq ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::map_approval_row)?;
        let mut approvals = Vec::new();
        for row in rows {
            approvals.push(row?);
        }
        Ok(approvals)
    }

    /// Fill one approval slot. Overwrites any previous value in that slot.
    pub fn set_approver(
        &self,
        id: &str,
        role: ApproverRole,
        approver: &str,
    ) -> Result<(), DbError> {
        let sql = match role {
            ApproverRole::Target => {
                "UPDATE back_to_back_approvals SET target_approved_by = ?1 WHERE id = ?2"
            }
            ApproverRole::Admin => {
                "UPDATE back_to_back_approvals SET admin_approved_by = ?1 WHERE id = ?2"
            }
        };
        self.conn.execute(sql, params![approver, id])?;
        Ok(())
    }

    pub fn link_approval_swap(&self, id: &str, swap_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE back_to_back_approvals SET swap_id = ?1 WHERE id = ?2",
            params![swap_id, id],
        )?;
        Ok(())
    }

    pub fn mark_approval_approved(&self, id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE back_to_back_approvals
             SET status = 'approved', resolved_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Reject a pending approval. The rejecter is recorded in whichever
    /// approval slots are still empty.
    pub fn reject_approval(&self, id: &str, rejected_by: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE back_to_back_approvals
             SET status = 'rejected',
                 resolved_at = ?1,
                 target_approved_by = COALESCE(target_approved_by, ?2),
                 admin_approved_by = COALESCE(admin_approved_by, ?2)
             WHERE id = ?3 AND status = 'pending'",
            params![now_rfc3339(), rejected_by, id],
        )?;
        Ok(())
    }

    fn map_approval_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BackToBackApproval> {
        Ok(BackToBackApproval {
            id: row.get(0)?,
            week: row.get(1)?,
            participant_id: row.get(2)?,
            participant_identity: row.get(3)?,
            kind: label_column(row, 4)?,
            requested_by: row.get(5)?,
            status: label_column(row, 6)?,
            target_approved_by: row.get(7)?,
            admin_approved_by: row.get(8)?,
            details: row.get(9)?,
            swap_id: row.get(10)?,
            created_at: row.get(11)?,
            resolved_at: row.get(12)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::NewApproval;
    use crate::db::test_utils::test_db;
    use crate::db::{ApprovalStatus, ApproverRole, OverrideKind};
    use crate::week::WeekKey;

    #[test]
    fn test_insert_and_find_pending() {
        let db = test_db();
        let p = db.upsert_participant("U2", None, false).unwrap();
        let week = WeekKey::parse("2026-02-23").unwrap();

        let approval = db
            .insert_approval(&NewApproval {
                week,
                participant: &p,
                kind: OverrideKind::Override,
                requested_by: "ADMIN",
                details: Some(r#"{"reason":"coverage"}"#),
                swap_id: None,
            })
            .unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert_eq!(approval.participant_identity, "U2");
        assert!(approval.target_approved_by.is_none());

        let found = db
            .find_pending_approval(week, &p.id, OverrideKind::Override)
            .unwrap()
            .expect("pending approval");
        assert_eq!(found.id, approval.id);
        assert!(db
            .find_pending_approval(week, &p.id, OverrideKind::Swap)
            .unwrap()
            .is_none());
        assert_eq!(db.list_pending_approvals().unwrap().len(), 1);
    }

    #[test]
    fn test_slots_and_approval() {
        let db = test_db();
        let p = db.upsert_participant("U2", None, false).unwrap();
        let week = WeekKey::parse("2026-02-23").unwrap();
        let approval = db
            .insert_approval(&NewApproval {
                week,
                participant: &p,
                kind: OverrideKind::Swap,
                requested_by: "U1",
                details: None,
                swap_id: None,
            })
            .unwrap();

        db.set_approver(&approval.id, ApproverRole::Target, "U2").unwrap();
        let after_target = db.get_approval(&approval.id).unwrap().unwrap();
        assert_eq!(after_target.missing_roles(), vec![ApproverRole::Admin]);

        db.set_approver(&approval.id, ApproverRole::Admin, "ADMIN").unwrap();
        db.link_approval_swap(&approval.id, "swap-1").unwrap();
        db.mark_approval_approved(&approval.id).unwrap();

        let done = db.get_approval(&approval.id).unwrap().unwrap();
        assert!(done.is_satisfied());
        assert_eq!(done.status, ApprovalStatus::Approved);
        assert_eq!(done.swap_id.as_deref(), Some("swap-1"));
        assert!(done.resolved_at.is_some());
        assert!(db.list_pending_approvals().unwrap().is_empty());
    }

    #[test]
    fn test_reject_backfills_only_empty_slots() {
        let db = test_db();
        let p = db.upsert_participant("U2", None, false).unwrap();
        let week = WeekKey::parse("2026-02-23").unwrap();
        let approval = db
            .insert_approval(&NewApproval {
                week,
                participant: &p,
                kind: OverrideKind::Override,
                requested_by: "ADMIN",
                details: None,
                swap_id: None,
            })
            .unwrap();

        db.set_approver(&approval.id, ApproverRole::Target, "U2").unwrap();
        db.reject_approval(&approval.id, "ADMIN").unwrap();

        let rejected = db.get_approval(&approval.id).unwrap().unwrap();
        assert_eq!(rejected.status, ApprovalStatus::Rejected);
        assert_eq!(rejected.target_approved_by.as_deref(), Some("U2"));
        assert_eq!(rejected.admin_approved_by.as_deref(), Some("ADMIN"));
        assert!(rejected.resolved_at.is_some());
    }
}
