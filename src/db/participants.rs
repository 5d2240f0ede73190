use super::*;

const PARTICIPANT_COLUMNS: &str =
    "id, identity, display_name, queue_position, is_active, is_admin, created_at";

impl RotationDb {
    // =========================================================================
    // Participants (queue store)
    // =========================================================================

    /// Insert a new participant at the back of the active queue, or reactivate
    /// an existing one by identity.
    ///
    /// Reactivation refreshes the label and only ever raises the admin flag;
    /// the stored position is kept and the queue is reindexed so positions
    /// stay dense.
    pub fn upsert_participant(
        &self,
        identity: &str,
        display_name: Option<&str>,
        is_admin: bool,
    ) -> Result<Participant, DbError> {
        if let Some(existing) = self.get_participant_by_identity(identity)? {
            self.conn.execute(
                "UPDATE participants
                 SET display_name = ?1, is_active = 1, is_admin = ?2
                 WHERE identity = ?3",
                params![display_name, is_admin || existing.is_admin, identity],
            )?;
            if !existing.is_active {
                self.reindex_queue()?;
            }
        } else {
            let position = self.max_active_position()? + 1;
            self.conn.execute(
                "INSERT INTO participants
                    (id, identity, display_name, queue_position, is_active, is_admin, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)",
                params![new_id(), identity, display_name, position, is_admin, now_rfc3339()],
            )?;
        }

        self.get_participant_by_identity(identity)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    }

    /// Fetch a participant (active or not) by external identity.
    pub fn get_participant_by_identity(
        &self,
        identity: &str,
    ) -> Result<Option<Participant>, DbError> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE identity = ?1");
        let participant = self
            .conn
            .query_row(&sql, params![identity], Self::map_participant_row)
            .optional()?;
        Ok(participant)
    }

    /// Fetch a participant (active or not) by internal id.
    pub fn get_participant(&self, id: &str) -> Result<Option<Participant>, DbError> {
        let sql = format!("SELECT {PARTICIPANT_COLUMNS} FROM participants WHERE id = ?1");
        let participant = self
            .conn
            .query_row(&sql, params![id], Self::map_participant_row)
            .optional()?;
        Ok(participant)
    }

    /// Active participants in queue order.
    pub fn list_active_participants(&self) -> Result<Vec<Participant>, DbError> {
        let sql = format!(
            "SELECT {PARTICIPANT_COLUMNS} FROM participants
             WHERE is_active = 1
             ORDER BY queue_position ASC, rowid ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], Self::map_participant_row)?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Active participants holding the admin flag, in queue order.
    pub fn list_admins(&self) -> Result<Vec<Participant>, DbError> {
        Ok(self
            .list_active_participants()?
            .into_iter()
            .filter(|p| p.is_admin)
            .collect())
    }

    fn max_active_position(&self) -> Result<i64, DbError> {
        let max = self.conn.query_row(
            "SELECT COALESCE(MAX(queue_position), 0) FROM participants WHERE is_active = 1",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    /// Mark a participant inactive. Returns `false` if the identity is unknown
    /// or already inactive.
    pub fn deactivate_participant(&self, identity: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "UPDATE participants SET is_active = 0 WHERE identity = ?1 AND is_active = 1",
            params![identity],
        )?;
        Ok(rows > 0)
    }

    /// Raise the admin flag for an identity. Returns `false` if unknown.
    pub fn set_admin_flag(&self, identity: &str) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "UPDATE participants SET is_admin = 1 WHERE identity = ?1",
            params![identity],
        )?;
        Ok(rows > 0)
    }

    /// Renumber active participants to 1..N, preserving their relative order.
    pub fn reindex_queue(&self) -> Result<(), DbError> {
        let order: Vec<String> = self
            .list_active_participants()?
            .into_iter()
            .map(|p| p.id)
            .collect();
        self.write_positions(&order)
    }

    /// Move a participant to the back of the queue and renumber everyone.
    /// Returns `false` when the participant is not active.
    pub fn move_to_back(&self, participant_id: &str) -> Result<bool, DbError> {
        let mut order: Vec<String> = self
            .list_active_participants()?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let Some(index) = order.iter().position(|id| id == participant_id) else {
            return Ok(false);
        };
        let moved = order.remove(index);
        order.push(moved);
        self.write_positions(&order)?;
        Ok(true)
    }

    fn write_positions(&self, ordered_ids: &[String]) -> Result<(), DbError> {
        let mut stmt = self
            .conn
            .prepare("UPDATE participants SET queue_position = ?1 WHERE id = ?2")?;
        for (index, id) in ordered_ids.iter().enumerate() {
            stmt.execute(params![index as i64 + 1, id])?;
        }
        Ok(())
    }

    pub(crate) fn map_participant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Participant> {
        Ok(Participant {
            id: row.get(0)?,
            identity: row.get(1)?,
            display_name: row.get(2)?,
            queue_position: row.get(3)?,
            is_active: row.get(4)?,
            is_admin: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_db;

    fn identities(db: &crate::db::RotationDb) -> Vec<String> {
        db.list_active_participants()
            .unwrap()
            .into_iter()
            .map(|p| p.identity)
            .collect()
    }

    fn positions(db: &crate::db::RotationDb) -> Vec<i64> {
        db.list_active_participants()
            .unwrap()
            .into_iter()
            .map(|p| p.queue_position)
            .collect()
    }

    #[test]
    fn test_new_participants_append_at_back() {
        let db = test_db();
        db.upsert_participant("U1", Some("One"), false).unwrap();
        db.upsert_participant("U2", Some("Two"), false).unwrap();
        db.upsert_participant("U3", Some("Three"), false).unwrap();

        assert_eq!(identities(&db), vec!["U1", "U2", "U3"]);
        assert_eq!(positions(&db), vec![1, 2, 3]);
    }

    #[test]
    fn test_upsert_is_idempotent_on_identity() {
        let db = test_db();
        let first = db.upsert_participant("U1", Some("One"), false).unwrap();
        db.upsert_participant("U2", Some("Two"), false).unwrap();
        let again = db.upsert_participant("U1", Some("Uno"), false).unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(again.display_name.as_deref(), Some("Uno"));
        assert_eq!(again.queue_position, 1);
        assert_eq!(db.list_active_participants().unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_never_lowers_admin_flag() {
        let db = test_db();
        db.upsert_participant("U1", None, true).unwrap();
        let again = db.upsert_participant("U1", None, false).unwrap();
        assert!(again.is_admin);
    }

    #[test]
    fn test_deactivate_and_reindex_close_gaps() {
        let db = test_db();
        db.upsert_participant("U1", None, false).unwrap();
        db.upsert_participant("U2", None, false).unwrap();
        db.upsert_participant("U3", None, false).unwrap();

        assert!(db.deactivate_participant("U2").unwrap());
        assert!(!db.deactivate_participant("U2").unwrap());
        assert!(!db.deactivate_participant("NOPE").unwrap());
        db.reindex_queue().unwrap();

        assert_eq!(identities(&db), vec!["U1", "U3"]);
        assert_eq!(positions(&db), vec![1, 2]);
    }

    #[test]
    fn test_reactivation_keeps_positions_dense() {
        let db = test_db();
        db.upsert_participant("U1", None, false).unwrap();
        db.upsert_participant("U2", None, false).unwrap();
        db.upsert_participant("U3", None, false).unwrap();
        db.deactivate_participant("U1").unwrap();
        db.reindex_queue().unwrap();

        // U1 rejoins at its old slot, not at the back.
        db.upsert_participant("U1", None, false).unwrap();
        assert_eq!(positions(&db), vec![1, 2, 3]);
        assert_eq!(identities(&db), vec!["U1", "U2", "U3"]);
    }

    #[test]
    fn test_move_to_back_rotates() {
        let db = test_db();
        let u1 = db.upsert_participant("U1", None, false).unwrap();
        db.upsert_participant("U2", None, false).unwrap();
        db.upsert_participant("U3", None, false).unwrap();

        assert!(db.move_to_back(&u1.id).unwrap());
        assert_eq!(identities(&db), vec!["U2", "U3", "U1"]);
        assert_eq!(positions(&db), vec![1, 2, 3]);
        assert!(!db.move_to_back("missing").unwrap());
    }

    #[test]
    fn test_list_admins_only_active() {
        let db = test_db();
        db.upsert_participant("U1", None, true).unwrap();
        db.upsert_participant("U2", None, true).unwrap();
        db.upsert_participant("U3", None, false).unwrap();
        db.deactivate_participant("U2").unwrap();

        let admins: Vec<String> = db
            .list_admins()
            .unwrap()
            .into_iter()
            .map(|p| p.identity)
            .collect();
        assert_eq!(admins, vec!["U1"]);
    }
}
