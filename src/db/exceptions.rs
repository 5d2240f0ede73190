use super::*;

impl RotationDb {
    // =========================================================================
    // Exception ledger (append-only)
    // =========================================================================

    /// Append an entry to the ledger.
    pub fn append_exception(
        &self,
        week: WeekKey,
        participant_id: &str,
        kind: ExceptionKind,
        created_by: &str,
        details: Option<&str>,
    ) -> Result<ExceptionEntry, DbError> {
        let id = new_id();
        let created_at = now_rfc3339();
        self.conn.execute(
            "INSERT INTO exception_entries
                (id, week_start, participant_id, kind, created_by, created_at, details)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, week, participant_id, kind.as_str(), created_by, created_at, details],
        )?;
        Ok(ExceptionEntry {
            id,
            seq: self.conn.last_insert_rowid(),
            week,
            participant_id: participant_id.to_string(),
            kind,
            created_by: created_by.to_string(),
            created_at,
            details: details.map(str::to_string),
        })
    }

    /// Whether any skip entry excludes the participant for the week.
    pub fn is_skipped(&self, week: WeekKey, participant_id: &str) -> Result<bool, DbError> {
        let exists = self
            .conn
            .prepare(
                "SELECT 1 FROM exception_entries
                 WHERE week_start = ?1 AND participant_id = ?2 AND kind = 'skip'
                 LIMIT 1",
            )?
            .exists(params![week, participant_id])?;
        Ok(exists)
    }

    /// Participant named by the most recent override or swap entry for the week.
    pub fn explicit_assignee_id(&self, week: WeekKey) -> Result<Option<String>, DbError> {
        let id = self
            .conn
            .query_row(
                "SELECT participant_id FROM exception_entries
                 WHERE week_start = ?1 AND kind IN ('override', 'swap')
                 ORDER BY seq DESC
                 LIMIT 1",
                params![week],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Every ledger entry for a week, most recent first.
    pub fn exceptions_for_week(&self, week: WeekKey) -> Result<Vec<ExceptionEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, seq, week_start, participant_id, kind, created_by, created_at, details
             FROM exception_entries
             WHERE week_start = ?1
             ORDER BY seq DESC",
        )?;
        let rows = stmt.query_map(params![week], |row| {
            Ok(ExceptionEntry {
                id: row.get(0)?,
                seq: row.get(1)?,
                week: row.get(2)?,
                participant_id: row.get(3)?,
                kind: label_column(row, 4)?,
                created_by: row.get(5)?,
                created_at: row.get(6)?,
                details: row.get(7)?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::test_utils::test_db;
    use crate::db::ExceptionKind;
    use crate::week::WeekKey;

    #[test]
    fn test_skip_presence_is_per_week_and_participant() {
        let db = test_db();
        let p1 = db.upsert_participant("U1", None, false).unwrap();
        let p2 = db.upsert_participant("U2", None, false).unwrap();
        let week = WeekKey::parse("2026-02-16").unwrap();

        db.append_exception(week, &p1.id, ExceptionKind::Skip, "U1", None)
            .unwrap();

        assert!(db.is_skipped(week, &p1.id).unwrap());
        assert!(!db.is_skipped(week, &p2.id).unwrap());
        assert!(!db.is_skipped(week.next(), &p1.id).unwrap());
    }

    #[test]
    fn test_latest_override_kind_wins() {
        let db = test_db();
        let p1 = db.upsert_participant("U1", None, false).unwrap();
        let p2 = db.upsert_participant("U2", None, false).unwrap();
        let week = WeekKey::parse("2026-02-16").unwrap();

        assert_eq!(db.explicit_assignee_id(week).unwrap(), None);

        db.append_exception(week, &p1.id, ExceptionKind::Override, "ADMIN", None)
            .unwrap();
        db.append_exception(week, &p2.id, ExceptionKind::Swap, "U2", None)
            .unwrap();
        assert_eq!(db.explicit_assignee_id(week).unwrap(), Some(p2.id.clone()));

        db.append_exception(week, &p1.id, ExceptionKind::Override, "ADMIN", None)
            .unwrap();
        assert_eq!(db.explicit_assignee_id(week).unwrap(), Some(p1.id));
    }

    #[test]
    fn test_skip_does_not_count_as_explicit() {
        let db = test_db();
        let p1 = db.upsert_participant("U1", None, false).unwrap();
        let week = WeekKey::parse("2026-02-16").unwrap();
        db.append_exception(week, &p1.id, ExceptionKind::Skip, "U1", None)
            .unwrap();
        assert_eq!(db.explicit_assignee_id(week).unwrap(), None);
    }

    #[test]
    fn test_entries_for_week_most_recent_first() {
        let db = test_db();
        let p1 = db.upsert_participant("U1", None, false).unwrap();
        let week = WeekKey::parse("2026-02-16").unwrap();
        let first = db
            .append_exception(week, &p1.id, ExceptionKind::Skip, "U1", None)
            .unwrap();
        let second = db
            .append_exception(week, &p1.id, ExceptionKind::Override, "ADMIN", Some("{}"))
            .unwrap();

        let entries = db.exceptions_for_week(week).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], second);
        assert_eq!(entries[1], first);
        assert!(second.seq > first.seq);
    }
}
