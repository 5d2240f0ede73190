use super::*;

impl RotationDb {
    // =========================================================================
    // Assignment records (auto layer, one row per week)
    // =========================================================================

    pub fn get_assignment(&self, week: WeekKey) -> Result<Option<AssignmentRecord>, DbError> {
        let record = self
            .conn
            .query_row(
                "SELECT id, participant_id, week_start, assigned_at, source
                 FROM assignment_records WHERE week_start = ?1",
                params![week],
                |row| {
                    Ok(AssignmentRecord {
                        id: row.get(0)?,
                        participant_id: row.get(1)?,
                        week: row.get(2)?,
                        assigned_at: row.get(3)?,
                        source: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Persist the auto-selected participant for a week.
    ///
    /// Fails with a constraint violation if the week already has a record.
    pub fn insert_assignment(
        &self,
        week: WeekKey,
        participant_id: &str,
    ) -> Result<AssignmentRecord, DbError> {
        let record = AssignmentRecord {
            id: new_id(),
            participant_id: participant_id.to_string(),
            week,
            assigned_at: now_rfc3339(),
            source: "auto".to_string(),
        };
        self.conn.execute(
            "INSERT INTO assignment_records (id, participant_id, week_start, assigned_at, source)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.participant_id,
                record.week,
                record.assigned_at,
                record.source,
            ],
        )?;
        Ok(record)
    }

    /// Drop the week's record so the next resolution recomputes it.
    /// Returns `true` if a record existed.
    pub fn delete_assignment(&self, week: WeekKey) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "DELETE FROM assignment_records WHERE week_start = ?1",
            params![week],
        )?;
        Ok(rows > 0)
    }
}
