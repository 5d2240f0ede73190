use super::*;

/// Advisory lifetime of a swap request.
pub const SWAP_EXPIRY_HOURS: i64 = 24;

const SWAP_COLUMNS: &str =
    "id, week_start, requester_identity, target_identity, status, expires_at, created_at";

impl RotationDb {
    // =========================================================================
    // Pending swaps
    // =========================================================================

    pub fn insert_swap(
        &self,
        week: WeekKey,
        requester_identity: &str,
        target_identity: &str,
    ) -> Result<PendingSwap, DbError> {
        let now = Utc::now();
        let swap = PendingSwap {
            id: new_id(),
            week,
            requester_identity: requester_identity.to_string(),
            target_identity: target_identity.to_string(),
            status: SwapStatus::Pending,
            expires_at: (now + chrono::Duration::hours(SWAP_EXPIRY_HOURS)).to_rfc3339(),
            created_at: now.to_rfc3339(),
        };
        self.conn.execute(
            "INSERT INTO pending_swaps
                (id, week_start, requester_identity, target_identity, status, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                swap.id,
                swap.week,
                swap.requester_identity,
                swap.target_identity,
                swap.status.as_str(),
                swap.expires_at,
                swap.created_at,
            ],
        )?;
        Ok(swap)
    }

    /// Most recent still-pending swap for the (week, requester, target) triple.
    pub fn find_pending_swap(
        &self,
        week: WeekKey,
        requester_identity: &str,
        target_identity: &str,
    ) -> Result<Option<PendingSwap>, DbError> {
        let sql = format!(
            "SELECT {SWAP_COLUMNS} FROM pending_swaps
             WHERE week_start = ?1 AND requester_identity = ?2 AND target_identity = ?3
               AND status = 'pending'
             ORDER BY seq DESC
             LIMIT 1"
        );
        let swap = self
            .conn
            .query_row(
                &sql,
                params![week, requester_identity, target_identity],
                Self::map_swap_row,
            )
            .optional()?;
        Ok(swap)
    }

    pub fn get_swap(&self, id: &str) -> Result<Option<PendingSwap>, DbError> {
        let sql = format!("SELECT {SWAP_COLUMNS} FROM pending_swaps WHERE id = ?1");
        let swap = self
            .conn
            .query_row(&sql, params![id], Self::map_swap_row)
            .optional()?;
        Ok(swap)
    }

    /// Move a pending swap to a terminal status. Returns `false` when the swap
    /// is unknown or no longer pending.
    pub fn resolve_swap(&self, id: &str, status: SwapStatus) -> Result<bool, DbError> {
        let rows = self.conn.execute(
            "UPDATE pending_swaps SET status = ?1 WHERE id = ?2 AND status = 'pending'",
            params![status.as_str(), id],
        )?;
        Ok(rows > 0)
    }

    fn map_swap_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PendingSwap> {
        Ok(PendingSwap {
            id: row.get(0)?,
            week: row.get(1)?,
            requester_identity: row.get(2)?,
            target_identity: row.get(3)?,
            status: label_column(row, 4)?,
            expires_at: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use crate::db::test_utils::test_db;
    use crate::db::SwapStatus;
    use crate::week::WeekKey;

    #[test]
    fn test_swap_lifecycle() {
        let db = test_db();
        let week = WeekKey::parse("2026-02-23").unwrap();
        let swap = db.insert_swap(week, "U1", "U2").unwrap();

        let pending = db.find_pending_swap(week, "U1", "U2").unwrap().expect("pending");
        assert_eq!(pending.id, swap.id);
        assert_eq!(pending.status, SwapStatus::Pending);

        assert!(db.resolve_swap(&swap.id, SwapStatus::Accepted).unwrap());
        assert!(db.find_pending_swap(week, "U1", "U2").unwrap().is_none());
        assert!(!db.resolve_swap(&swap.id, SwapStatus::Declined).unwrap());
        assert_eq!(db.get_swap(&swap.id).unwrap().unwrap().status, SwapStatus::Accepted);
    }

    #[test]
    fn test_lookup_matches_exact_triple() {
        let db = test_db();
        let week = WeekKey::parse("2026-02-23").unwrap();
        db.insert_swap(week, "U1", "U2").unwrap();

        assert!(db.find_pending_swap(week, "U2", "U1").unwrap().is_none());
        assert!(db.find_pending_swap(week.next(), "U1", "U2").unwrap().is_none());
    }

    #[test]
    fn test_latest_pending_swap_supersedes_earlier() {
        let db = test_db();
        let week = WeekKey::parse("2026-02-23").unwrap();
        db.insert_swap(week, "U1", "U2").unwrap();
        let newer = db.insert_swap(week, "U1", "U2").unwrap();

        let found = db.find_pending_swap(week, "U1", "U2").unwrap().unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[test]
    fn test_expiry_is_a_day_after_creation() {
        let db = test_db();
        let week = WeekKey::parse("2026-02-23").unwrap();
        let swap = db.insert_swap(week, "U1", "U2").unwrap();

        let created = DateTime::parse_from_rfc3339(&swap.created_at).unwrap();
        let expires = DateTime::parse_from_rfc3339(&swap.expires_at).unwrap();
        assert_eq!((expires - created).num_hours(), 24);
    }
}
