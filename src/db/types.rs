//! Shared type definitions for the database layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::week::WeekKey;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Unrecognized enum label read back from a TEXT column.
#[derive(Debug, Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownLabel {
    kind: &'static str,
    value: String,
}

/// A row from the `participants` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    /// Stable external identity (chat user id).
    pub identity: String,
    pub display_name: Option<String>,
    pub queue_position: i64,
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: String,
}

/// A row from `assignment_records`: the auto layer's pick for one week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: String,
    pub participant_id: String,
    pub week: WeekKey,
    pub assigned_at: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionKind {
    Skip,
    Override,
    Swap,
}

impl ExceptionKind {
    /// String label for SQL storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::Skip => "skip",
            ExceptionKind::Override => "override",
            ExceptionKind::Swap => "swap",
        }
    }
}

impl FromStr for ExceptionKind {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(ExceptionKind::Skip),
            "override" => Ok(ExceptionKind::Override),
            "swap" => Ok(ExceptionKind::Swap),
            other => Err(UnknownLabel {
                kind: "exception kind",
                value: other.to_string(),
            }),
        }
    }
}

/// The exception kinds that name an explicit assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    Override,
    Swap,
}

impl OverrideKind {
    pub fn as_str(&self) -> &'static str {
        ExceptionKind::from(*self).as_str()
    }
}

impl From<OverrideKind> for ExceptionKind {
    fn from(kind: OverrideKind) -> Self {
        match kind {
            OverrideKind::Override => ExceptionKind::Override,
            OverrideKind::Swap => ExceptionKind::Swap,
        }
    }
}

impl FromStr for OverrideKind {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "override" => Ok(OverrideKind::Override),
            "swap" => Ok(OverrideKind::Swap),
            other => Err(UnknownLabel {
                kind: "override kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A row from the append-only `exception_entries` ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionEntry {
    pub id: String,
    /// Insertion order; higher is more recent.
    pub seq: i64,
    pub week: WeekKey,
    pub participant_id: String,
    pub kind: ExceptionKind,
    pub created_by: String,
    pub created_at: String,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStatus {
    Pending,
    Accepted,
    Declined,
}

impl SwapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "pending",
            SwapStatus::Accepted => "accepted",
            SwapStatus::Declined => "declined",
        }
    }
}

impl FromStr for SwapStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SwapStatus::Pending),
            "accepted" => Ok(SwapStatus::Accepted),
            "declined" => Ok(SwapStatus::Declined),
            other => Err(UnknownLabel {
                kind: "swap status",
                value: other.to_string(),
            }),
        }
    }
}

/// A row from `pending_swaps`.
///
/// `expires_at` is advisory: it is stored and reported, never enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSwap {
    pub id: String,
    pub week: WeekKey,
    pub requester_identity: String,
    pub target_identity: String,
    pub status: SwapStatus,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(UnknownLabel {
                kind: "approval status",
                value: other.to_string(),
            }),
        }
    }
}

/// Which approval slot a party fills on a back-to-back request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApproverRole {
    Target,
    Admin,
}

impl fmt::Display for ApproverRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApproverRole::Target => write!(f, "target user"),
            ApproverRole::Admin => write!(f, "admin"),
        }
    }
}

/// A row from `back_to_back_approvals`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackToBackApproval {
    pub id: String,
    pub week: WeekKey,
    pub participant_id: String,
    pub participant_identity: String,
    pub kind: OverrideKind,
    pub requested_by: String,
    pub status: ApprovalStatus,
    pub target_approved_by: Option<String>,
    pub admin_approved_by: Option<String>,
    /// Ledger details to write when the override is finally applied.
    pub details: Option<String>,
    /// Swap request that produced this approval, if any.
    pub swap_id: Option<String>,
    pub created_at: String,
    pub resolved_at: Option<String>,
}

impl BackToBackApproval {
    /// Both the target and an administrator have signed off.
    pub fn is_satisfied(&self) -> bool {
        self.target_approved_by.is_some() && self.admin_approved_by.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Approval slots that are still empty, target first.
    pub fn missing_roles(&self) -> Vec<ApproverRole> {
        let mut missing = Vec::new();
        if self.target_approved_by.is_none() {
            missing.push(ApproverRole::Target);
        }
        if self.admin_approved_by.is_none() {
            missing.push(ApproverRole::Admin);
        }
        missing
    }
}
