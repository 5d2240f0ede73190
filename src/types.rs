use serde::{Deserialize, Serialize};

/// Configuration stored in ~/.oncall-rotation/config.json
///
/// Every field is optional in the file. Environment variables can override
/// individual values (see `state::load_config`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Database location. Defaults to ~/.oncall-rotation/rotation.db
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<String>,
    /// Identities that are always treated as administrators.
    #[serde(default)]
    pub initial_admin_ids: Vec<String>,
    #[serde(default)]
    pub reminder: ReminderDefaults,
}

/// Reminder settings written to the settings store on first start.
/// Existing stored values always win.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderDefaults {
    #[serde(default)]
    pub channel: String,
    #[serde(default = "default_reminder_day")]
    pub day: String,
    #[serde(default = "default_reminder_time")]
    pub time: String,
    #[serde(default = "default_reminder_timezone")]
    pub timezone: String,
}

impl Default for ReminderDefaults {
    fn default() -> Self {
        Self {
            channel: String::new(),
            day: default_reminder_day(),
            time: default_reminder_time(),
            timezone: default_reminder_timezone(),
        }
    }
}

fn default_reminder_day() -> String {
    "Monday".to_string()
}

fn default_reminder_time() -> String {
    "09:00".to_string()
}

fn default_reminder_timezone() -> String {
    "America/New_York".to_string()
}

/// The identity performing an operation, with its admin standing resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub identity: String,
    pub is_admin: bool,
}

impl Actor {
    pub fn new(identity: impl Into<String>, is_admin: bool) -> Self {
        Self {
            identity: identity.into(),
            is_admin,
        }
    }
}
