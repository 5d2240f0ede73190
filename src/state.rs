use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::db::RotationDb;
use crate::error::RotationError;
use crate::services::queue;
use crate::types::{Actor, Config};

/// Shared state for one rotation: configuration plus the database handle.
///
/// Operations take the connection lock for their whole duration, so calls
/// against one `AppState` never interleave.
pub struct AppState {
    pub config: Config,
    db: Mutex<RotationDb>,
}

impl AppState {
    /// Open the configured database, seed reminder defaults and bootstrap the
    /// initial administrators.
    pub fn open(config: Config) -> Result<Self, RotationError> {
        let db = match config.db_path.as_deref() {
            Some(path) => RotationDb::open_at(PathBuf::from(path))?,
            None => RotationDb::open()?,
        };
        Self::with_database(config, db)
    }

    /// Build state around an already-open database.
    pub fn with_database(config: Config, db: RotationDb) -> Result<Self, RotationError> {
        let seeded = crate::reminder::seed_defaults(&db, &config.reminder)?;
        if seeded > 0 {
            log::info!("Seeded {} reminder setting(s) from config", seeded);
        }
        let promoted = queue::bootstrap_admins(&db, &config.initial_admin_ids)?;
        if promoted > 0 {
            log::info!("Marked {} participant(s) as admin from config", promoted);
        }

        Ok(Self {
            config,
            db: Mutex::new(db),
        })
    }

    /// Run `f` with exclusive access to the database.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&RotationDb) -> Result<T, RotationError>,
    ) -> Result<T, RotationError> {
        let db = self.db.lock();
        f(&db)
    }

    pub fn initial_admins(&self) -> &[String] {
        &self.config.initial_admin_ids
    }

    /// Resolve an identity's admin standing.
    pub fn actor(&self, db: &RotationDb, identity: &str) -> Result<Actor, RotationError> {
        let is_admin = queue::is_admin(db, identity, self.initial_admins())?;
        Ok(Actor::new(identity, is_admin))
    }
}

/// Default config location: ~/.oncall-rotation/config.json
pub fn config_path() -> Result<PathBuf, RotationError> {
    let home = dirs::home_dir()
        .ok_or_else(|| RotationError::Configuration("Could not find home directory".to_string()))?;
    Ok(home.join(".oncall-rotation").join("config.json"))
}

/// Load config from the default location, falling back to defaults when the
/// file does not exist, then apply environment overrides.
pub fn load_config() -> Result<Config, RotationError> {
    let path = config_path()?;
    let mut config = if path.exists() {
        read_config_file(&path)?
    } else {
        log::debug!("No config at {}; using defaults", path.display());
        Config::default()
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Load config from an explicit file, then apply environment overrides.
/// Unlike [`load_config`] the file must exist.
pub fn load_config_from(path: &Path) -> Result<Config, RotationError> {
    let mut config = read_config_file(path)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config, RotationError> {
    let content = fs::read_to_string(path).map_err(|e| {
        RotationError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        RotationError::Configuration(format!("Failed to parse {}: {}", path.display(), e))
    })
}

/// Overlay `ONCALL_*` variables onto `config`. Blank values are ignored.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let var = |key: &str| {
        lookup(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(path) = var("ONCALL_DB_PATH") {
        config.db_path = Some(path);
    }
    if let Some(ids) = var("ONCALL_INITIAL_ADMIN_IDS") {
        config.initial_admin_ids = ids
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(channel) = var("ONCALL_REMINDER_CHANNEL") {
        config.reminder.channel = channel;
    }
    if let Some(day) = var("ONCALL_REMINDER_DAY") {
        config.reminder.day = day;
    }
    if let Some(time) = var("ONCALL_REMINDER_TIME") {
        config.reminder.time = time;
    }
    if let Some(timezone) = var("ONCALL_REMINDER_TIMEZONE") {
        config.reminder.timezone = timezone;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::reminder::{SETTING_CHANNEL, SETTING_DAY};

    #[test]
    fn test_env_overrides_replace_file_values() {
        let mut config = Config::default();
        let env: HashMap<&str, &str> = [
            ("ONCALL_DB_PATH", "/var/lib/oncall/rotation.db"),
            ("ONCALL_INITIAL_ADMIN_IDS", " U1, ,U2 "),
            ("ONCALL_REMINDER_DAY", "Friday"),
            ("ONCALL_REMINDER_TIME", "   "),
        ]
        .into_iter()
        .collect();

        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.db_path.as_deref(), Some("/var/lib/oncall/rotation.db"));
        assert_eq!(config.initial_admin_ids, vec!["U1", "U2"]);
        assert_eq!(config.reminder.day, "Friday");
        assert_eq!(config.reminder.time, "09:00");
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "initialAdminIds": ["ROOT"] }"#).unwrap();

        let config = read_config_file(&path).unwrap();
        assert_eq!(config.initial_admin_ids, vec!["ROOT"]);

        fs::write(&path, "not json").unwrap();
        let err = read_config_file(&path).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_open_seeds_settings_and_admins() {
        let db = RotationDb::open_in_memory().unwrap();
        db.upsert_participant("ROOT", None, false).unwrap();
        db.set_setting(SETTING_DAY, "Thursday").unwrap();

        let mut config = Config::default();
        config.initial_admin_ids = vec!["ROOT".to_string()];
        config.reminder.channel = "C42".to_string();
        let state = AppState::with_database(config, db).unwrap();

        state
            .with_db(|db| {
                assert_eq!(db.get_setting(SETTING_DAY)?.as_deref(), Some("Thursday"));
                assert_eq!(db.get_setting(SETTING_CHANNEL)?.as_deref(), Some("C42"));
                assert!(db.get_participant_by_identity("ROOT")?.unwrap().is_admin);
                assert!(state.actor(db, "ROOT")?.is_admin);
                assert!(!state.actor(db, "GUEST")?.is_admin);
                Ok(())
            })
            .unwrap();
    }
}
