//! Environment-driven configuration for the synchronizer.

use std::{env, path::PathBuf, time::Duration};

use tracing::{info, warn};

use crate::state::DEFAULT_POLL_INTERVAL;

/// Environment variable naming the room to join.
const ROOM_ENV: &str = "BUZZROOM_ROOM";
/// Environment variable carrying the Supabase project base URL.
const SUPABASE_URL_ENV: &str = "BUZZROOM_SUPABASE_URL";
/// Environment variable carrying the Supabase anonymous API key.
const SUPABASE_KEY_ENV: &str = "BUZZROOM_SUPABASE_KEY";
/// Environment variable overriding [`DEFAULT_SNAPSHOT_PATH`].
const SNAPSHOT_PATH_ENV: &str = "BUZZROOM_SNAPSHOT_PATH";
/// Environment variable overriding the remote polling cadence, in milliseconds.
const POLL_INTERVAL_ENV: &str = "BUZZROOM_POLL_INTERVAL_MS";

/// Default room joined when none is configured.
const DEFAULT_ROOM: &str = "default";
/// Default location of the local snapshot file.
const DEFAULT_SNAPSHOT_PATH: &str = "data/buzzroom-state.json";

/// Immutable runtime configuration for one store.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Room code namespacing the remote rows.
    pub room: String,
    /// Supabase project base URL; `None` runs local-only.
    pub supabase_url: Option<String>,
    /// Supabase anonymous API key; `None` runs local-only.
    pub supabase_key: Option<String>,
    /// Path of the device-local snapshot file.
    pub snapshot_path: PathBuf,
    /// Remote polling cadence.
    pub poll_interval: Duration,
}

impl SyncConfig {
    /// Load the configuration from the environment, falling back to local-only
    /// defaults for everything absent.
    pub fn from_env() -> Self {
        let room = non_empty_var(ROOM_ENV).unwrap_or_else(|| DEFAULT_ROOM.to_string());
        let supabase_url = non_empty_var(SUPABASE_URL_ENV);
        let supabase_key = non_empty_var(SUPABASE_KEY_ENV);
        if supabase_url.is_some() != supabase_key.is_some() {
            warn!(
                "only one of {SUPABASE_URL_ENV} and {SUPABASE_KEY_ENV} is set; running local-only"
            );
        }

        let snapshot_path = non_empty_var(SNAPSHOT_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH));

        let poll_interval = match non_empty_var(POLL_INTERVAL_ENV) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(millis) if millis > 0 => Duration::from_millis(millis),
                _ => {
                    warn!(value = %raw, "invalid {POLL_INTERVAL_ENV}; using the default cadence");
                    DEFAULT_POLL_INTERVAL
                }
            },
            None => DEFAULT_POLL_INTERVAL,
        };

        let config = Self {
            room,
            supabase_url,
            supabase_key,
            snapshot_path,
            poll_interval,
        };
        info!(
            room = %config.room,
            remote = config.remote_configured(),
            snapshot = %config.snapshot_path.display(),
            "loaded sync configuration"
        );
        config
    }

    /// Whether both remote credentials are present.
    pub fn remote_configured(&self) -> bool {
        self.supabase_url.is_some() && self.supabase_key.is_some()
    }
}

/// Read an environment variable, treating empty values as absent.
fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}
