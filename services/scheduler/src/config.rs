//! Scheduler configuration (env-driven).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use upsched_schedule::{EngineSettings, ScheduleKeys};

use crate::worker::WorkerConfig;

/// Floor for the error backoff, so a broken schedule is never retried every tick.
const MIN_BACKOFF_MS: u64 = 1000;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON state file holding resources and config objects.
    pub state_file: PathBuf,

    /// Address for the metrics and health endpoints.
    pub listen_addr: SocketAddr,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Installation name quoted in announcements.
    pub installation: String,

    /// Contact quoted in out-of-hours announcements.
    pub out_of_hours_contact: String,

    pub worker: WorkerConfig,

    pub keys: ScheduleKeys,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let state_file = lookup("UPSCHED_STATE_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("upgrade-schedule-state.json"));

        let listen_addr = lookup("UPSCHED_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:9464".to_string())
            .parse::<SocketAddr>()
            .context("UPSCHED_LISTEN_ADDR must be a socket address (host:port).")?;

        let log_level = lookup("UPSCHED_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let installation = lookup("UPSCHED_INSTALLATION").unwrap_or_else(|| "local".to_string());

        let out_of_hours_contact =
            lookup("UPSCHED_OUT_OF_HOURS_CONTACT").unwrap_or_else(|| "the on-call channel".to_string());

        let tick_interval_ms = parse_var::<u64>(&lookup, "UPSCHED_TICK_INTERVAL_MS")
            .context("UPSCHED_TICK_INTERVAL_MS must be an integer (milliseconds).")?
            .unwrap_or(1000);

        let resync_interval_secs = parse_var::<u64>(&lookup, "UPSCHED_RESYNC_INTERVAL_SECS")
            .context("UPSCHED_RESYNC_INTERVAL_SECS must be an integer (seconds).")?
            .unwrap_or(30);

        let backoff_min_ms = parse_var::<u64>(&lookup, "UPSCHED_BACKOFF_MIN_MS")
            .context("UPSCHED_BACKOFF_MIN_MS must be an integer (milliseconds).")?
            .unwrap_or(5000);

        let backoff_max_secs = parse_var::<u64>(&lookup, "UPSCHED_BACKOFF_MAX_SECS")
            .context("UPSCHED_BACKOFF_MAX_SECS must be an integer (seconds).")?
            .unwrap_or(300);

        let backoff_min = Duration::from_millis(backoff_min_ms.max(MIN_BACKOFF_MS));
        let worker = WorkerConfig {
            tick_interval: Duration::from_millis(tick_interval_ms.max(50)),
            resync_interval: Duration::from_secs(resync_interval_secs.max(1)),
            backoff_min,
            backoff_max: Duration::from_secs(backoff_max_secs).max(backoff_min),
        };

        let defaults = ScheduleKeys::default();
        let keys = ScheduleKeys {
            target_release: lookup("UPSCHED_KEY_TARGET_RELEASE").unwrap_or(defaults.target_release),
            target_time: lookup("UPSCHED_KEY_TARGET_TIME").unwrap_or(defaults.target_time),
            announcement: lookup("UPSCHED_KEY_ANNOUNCEMENT").unwrap_or(defaults.announcement),
            release_label: lookup("UPSCHED_KEY_RELEASE_LABEL").unwrap_or(defaults.release_label),
            version_source: lookup("UPSCHED_KEY_VERSION_SOURCE").unwrap_or(defaults.version_source),
        };

        Ok(Self {
            state_file,
            listen_addr,
            log_level,
            installation,
            out_of_hours_contact,
            worker,
            keys,
        })
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            keys: self.keys.clone(),
            installation: self.installation.clone(),
            out_of_hours_contact: self.out_of_hours_contact.clone(),
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>, T::Err> {
    lookup(name).map(|v| v.parse()).transpose()
}
