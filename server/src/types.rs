//! Wire types for the OmeroFS monitor server.
//!
//! Request and response bodies of the HTTP control API, plus the payload
//! POSTed to remote watchers. Engine types (`FileEvent`, `MonitorState`, ...)
//! are reused as-is so the JSON shape matches what the monitor crate logs.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use omerofs_monitor::config::Config as EngineConfig;
use omerofs_monitor::types::{
    EventType, FileEvent, MonitorId, MonitorKind, MonitorState, PathMode, WatchSpec,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /monitors`.
///
/// Only `kind`, `path` and `callback_url` are required; every other field
/// falls back to the [`WatchSpec`] defaults or the engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMonitorRequest {
    /// Monitor type tag (`persistent`, `one_shot`, `inactivity`).
    pub kind: String,
    /// Root directory to watch.
    pub path: PathBuf,
    /// URL notifications are POSTed to.
    pub callback_url: String,
    #[serde(default)]
    pub event_types: Option<Vec<EventType>>,
    #[serde(default)]
    pub path_mode: PathMode,
    #[serde(default)]
    pub whitelist: Vec<String>,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub ignore_sys_files: bool,
    #[serde(default)]
    pub ignore_dir_events: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub block_size: Option<usize>,
}

impl CreateMonitorRequest {
    /// Builds the watch spec, filling gaps from `defaults`.
    #[must_use]
    pub fn to_spec(&self, defaults: &EngineConfig) -> WatchSpec {
        let mut spec = WatchSpec::new(&self.path)
            .with_path_mode(self.path_mode)
            .with_whitelist(self.whitelist.iter().cloned())
            .with_blacklist(self.blacklist.iter().cloned())
            .ignore_sys_files(self.ignore_sys_files)
            .ignore_dir_events(self.ignore_dir_events)
            .with_timeout(
                self.timeout_ms
                    .map_or(defaults.default_timeout, Duration::from_millis),
            )
            .with_block_size(self.block_size.unwrap_or(defaults.default_block_size));

        if let Some(types) = &self.event_types {
            spec = spec.with_event_types(types.iter().copied());
        }
        spec
    }
}

/// Response of `POST /monitors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMonitorResponse {
    pub monitor_id: MonitorId,
}

/// One registered monitor, as listed by `GET /monitors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSummary {
    pub monitor_id: MonitorId,
    pub kind: MonitorKind,
    pub state: MonitorState,
    pub path: PathBuf,
    /// Where notifications are delivered.
    pub target: String,
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /monitors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorListResponse {
    pub monitors: Vec<MonitorSummary>,
}

/// Query of `GET /monitors/{id}/directory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryQuery {
    /// Directory relative to the monitor root; empty means the root.
    #[serde(default)]
    pub path: Option<String>,
    /// Glob pattern matched against entry names.
    #[serde(default)]
    pub filter: Option<String>,
}

/// Response of `GET /monitors/{id}/directory`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryResponse {
    pub entries: Vec<String>,
}

/// Query of `GET /monitors/{id}/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsQuery {
    /// File id, absolute or relative to the monitor root.
    pub file: String,
}

/// Metadata of one file under a monitor root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStats {
    pub base_name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
    /// Not every file system records a creation time.
    pub created: Option<DateTime<Utc>>,
    pub is_dir: bool,
    pub readable: bool,
    pub writable: bool,
}

/// JSON body POSTed to a remote watcher for every notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackPayload {
    pub monitor_id: MonitorId,
    pub events: Vec<FileEvent>,
    pub sent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_request_uses_defaults() {
        let json = r#"{
            "kind": "persistent",
            "path": "/data/incoming",
            "callback_url": "http://localhost:9000/hook"
        }"#;
        let request: CreateMonitorRequest = serde_json::from_str(json).unwrap();
        let defaults = EngineConfig::default();
        let spec = request.to_spec(&defaults);

        assert_eq!(spec, WatchSpec::new("/data/incoming")
            .with_timeout(defaults.default_timeout)
            .with_block_size(defaults.default_block_size));
    }

    #[test]
    fn full_request_maps_every_field() {
        let json = r#"{
            "kind": "one_shot",
            "path": "/data",
            "callback_url": "http://localhost:9000/hook",
            "event_types": ["create"],
            "path_mode": "follow",
            "whitelist": [".jpg"],
            "blacklist": ["tmp"],
            "ignore_sys_files": true,
            "ignore_dir_events": true,
            "timeout_ms": 2000,
            "block_size": 3
        }"#;
        let request: CreateMonitorRequest = serde_json::from_str(json).unwrap();
        let spec = request.to_spec(&EngineConfig::default());

        assert_eq!(spec.event_types.len(), 1);
        assert!(spec.event_types.contains(&EventType::Create));
        assert_eq!(spec.path_mode, PathMode::Follow);
        assert_eq!(spec.whitelist, vec![".jpg"]);
        assert_eq!(spec.blacklist, vec!["tmp"]);
        assert!(spec.ignore_sys_files);
        assert!(spec.ignore_dir_events);
        assert_eq!(spec.timeout, Duration::from_secs(2));
        assert_eq!(spec.block_size, 3);
    }

    #[test]
    fn callback_payload_shape() {
        let payload = CallbackPayload {
            monitor_id: MonitorId::from("m2"),
            events: vec![FileEvent::system("Timed out")],
            sent_at: Utc::now(),
        };
        let value = serde_json::to_value(&payload).unwrap();

        assert_eq!(value["monitor_id"], "m2");
        assert_eq!(value["events"][0]["file_id"], "Timed out");
        assert_eq!(value["events"][0]["event_type"], "system");
        assert!(value["sent_at"].is_string());
    }
}
