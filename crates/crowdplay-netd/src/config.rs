//! Server configuration.
//!
//! A JSON document read once at startup. Unknown keys are ignored so older
//! and newer config files keep working; every recognized key has a default.
//! Durations accept either a bare number of seconds or a `"5s"` / `"250ms"`
//! style string.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub server_config: ServerSettings,
    /// Opaque per-core settings, handed to cores through `GET_VARIABLE`.
    /// Keyed by the name each core reports in its system info.
    pub core_config: HashMap<String, HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerSettings {
    /// How often every viewer gets a full key frame.
    #[serde(with = "duration_value")]
    pub sync_interval: Duration,

    /// Maximum chat message length, measured after escape expansion.
    pub max_message_size: usize,

    pub max_username_length: usize,
    pub min_username_length: usize,

    /// Maximum exclusive input duration per turn.
    #[serde(with = "duration_value")]
    pub turn_length: Duration,

    /// Silence threshold before a connection is forcibly closed.
    #[serde(with = "duration_value")]
    pub heartbeat_timeout: Duration,

    /// When set, pace every emulator at `framerate` instead of the
    /// core-reported timing.
    pub override_framerate: bool,
    pub framerate: u32,

    /// Directories handed to cores via the environment callback.
    pub system_directory: String,
    pub save_directory: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(5),
            max_message_size: 100,
            max_username_length: 15,
            min_username_length: 3,
            turn_length: Duration::from_secs(10),
            heartbeat_timeout: Duration::from_secs(3),
            override_framerate: false,
            framerate: 60,
            system_directory: "~/.crowdplay/system".to_string(),
            save_directory: "~/.crowdplay/save".to_string(),
        }
    }
}

impl Config {
    /// Read a config file. A missing file is not an error: defaults apply.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Stringified settings for one core, ready to back `GET_VARIABLE`.
    pub fn core_variables(&self, core_name: &str) -> HashMap<String, String> {
        let Some(settings) = self.core_config.get(core_name) else {
            return HashMap::new();
        };
        settings
            .iter()
            .map(|(key, value)| {
                let text = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), text)
            })
            .collect()
    }
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return format!("{home}/{rest}");
    }
    path.to_string()
}

mod duration_value {
    use std::time::Duration;

    use serde::de::{Deserializer, Error, Unexpected};
    use serde::Deserialize;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) if secs >= 0.0 => Ok(Duration::from_secs_f64(secs)),
            Raw::Seconds(secs) => Err(Error::invalid_value(
                Unexpected::Float(secs),
                &"a non-negative duration",
            )),
            Raw::Text(text) => parse(&text)
                .ok_or_else(|| Error::invalid_value(Unexpected::Str(&text), &"a duration like \"5s\"")),
        }
    }

    fn parse(text: &str) -> Option<Duration> {
        let text = text.trim();
        if let Some(ms) = text.strip_suffix("ms") {
            return Some(Duration::from_millis(ms.trim().parse().ok()?));
        }
        if let Some(secs) = text.strip_suffix('s') {
            return Some(Duration::from_secs_f64(secs.trim().parse().ok()?));
        }
        if let Some(mins) = text.strip_suffix('m') {
            return Some(Duration::from_secs(mins.trim().parse::<u64>().ok()? * 60));
        }
        Some(Duration::from_secs_f64(text.parse().ok()?))
    }

}
