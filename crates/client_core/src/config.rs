use std::{collections::HashMap, fs, path::Path, time::Duration};

use tracing::warn;

pub const DEFAULT_SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub server_url: String,
    pub max_message_chars: usize,
    pub typing_idle_timeout: Duration,
    pub typing_expiry_tolerance: Duration,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub reconnect_delay_max: Duration,
    pub tick_interval: Duration,
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8443".into(),
            max_message_chars: 2000,
            typing_idle_timeout: Duration::from_secs(2),
            typing_expiry_tolerance: Duration::from_millis(500),
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            reconnect_delay_max: Duration::from_secs(30),
            tick_interval: Duration::from_millis(250),
            event_buffer: 1024,
        }
    }
}

impl ClientSettings {
    /// Window after which a remote typist with no refresh is dropped.
    pub fn remote_typing_window(&self) -> Duration {
        self.typing_idle_timeout + self.typing_expiry_tolerance
    }

    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(1u32 << shift)
            .min(self.reconnect_delay_max)
    }
}

pub fn load_settings() -> ClientSettings {
    load_settings_from(Path::new(DEFAULT_SETTINGS_FILE), |key| std::env::var(key).ok())
}

pub(crate) fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> ClientSettings {
    let mut settings = ClientSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<HashMap<String, toml::Value>>(&raw) {
            Ok(file_cfg) => {
                for (key, value) in file_cfg {
                    let value = match value {
                        toml::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    apply_setting(&mut settings, &key, &value);
                }
            }
            Err(err) => warn!(path = %path.display(), "config: ignoring malformed settings file: {err}"),
        }
    }

    for key in [
        "server_url",
        "max_message_chars",
        "typing_idle_timeout_ms",
        "typing_expiry_tolerance_ms",
        "reconnect_attempts",
        "reconnect_delay_ms",
        "reconnect_delay_max_ms",
        "tick_interval_ms",
        "event_buffer",
    ] {
        if let Some(v) = env(&format!("APP__{}", key.to_ascii_uppercase())) {
            apply_setting(&mut settings, key, &v);
        }
    }

    settings
}

fn apply_setting(settings: &mut ClientSettings, key: &str, value: &str) {
    let value = value.trim();
    match key {
        "server_url" => settings.server_url = value.trim_end_matches('/').to_string(),
        "max_message_chars" => set_parsed(key, value, &mut settings.max_message_chars),
        "reconnect_attempts" => set_parsed(key, value, &mut settings.reconnect_attempts),
        "event_buffer" => set_parsed(key, value, &mut settings.event_buffer),
        "typing_idle_timeout_ms" => {
            set_nonzero_millis(key, value, &mut settings.typing_idle_timeout)
        }
        "typing_expiry_tolerance_ms" => {
            set_millis(key, value, &mut settings.typing_expiry_tolerance)
        }
        "reconnect_delay_ms" => set_millis(key, value, &mut settings.reconnect_delay),
        "reconnect_delay_max_ms" => set_millis(key, value, &mut settings.reconnect_delay_max),
        "tick_interval_ms" => set_nonzero_millis(key, value, &mut settings.tick_interval),
        _ => warn!(key, "config: ignoring unknown setting"),
    }
}

fn set_parsed<T: std::str::FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.parse::<T>() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "config: ignoring unparseable value"),
    }
}

fn set_millis(key: &str, value: &str, slot: &mut Duration) {
    match value.parse::<u64>() {
        Ok(ms) => *slot = Duration::from_millis(ms),
        Err(_) => warn!(key, value, "config: ignoring unparseable duration"),
    }
}

fn set_nonzero_millis(key: &str, value: &str, slot: &mut Duration) {
    match value.parse::<u64>() {
        Ok(0) => warn!(key, "config: ignoring zero duration"),
        Ok(ms) => *slot = Duration::from_millis(ms),
        Err(_) => warn!(key, value, "config: ignoring unparseable duration"),
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
