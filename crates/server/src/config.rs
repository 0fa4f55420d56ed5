use std::{fs, path::Path, str::FromStr, time::Duration};

use presenter_core::PresenterConfig;
use tracing::warn;

pub const CONFIG_FILE: &str = "presenter.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    /// Address advertised through `/server-info`; detected when unset.
    pub public_host: Option<String>,
    pub scripture_db: String,
    pub default_chapter_count: u32,
    pub tick_interval_ms: u64,
    pub queue_capacity: usize,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4000".into(),
            public_host: None,
            scripture_db: "sqlite://./data/bibles.db".into(),
            default_chapter_count: 150,
            tick_interval_ms: 1000,
            queue_capacity: 64,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    fn set(&mut self, key: &str, value: &str) {
        match key {
            "bind_addr" => self.bind_addr = value.to_string(),
            "public_host" => {
                self.public_host = Some(value.trim().to_string()).filter(|host| !host.is_empty())
            }
            "scripture_db" => self.scripture_db = value.to_string(),
            "default_chapter_count" => parse_into(key, value, &mut self.default_chapter_count),
            "tick_interval_ms" => parse_into(key, value, &mut self.tick_interval_ms),
            "queue_capacity" => parse_into(key, value, &mut self.queue_capacity),
            "log_filter" => self.log_filter = value.to_string(),
            _ => {}
        }
    }

    pub fn presenter_config(&self) -> PresenterConfig {
        PresenterConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            queue_capacity: self.queue_capacity.max(1),
            default_chapter_count: self.default_chapter_count,
        }
    }
}

fn parse_into<T: FromStr>(key: &str, value: &str, slot: &mut T) {
    match value.trim().parse() {
        Ok(parsed) => *slot = parsed,
        Err(_) => warn!(key, value, "ignoring unparseable setting"),
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), std::env::vars())
}

/// Defaults, then the flat `key = value` file, then environment. `APP__*`
/// variables win over the short legacy names.
pub fn load_settings_from(
    path: &Path,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match raw.parse::<toml::Table>() {
            Ok(table) => {
                for (key, value) in table {
                    let value = match value {
                        toml::Value::String(text) => text,
                        other => other.to_string(),
                    };
                    settings.set(&key, &value);
                }
            }
            Err(error) => warn!(path = %path.display(), %error, "ignoring malformed config file"),
        }
    }

    let vars: Vec<(String, String)> = vars.into_iter().collect();
    for (name, value) in &vars {
        match name.as_str() {
            "SERVER_BIND" => settings.set("bind_addr", value),
            "SCRIPTURE_DB" => settings.set("scripture_db", value),
            _ => {}
        }
    }
    for (name, value) in &vars {
        if let Some(key) = name.strip_prefix("APP__") {
            settings.set(&key.to_ascii_lowercase(), value);
        }
    }

    settings
}

/// Turns a plain path or loose sqlite URL into one sqlx accepts. Windows
/// drive paths keep the single-colon `sqlite:C:/..` form.
pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().scripture_db;
    }
    if raw_database_url.starts_with("sqlite::memory:") {
        return raw_database_url.to_string();
    }
    if let Some(path) = raw_database_url.strip_prefix("sqlite://") {
        if is_windows_drive_path(path) {
            return format!("sqlite:{path}");
        }
        return raw_database_url.to_string();
    }
    if raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    let path = raw_database_url
        .strip_prefix("sqlite:")
        .unwrap_or(raw_database_url)
        .replace('\\', "/");
    if is_windows_drive_path(&path) {
        format!("sqlite:{path}")
    } else {
        format!("sqlite://{path}")
    }
}

fn is_windows_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && matches!(bytes[2], b'/' | b'\\')
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
