use anyhow::{Context, Result};
use directories::ProjectDirs;
use pomosync_ipc::TimerType;
use ratatui::style::Color;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::{ChannelConfig, SESSION_TOPIC};
use crate::credential::{CookieSource, ACCESS_TOKEN_COOKIE};
use crate::settings::PhaseDurations;

pub const CONFIG_FILE: &str = "pomosync.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub durations: PhaseDurations,
    pub theme: Theme,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP base of the productivity service, e.g. `https://api.example.com`.
    pub base_url: String,
    pub ws_path: String,
    pub topic: String,
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub cookie_name: String,
    /// Cookie jar or raw `Cookie:` header exported from the browser.
    pub cookie_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Theme {
    #[serde(deserialize_with = "hex_to_color")]
    pub background: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub foreground: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub selection: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub work: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub short_break: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub long_break: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub warning: Color,
    #[serde(deserialize_with = "hex_to_color")]
    pub gray: Color,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            ws_path: "/api/v1/auth/ws/websocket".to_string(),
            topic: SESSION_TOPIC.to_string(),
            reconnect_delay_secs: 5,
        }
    }
}

impl ServerConfig {
    /// WebSocket URL derived from the HTTP base.
    pub fn ws_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        if self.ws_path.starts_with('/') {
            format!("{base}{}", self.ws_path)
        } else {
            format!("{base}/{}", self.ws_path)
        }
    }

    pub fn channel_config(&self) -> ChannelConfig {
        ChannelConfig {
            url: self.ws_url(),
            topic: self.topic.clone(),
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs.max(1)),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            cookie_name: ACCESS_TOKEN_COOKIE.to_string(),
            cookie_file: None,
        }
    }
}

impl AuthConfig {
    /// `POMOSYNC_COOKIE` takes precedence over the cookie file.
    pub fn cookie_source(&self) -> CookieSource {
        let source = CookieSource::new(&self.cookie_name);
        let source = match &self.cookie_file {
            Some(path) => source.with_file(path),
            None => source,
        };
        source.with_env()
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: Color::Rgb(9, 14, 19),
            foreground: Color::Rgb(197, 201, 199),
            selection: Color::Rgb(230, 195, 132),
            work: Color::Rgb(228, 104, 118),
            short_break: Color::Rgb(127, 180, 202),
            long_break: Color::Rgb(138, 154, 123),
            warning: Color::Rgb(196, 178, 138),
            gray: Color::Rgb(164, 167, 164),
        }
    }
}

impl Theme {
    pub fn phase(&self, timer_type: TimerType) -> Color {
        match timer_type {
            TimerType::Work => self.work,
            TimerType::ShortBreak => self.short_break,
            TimerType::LongBreak => self.long_break,
        }
    }
}

fn hex_to_color<'de, D>(deserializer: D) -> Result<Color, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = serde::Deserialize::deserialize(deserializer)?;
    if !s.is_ascii() || !s.starts_with('#') || s.len() != 7 {
        return Err(serde::de::Error::custom("invalid hex color format"));
    }
    let r = u8::from_str_radix(&s[1..3], 16).map_err(serde::de::Error::custom)?;
    let g = u8::from_str_radix(&s[3..5], 16).map_err(serde::de::Error::custom)?;
    let b = u8::from_str_radix(&s[5..7], 16).map_err(serde::de::Error::custom)?;
    Ok(Color::Rgb(r, g, b))
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "pomosync", "pomosync")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

/// Load `path`, or the per-user config file. A missing file means defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => return Ok(Config::default()),
        },
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read config file at {:?}", path))?;
    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file at {:?}", path))
}
