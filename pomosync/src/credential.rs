//! Bearer token lookup.
//!
//! The token lives in the `productivity_access_token` cookie. We accept a
//! `Cookie:` header style string (`a=1; b=2`) or a Netscape `cookies.txt`
//! export, either from a file or the `POMOSYNC_COOKIE` variable.

use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub const ACCESS_TOKEN_COOKIE: &str = "productivity_access_token";
pub const COOKIE_ENV: &str = "POMOSYNC_COOKIE";

/// Find `name` in cookie text.
pub fn cookie_value(cookies: &str, name: &str) -> Option<String> {
    for line in cookies.lines() {
        let line = line.trim();
        if line.is_empty() || (line.starts_with('#') && !line.starts_with("#HttpOnly_")) {
            continue;
        }

        // cookies.txt: domain, flag, path, secure, expiry, name, value
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() == 7 {
            if fields[5] == name && !fields[6].is_empty() {
                return Some(fields[6].to_string());
            }
            continue;
        }

        for pair in line.split(';') {
            if let Some((key, value)) = pair.trim().split_once('=') {
                if key.trim() == name && !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }
    None
}

/// Where the channel reads the bearer token from at connect time.
#[derive(Debug, Clone)]
pub struct CookieSource {
    name: String,
    inline: Option<String>,
    file: Option<PathBuf>,
}

impl CookieSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inline: None,
            file: None,
        }
    }

    /// Use a literal cookie string.
    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.inline = Some(cookies.into());
        self
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Honour `POMOSYNC_COOKIE` when set.
    pub fn with_env(self) -> Self {
        match std::env::var(COOKIE_ENV) {
            Ok(cookies) if !cookies.trim().is_empty() => self.with_cookies(cookies),
            _ => self,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current token, if any. Reads the cookie file on every call.
    pub fn token(&self) -> Option<String> {
        if let Some(token) = self
            .inline
            .as_deref()
            .and_then(|cookies| cookie_value(cookies, &self.name))
        {
            return Some(token);
        }

        let path = self.file.as_ref()?;
        let token = match fs::read_to_string(path) {
            Ok(contents) => cookie_value(&contents, &self.name),
            Err(err) => {
                warn!(path = %path.display(), "cannot read cookie file: {err}");
                None
            }
        };
        if token.is_none() {
            debug!(cookie = %self.name, "cookie not present");
        }
        token
    }
}
