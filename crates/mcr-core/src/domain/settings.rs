//! Connection settings and the validation of user-entered drafts.
//!
//! A [`ConnectionSettings`] value is only ever created from a draft that
//! passed [`SettingsDraft::validate`] or from storage that passed
//! [`ConnectionSettings::from_stored`].  Once created it is never mutated;
//! re-saving replaces it wholesale.

use std::ops::RangeInclusive;

/// Default TCP port of the MonitorControl HTTP API.
pub const DEFAULT_PORT: u16 = 51423;

/// Allowed port range (no privileged ports).
pub const PORT_RANGE: RangeInclusive<u16> = 1024..=65535;

/// Immutable host/port/token triple describing the single active connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub token: String,
}

impl ConnectionSettings {
    /// Rebuilds settings from persisted raw values.
    ///
    /// Returns `None` when the host or token is blank, or the port is missing
    /// or outside [`PORT_RANGE`].
    pub fn from_stored(host: &str, port: Option<i64>, token: &str) -> Option<Self> {
        let host = host.trim();
        let token = token.trim();
        let port = u16::try_from(port?).ok().filter(|p| PORT_RANGE.contains(p))?;
        if host.is_empty() || token.is_empty() {
            return None;
        }
        Some(Self {
            host: host.to_string(),
            port,
            token: token.to_string(),
        })
    }

    /// Base URL of the API, always ending in `/`.
    ///
    /// ```rust
    /// use mcr_core::ConnectionSettings;
    ///
    /// let s = ConnectionSettings {
    ///     host: "https://192.168.1.20/".into(),
    ///     port: 51423,
    ///     token: "t".into(),
    /// };
    /// assert_eq!(s.base_url(), "http://192.168.1.20:51423/");
    /// ```
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", normalize_host(&self.host), self.port)
    }

    /// Lower-cased `host:port` key used to scope per-connection caches.
    pub fn cache_key(&self) -> String {
        connection_key(&self.host, self.port)
    }

    /// Returns a draft pre-filled with these settings.
    pub fn to_draft(&self) -> SettingsDraft {
        SettingsDraft {
            host: self.host.clone(),
            port: self.port.to_string(),
            token: self.token.clone(),
        }
    }
}

/// Strips surrounding whitespace, an `http://` / `https://` prefix (any
/// case), and trailing slashes from a user-entered host.
pub fn normalize_host(raw: &str) -> &str {
    strip_scheme(raw.trim()).trim_end_matches('/')
}

/// Removes a leading `http://` or `https://`, ignoring ASCII case.
pub fn strip_scheme(raw: &str) -> &str {
    ["http://", "https://"]
        .into_iter()
        .find(|scheme| {
            raw.get(..scheme.len())
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
        })
        .map_or(raw, |scheme| &raw[scheme.len()..])
}

/// Cache scope key for a host and port.
pub fn connection_key(host: &str, port: u16) -> String {
    format!("{}:{port}", normalize_host(host).to_lowercase())
}

// ── Draft & validation ────────────────────────────────────────────────────────

/// Raw text the user typed into the connection settings form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDraft {
    pub host: String,
    pub port: String,
    pub token: String,
}

impl Default for SettingsDraft {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT.to_string(),
            token: String::new(),
        }
    }
}

/// Per-field validation errors for a [`SettingsDraft`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsValidation {
    pub host_error: Option<String>,
    pub port_error: Option<String>,
    pub token_error: Option<String>,
}

impl SettingsValidation {
    pub fn is_valid(&self) -> bool {
        self.host_error.is_none() && self.port_error.is_none() && self.token_error.is_none()
    }
}

impl SettingsDraft {
    /// Validates every field and, on success, returns trimmed settings.
    ///
    /// # Errors
    ///
    /// Returns the [`SettingsValidation`] describing every invalid field.
    pub fn validate(&self) -> Result<ConnectionSettings, SettingsValidation> {
        let host = self.host.trim();
        let token = self.token.trim();
        let port_text = self.port.trim();

        let host_error = host.is_empty().then(|| "Enter the host address".to_string());
        let token_error = token.is_empty().then(|| "Enter the bearer token".to_string());

        let numeric = !port_text.is_empty() && port_text.bytes().all(|b| b.is_ascii_digit());
        let in_range = port_text
            .parse::<u16>()
            .ok()
            .filter(|p| PORT_RANGE.contains(p));
        let port_error = if port_text.is_empty() {
            Some("Enter the port".to_string())
        } else if !numeric {
            Some("Port must be a number".to_string())
        } else if in_range.is_none() {
            Some(format!(
                "Port must be between {} and {}",
                PORT_RANGE.start(),
                PORT_RANGE.end()
            ))
        } else {
            None
        };

        let validation = SettingsValidation {
            host_error,
            port_error,
            token_error,
        };
        match (validation.is_valid(), in_range) {
            (true, Some(port)) => Ok(ConnectionSettings {
                host: host.to_string(),
                port,
                token: token.to_string(),
            }),
            _ => Err(validation),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
