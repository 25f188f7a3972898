use std::{fs, path::Path, str::FromStr, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use shared::{domain::SessionName, error::SessionNameError};
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "startup.toml";
/// Generated names append four characters to the prefix and must stay a valid session name.
const MAX_SESSION_PREFIX_LEN: usize = 56;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub flow: StartupFlowConfig,
    pub discovery: DiscoverySettings,
}

/// Per-phase deadlines and feature toggles of the startup flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartupFlowConfig {
    pub step_timeout_secs: u64,
    pub anchor_wait_timeout_secs: u64,
    pub room_load_timeout_secs: u64,
    pub network_timeout_secs: u64,
    pub auto_prompt_room_scan: bool,
    pub enable_room_sharing: bool,
    pub require_role_selection: bool,
    pub poll_interval_ms: u64,
    pub platform_init_delay_ms: u64,
    pub host_session_name: Option<String>,
}

impl Default for StartupFlowConfig {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30,
            anchor_wait_timeout_secs: 60,
            room_load_timeout_secs: 30,
            network_timeout_secs: 30,
            auto_prompt_room_scan: true,
            enable_room_sharing: true,
            require_role_selection: true,
            poll_interval_ms: 500,
            platform_init_delay_ms: 1000,
            host_session_name: None,
        }
    }
}

impl StartupFlowConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    pub fn anchor_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.anchor_wait_timeout_secs)
    }

    pub fn room_load_timeout(&self) -> Duration {
        Duration::from_secs(self.room_load_timeout_secs)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn platform_init_delay(&self) -> Duration {
        Duration::from_millis(self.platform_init_delay_ms)
    }

    pub fn host_session_name(&self) -> Result<Option<SessionName>, ConfigError> {
        self.host_session_name
            .as_deref()
            .map(SessionName::new)
            .transpose()
            .map_err(ConfigError::InvalidHostSessionName)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeouts = [
            ("step_timeout_secs", self.step_timeout_secs),
            ("anchor_wait_timeout_secs", self.anchor_wait_timeout_secs),
            ("room_load_timeout_secs", self.room_load_timeout_secs),
            ("network_timeout_secs", self.network_timeout_secs),
        ];
        if let Some((field, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::ZeroTimeout(*field));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        self.host_session_name()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub session_prefix: String,
    pub max_players: u32,
    pub refresh_interval_secs: u64,
    pub host_label: String,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            session_prefix: "ShootingGame_".into(),
            max_players: 8,
            refresh_interval_secs: 2,
            host_label: "Host".into(),
        }
    }
}

impl DiscoverySettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Mirrored entries unseen for this long are dropped from presentation lists.
    pub fn stale_after(&self) -> Duration {
        self.refresh_interval() * 2
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_prefix.trim().is_empty() {
            return Err(ConfigError::EmptySessionPrefix);
        }
        if self.session_prefix.len() > MAX_SESSION_PREFIX_LEN {
            return Err(ConfigError::SessionPrefixTooLong(self.session_prefix.len()));
        }
        if self.max_players < 2 {
            return Err(ConfigError::TooFewPlayers(self.max_players));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroTimeout("refresh_interval_secs"));
        }
        Ok(())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.flow.validate()?;
        self.discovery.validate()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("poll_interval_ms must be greater than zero")]
    ZeroPollInterval,
    #[error("session_prefix must not be empty")]
    EmptySessionPrefix,
    #[error("session_prefix is {0} bytes long; at most 56 are allowed")]
    SessionPrefixTooLong(usize),
    #[error("max_players must be at least 2, got {0}")]
    TooFewPlayers(u32),
    #[error("host_session_name is invalid: {0}")]
    InvalidHostSessionName(#[source] SessionNameError),
    #[error("environment variable {key} has invalid value '{value}'")]
    InvalidEnvValue { key: String, value: String },
}

/// Reads settings from `path` (or `startup.toml` when present), applies `APP__*` overrides and
/// validates the result.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = match path {
        Some(path) => read_settings_file(path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            read_settings_file(Path::new(DEFAULT_CONFIG_FILE))?
        }
        None => Settings::default(),
    };

    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    settings.validate().context("invalid startup settings")?;
    Ok(settings)
}

fn read_settings_file(path: &Path) -> anyhow::Result<Settings> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("failed to parse settings file '{}'", path.display()))
}

pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let flow = &mut settings.flow;
    override_parsed(&lookup, "APP__FLOW__STEP_TIMEOUT_SECS", &mut flow.step_timeout_secs)?;
    override_parsed(
        &lookup,
        "APP__FLOW__ANCHOR_WAIT_TIMEOUT_SECS",
        &mut flow.anchor_wait_timeout_secs,
    )?;
    override_parsed(
        &lookup,
        "APP__FLOW__ROOM_LOAD_TIMEOUT_SECS",
        &mut flow.room_load_timeout_secs,
    )?;
    override_parsed(
        &lookup,
        "APP__FLOW__NETWORK_TIMEOUT_SECS",
        &mut flow.network_timeout_secs,
    )?;
    override_parsed(
        &lookup,
        "APP__FLOW__AUTO_PROMPT_ROOM_SCAN",
        &mut flow.auto_prompt_room_scan,
    )?;
    override_parsed(
        &lookup,
        "APP__FLOW__ENABLE_ROOM_SHARING",
        &mut flow.enable_room_sharing,
    )?;
    override_parsed(
        &lookup,
        "APP__FLOW__REQUIRE_ROLE_SELECTION",
        &mut flow.require_role_selection,
    )?;
    override_parsed(&lookup, "APP__FLOW__POLL_INTERVAL_MS", &mut flow.poll_interval_ms)?;
    override_parsed(
        &lookup,
        "APP__FLOW__PLATFORM_INIT_DELAY_MS",
        &mut flow.platform_init_delay_ms,
    )?;
    if let Some(v) = lookup("APP__FLOW__HOST_SESSION_NAME") {
        flow.host_session_name = Some(v);
    }

    let discovery = &mut settings.discovery;
    if let Some(v) = lookup("APP__DISCOVERY__SESSION_PREFIX") {
        discovery.session_prefix = v;
    }
    override_parsed(&lookup, "APP__DISCOVERY__MAX_PLAYERS", &mut discovery.max_players)?;
    override_parsed(
        &lookup,
        "APP__DISCOVERY__REFRESH_INTERVAL_SECS",
        &mut discovery.refresh_interval_secs,
    )?;
    if let Some(v) = lookup("APP__DISCOVERY__HOST_LABEL") {
        discovery.host_label = v;
    }

    Ok(())
}

fn override_parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *target = raw.trim().parse().map_err(|_| ConfigError::InvalidEnvValue {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_startup_flow() {
        let settings = Settings::default();
        assert_eq!(settings.flow.anchor_wait_timeout(), Duration::from_secs(60));
        assert_eq!(settings.flow.poll_interval(), Duration::from_millis(500));
        assert_eq!(settings.discovery.stale_after(), Duration::from_secs(4));
        settings.validate().expect("defaults validate");
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [flow]
            anchor_wait_timeout_secs = 90
            enable_room_sharing = false

            [discovery]
            session_prefix = "Arena_"
            "#,
        )
        .expect("parse");

        assert_eq!(settings.flow.anchor_wait_timeout_secs, 90);
        assert!(!settings.flow.enable_room_sharing);
        assert_eq!(settings.flow.step_timeout_secs, 30);
        assert_eq!(settings.discovery.session_prefix, "Arena_");
        assert_eq!(settings.discovery.max_players, 8);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            lookup_from(&[
                ("APP__FLOW__ANCHOR_WAIT_TIMEOUT_SECS", "15"),
                ("APP__FLOW__AUTO_PROMPT_ROOM_SCAN", "false"),
                ("APP__DISCOVERY__MAX_PLAYERS", "4"),
                ("APP__FLOW__HOST_SESSION_NAME", "ShootingGame_LAN1"),
            ]),
        )
        .expect("overrides");

        assert_eq!(settings.flow.anchor_wait_timeout_secs, 15);
        assert!(!settings.flow.auto_prompt_room_scan);
        assert_eq!(settings.discovery.max_players, 4);
        assert_eq!(
            settings
                .flow
                .host_session_name()
                .expect("valid")
                .map(|name| name.to_string()),
            Some("ShootingGame_LAN1".to_string())
        );
    }

    #[test]
    fn unparsable_env_value_is_reported() {
        let mut settings = Settings::default();
        let err = apply_env_overrides(
            &mut settings,
            lookup_from(&[("APP__FLOW__NETWORK_TIMEOUT_SECS", "soon")]),
        )
        .expect_err("invalid");
        assert!(matches!(err, ConfigError::InvalidEnvValue { ref key, .. } if key == "APP__FLOW__NETWORK_TIMEOUT_SECS"));
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        let mut settings = Settings::default();
        settings.flow.room_load_timeout_secs = 0;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ZeroTimeout("room_load_timeout_secs"))
        ));

        let mut settings = Settings::default();
        settings.flow.poll_interval_ms = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::ZeroPollInterval)));

        let mut settings = Settings::default();
        settings.discovery.session_prefix = "  ".into();
        assert!(matches!(settings.validate(), Err(ConfigError::EmptySessionPrefix)));

        let mut settings = Settings::default();
        settings.discovery.max_players = 1;
        assert!(matches!(settings.validate(), Err(ConfigError::TooFewPlayers(1))));

        let mut settings = Settings::default();
        settings.flow.host_session_name = Some("   ".into());
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::InvalidHostSessionName(SessionNameError::Empty))
        ));
    }
}
