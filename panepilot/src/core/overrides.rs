//! Effective settings and session-scoped overrides.
//!
//! `/config set <key> <value>` decodes the value once into a typed field of
//! [`SessionOverrides`]. Overrides are never persisted; when set they shadow
//! the configured value in [`Settings`].

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// The closed set of keys `/config set` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    Model,
    MaxCaptureLines,
    MaxContextSize,
    WaitIntervalSecs,
    ExecConfirm,
    SendKeysConfirm,
    PasteMultilineConfirm,
    ReadFileConfirm,
    MaxReadFileSize,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 9] = [
        ConfigKey::Model,
        ConfigKey::MaxCaptureLines,
        ConfigKey::MaxContextSize,
        ConfigKey::WaitIntervalSecs,
        ConfigKey::ExecConfirm,
        ConfigKey::SendKeysConfirm,
        ConfigKey::PasteMultilineConfirm,
        ConfigKey::ReadFileConfirm,
        ConfigKey::MaxReadFileSize,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::Model => "model",
            ConfigKey::MaxCaptureLines => "max_capture_lines",
            ConfigKey::MaxContextSize => "max_context_size",
            ConfigKey::WaitIntervalSecs => "wait_interval_secs",
            ConfigKey::ExecConfirm => "exec_confirm",
            ConfigKey::SendKeysConfirm => "send_keys_confirm",
            ConfigKey::PasteMultilineConfirm => "paste_multiline_confirm",
            ConfigKey::ReadFileConfirm => "read_file_confirm",
            ConfigKey::MaxReadFileSize => "max_read_file_size",
        }
    }

    pub fn names() -> String {
        Self::ALL
            .iter()
            .map(|key| key.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKey {
    type Err = OverrideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| OverrideError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OverrideError {
    #[error("Cannot set '{0}'. Only these keys are allowed: {keys}", keys = ConfigKey::names())]
    UnknownKey(String),
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    InvalidValue {
        key: ConfigKey,
        value: String,
        expected: &'static str,
    },
}

/// Tunables read on every turn, after overrides are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub model: String,
    pub max_capture_lines: usize,
    pub max_context_size: usize,
    pub wait_interval_secs: u64,
    pub exec_confirm: bool,
    pub send_keys_confirm: bool,
    pub paste_multiline_confirm: bool,
    pub read_file_confirm: bool,
    pub max_read_file_size: u64,
}

impl Settings {
    /// `(key, value)` pairs in key order, for `/config` and `/info`.
    pub fn entries(&self) -> Vec<(ConfigKey, String)> {
        ConfigKey::ALL
            .into_iter()
            .map(|key| {
                let value = match key {
                    ConfigKey::Model => self.model.clone(),
                    ConfigKey::MaxCaptureLines => self.max_capture_lines.to_string(),
                    ConfigKey::MaxContextSize => self.max_context_size.to_string(),
                    ConfigKey::WaitIntervalSecs => self.wait_interval_secs.to_string(),
                    ConfigKey::ExecConfirm => self.exec_confirm.to_string(),
                    ConfigKey::SendKeysConfirm => self.send_keys_confirm.to_string(),
                    ConfigKey::PasteMultilineConfirm => self.paste_multiline_confirm.to_string(),
                    ConfigKey::ReadFileConfirm => self.read_file_confirm.to_string(),
                    ConfigKey::MaxReadFileSize => self.max_read_file_size.to_string(),
                };
                (key, value)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOverrides {
    pub model: Option<String>,
    pub max_capture_lines: Option<usize>,
    pub max_context_size: Option<usize>,
    pub wait_interval_secs: Option<u64>,
    pub exec_confirm: Option<bool>,
    pub send_keys_confirm: Option<bool>,
    pub paste_multiline_confirm: Option<bool>,
    pub read_file_confirm: Option<bool>,
    pub max_read_file_size: Option<u64>,
}

impl SessionOverrides {
    /// Decode and store one override. Returns the stored value for display.
    pub fn set(&mut self, key: ConfigKey, value: &str) -> Result<String, OverrideError> {
        let value = value.trim();
        let shown = match key {
            ConfigKey::Model => {
                if value.is_empty() {
                    return Err(invalid(key, value, "a model name"));
                }
                self.model.insert(value.to_string()).clone()
            }
            ConfigKey::MaxCaptureLines => {
                self.max_capture_lines.insert(parse_positive(key, value)?).to_string()
            }
            ConfigKey::MaxContextSize => {
                self.max_context_size.insert(parse_positive(key, value)?).to_string()
            }
            ConfigKey::WaitIntervalSecs => {
                self.wait_interval_secs.insert(parse_positive(key, value)?).to_string()
            }
            ConfigKey::ExecConfirm => self.exec_confirm.insert(parse_bool(key, value)?).to_string(),
            ConfigKey::SendKeysConfirm => {
                self.send_keys_confirm.insert(parse_bool(key, value)?).to_string()
            }
            ConfigKey::PasteMultilineConfirm => self
                .paste_multiline_confirm
                .insert(parse_bool(key, value)?)
                .to_string(),
            ConfigKey::ReadFileConfirm => {
                self.read_file_confirm.insert(parse_bool(key, value)?).to_string()
            }
            ConfigKey::MaxReadFileSize => {
                self.max_read_file_size.insert(parse_positive(key, value)?).to_string()
            }
        };
        Ok(shown)
    }

    pub fn is_set(&self, key: ConfigKey) -> bool {
        match key {
            ConfigKey::Model => self.model.is_some(),
            ConfigKey::MaxCaptureLines => self.max_capture_lines.is_some(),
            ConfigKey::MaxContextSize => self.max_context_size.is_some(),
            ConfigKey::WaitIntervalSecs => self.wait_interval_secs.is_some(),
            ConfigKey::ExecConfirm => self.exec_confirm.is_some(),
            ConfigKey::SendKeysConfirm => self.send_keys_confirm.is_some(),
            ConfigKey::PasteMultilineConfirm => self.paste_multiline_confirm.is_some(),
            ConfigKey::ReadFileConfirm => self.read_file_confirm.is_some(),
            ConfigKey::MaxReadFileSize => self.max_read_file_size.is_some(),
        }
    }

    /// Overlay the set fields on `base`.
    pub fn apply(&self, base: &Settings) -> Settings {
        Settings {
            model: self.model.clone().unwrap_or_else(|| base.model.clone()),
            max_capture_lines: self.max_capture_lines.unwrap_or(base.max_capture_lines),
            max_context_size: self.max_context_size.unwrap_or(base.max_context_size),
            wait_interval_secs: self.wait_interval_secs.unwrap_or(base.wait_interval_secs),
            exec_confirm: self.exec_confirm.unwrap_or(base.exec_confirm),
            send_keys_confirm: self.send_keys_confirm.unwrap_or(base.send_keys_confirm),
            paste_multiline_confirm: self
                .paste_multiline_confirm
                .unwrap_or(base.paste_multiline_confirm),
            read_file_confirm: self.read_file_confirm.unwrap_or(base.read_file_confirm),
            max_read_file_size: self.max_read_file_size.unwrap_or(base.max_read_file_size),
        }
    }
}

fn invalid(key: ConfigKey, value: &str, expected: &'static str) -> OverrideError {
    OverrideError::InvalidValue {
        key,
        value: value.to_string(),
        expected,
    }
}

fn parse_positive<T>(key: ConfigKey, value: &str) -> Result<T, OverrideError>
where
    T: FromStr + Default + PartialEq,
{
    match value.parse::<T>() {
        Ok(parsed) if parsed != T::default() => Ok(parsed),
        _ => Err(invalid(key, value, "a positive integer")),
    }
}

fn parse_bool(key: ConfigKey, value: &str) -> Result<bool, OverrideError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "true or false")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> Settings {
        Settings {
            model: "base/model".to_string(),
            max_capture_lines: 200,
            max_context_size: 100_000,
            wait_interval_secs: 5,
            exec_confirm: true,
            send_keys_confirm: true,
            paste_multiline_confirm: true,
            read_file_confirm: true,
            max_read_file_size: 1024,
        }
    }

    #[test]
    fn unset_overrides_leave_base_untouched() {
        assert_eq!(SessionOverrides::default().apply(&base()), base());
    }

    #[test]
    fn set_values_shadow_base() {
        let mut overrides = SessionOverrides::default();
        assert_eq!(
            overrides.set(ConfigKey::ExecConfirm, "false").expect("bool"),
            "false"
        );
        assert_eq!(
            overrides.set(ConfigKey::Model, " other/model ").expect("model"),
            "other/model"
        );
        assert_eq!(
            overrides.set(ConfigKey::WaitIntervalSecs, "9").expect("secs"),
            "9"
        );

        let effective = overrides.apply(&base());
        assert!(!effective.exec_confirm);
        assert_eq!(effective.model, "other/model");
        assert_eq!(effective.wait_interval_secs, 9);
        assert!(effective.send_keys_confirm);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        let err = "api_key".parse::<ConfigKey>().expect_err("not overridable");
        assert!(err.to_string().starts_with("Cannot set 'api_key'."));
        assert!(err.to_string().contains("max_read_file_size"));

        let mut overrides = SessionOverrides::default();
        assert!(overrides.set(ConfigKey::MaxCaptureLines, "0").is_err());
        assert!(overrides.set(ConfigKey::MaxCaptureLines, "-3").is_err());
        assert!(overrides.set(ConfigKey::ReadFileConfirm, "maybe").is_err());
        assert!(overrides.set(ConfigKey::Model, "  ").is_err());
        assert_eq!(overrides, SessionOverrides::default());
    }

    #[test]
    fn every_key_parses_from_its_name() {
        for key in ConfigKey::ALL {
            assert_eq!(key.as_str().parse::<ConfigKey>(), Ok(key));
        }
    }

    #[test]
    fn is_set_tracks_only_overridden_keys() {
        let mut overrides = SessionOverrides::default();
        overrides.set(ConfigKey::ExecConfirm, "false").expect("set");
        for key in ConfigKey::ALL {
            assert_eq!(overrides.is_set(key), key == ConfigKey::ExecConfirm, "{key}");
        }
    }
}
