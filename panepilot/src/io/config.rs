//! panepilot configuration stored under `<config_dir>/panepilot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::overrides::Settings;

pub const API_KEY_ENV: &str = "PANEPILOT_API_KEY";
pub const MODEL_ENV: &str = "PANEPILOT_MODEL";

/// panepilot configuration (TOML).
///
/// Edited by humans; missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PilotConfig {
    pub model: ModelConfig,

    /// Scrollback lines captured per pane.
    pub max_capture_lines: usize,

    /// Estimated-token budget before history is squashed.
    pub max_context_size: usize,

    /// Seconds between watch polls and busy-pane waits.
    pub wait_interval_secs: u64,

    pub exec_confirm: bool,
    pub send_keys_confirm: bool,
    pub paste_multiline_confirm: bool,
    pub read_file_confirm: bool,

    /// Largest file `<ReadFile>` may return, in bytes.
    pub max_read_file_size: u64,

    /// Corrective re-submissions allowed per turn before giving up.
    pub max_guideline_retries: u32,

    /// Pause after sending keys to a pane that is not prepared.
    pub settle_delay_ms: u64,

    /// Write per-turn transcripts next to the config file.
    pub debug: bool,

    /// Tracing output file; stderr when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,

    pub prompts: PromptsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelConfig {
    pub api_key: String,
    pub base_url: String,
    pub name: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            name: "google/gemini-2.5-flash".to_string(),
        }
    }
}

/// Prompt customizations. `base_system` replaces the built-in base prompt;
/// the others are appended to their mode's prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PromptsConfig {
    pub base_system: String,
    pub chat_assistant: String,
    pub watch: String,
}

impl Default for PilotConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            max_capture_lines: 200,
            max_context_size: 100_000,
            wait_interval_secs: 5,
            exec_confirm: true,
            send_keys_confirm: true,
            paste_multiline_confirm: true,
            read_file_confirm: true,
            max_read_file_size: 1024 * 1024,
            max_guideline_retries: 3,
            settle_delay_ms: 1000,
            debug: false,
            log_file: None,
            prompts: PromptsConfig::default(),
        }
    }
}

impl PilotConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_capture_lines == 0 {
            return Err(anyhow!("max_capture_lines must be > 0"));
        }
        if self.max_context_size == 0 {
            return Err(anyhow!("max_context_size must be > 0"));
        }
        if self.wait_interval_secs == 0 {
            return Err(anyhow!("wait_interval_secs must be > 0"));
        }
        if self.max_read_file_size == 0 {
            return Err(anyhow!("max_read_file_size must be > 0"));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(anyhow!("model.base_url must not be empty"));
        }
        if self.model.name.trim().is_empty() {
            return Err(anyhow!("model.name must not be empty"));
        }
        Ok(())
    }

    /// Session-overridable tunables as configured.
    pub fn settings(&self) -> Settings {
        Settings {
            model: self.model.name.clone(),
            max_capture_lines: self.max_capture_lines,
            max_context_size: self.max_context_size,
            wait_interval_secs: self.wait_interval_secs,
            exec_confirm: self.exec_confirm,
            send_keys_confirm: self.send_keys_confirm,
            paste_multiline_confirm: self.paste_multiline_confirm,
            read_file_confirm: self.read_file_confirm,
            max_read_file_size: self.max_read_file_size,
        }
    }

    /// Let `PANEPILOT_API_KEY` / `PANEPILOT_MODEL` shadow the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.trim().is_empty()) {
            self.model.api_key = key;
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.model.name = model;
        }
    }
}

/// `<config_dir>/panepilot/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let base = dirs::config_dir().context("resolve user config directory")?;
    Ok(base.join("panepilot").join("config.toml"))
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PilotConfig::default()`.
pub fn load_config(path: &Path) -> Result<PilotConfig> {
    if !path.exists() {
        let cfg = PilotConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PilotConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &PilotConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, PilotConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let mut cfg = PilotConfig::default();
        cfg.log_file = Some(temp.path().join("panepilot.log"));
        cfg.prompts.watch = "Only comment on errors.".to_string();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    /// Partial files keep defaults for everything they do not mention.
    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "exec_confirm = false\n[model]\napi_key = \"sk-test\"\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert!(!cfg.exec_confirm);
        assert_eq!(cfg.model.api_key, "sk-test");
        assert_eq!(cfg.model.base_url, ModelConfig::default().base_url);
        assert_eq!(cfg.max_capture_lines, 200);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "wait_interval_secs = 0\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("wait_interval_secs must be > 0"));
    }

    #[test]
    fn env_shadows_file_values() {
        let mut cfg = PilotConfig::default();
        cfg.apply_env_from(|name| match name {
            API_KEY_ENV => Some("sk-env".to_string()),
            MODEL_ENV => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.model.api_key, "sk-env");
        assert_eq!(cfg.model.name, ModelConfig::default().name);
    }

    #[test]
    fn settings_mirror_config() {
        let cfg = PilotConfig::default();
        let settings = cfg.settings();
        assert_eq!(settings.model, cfg.model.name);
        assert_eq!(settings.max_read_file_size, cfg.max_read_file_size);
        assert!(settings.exec_confirm);
    }
}
