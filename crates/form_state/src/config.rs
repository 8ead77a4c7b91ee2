use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;

/// Environment variable prefix, e.g. `FORM_STATE_DEBOUNCE_MS=250`.
pub const ENV_PREFIX: &str = "FORM_STATE";

/// Tunables of one form engine.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FormConfig {
    /// Delay before a still-invalid field's error presentation is refreshed.
    pub debounce_ms: u64,
    /// Error slot identifiers are `<prefix><field name>`.
    pub error_slot_prefix: String,
    /// Task-queue yields after submit validation and after bulk writes.
    pub settle_ticks: u32,
}

impl Default for FormConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 600,
            error_slot_prefix: "error-".into(),
            settle_ticks: 1,
        }
    }
}

impl FormConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn error_slot_id(&self, field_name: &str) -> String {
        format!("{}{}", self.error_slot_prefix, field_name)
    }

    /// Parse an inline JSON5 document; missing keys keep their defaults.
    pub fn from_json5(text: &str) -> Result<Self> {
        Ok(json5::from_str(text)?)
    }

    /// Layer defaults, an optional file and `FORM_STATE_*` environment variables.
    ///
    /// The file format follows the extension (`json5`, `json`, `toml`); a
    /// missing file is not an error.
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let defaults = FormConfig::default();
        let mut builder = config::Config::builder()
            .set_default("debounce_ms", defaults.debounce_ms)?
            .set_default("error_slot_prefix", defaults.error_slot_prefix)?
            .set_default("settle_ticks", i64::from(defaults.settle_ticks))?;

        if let Some(file) = file {
            let format = match file.extension().and_then(|ext| ext.to_str()) {
                Some("toml") => config::FileFormat::Toml,
                Some("json") => config::FileFormat::Json,
                _ => config::FileFormat::Json5,
            };
            if !file.exists() {
                debug!("form config {} not found, using defaults", file.display());
            }
            builder = builder.add_source(config::File::from(file).format(format).required(false));
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let cfg: Self = builder.build()?.try_deserialize()?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_policy() {
        let cfg = FormConfig::default();
        assert_eq!(cfg.debounce(), Duration::from_millis(600));
        assert_eq!(cfg.error_slot_id("user.email"), "error-user.email");
        assert_eq!(cfg.settle_ticks, 1);
    }

    #[test]
    fn json5_overrides_single_keys() {
        let cfg = FormConfig::from_json5("{ debounce_ms: 250, // faster\n }").expect("parse");
        assert_eq!(
            cfg,
            FormConfig {
                debounce_ms: 250,
                ..FormConfig::default()
            }
        );
    }

    #[test]
    fn load_reads_toml_file() {
        let mut file = tempfile::Builder::new()
            .prefix("form_state_config")
            .suffix(".toml")
            .tempfile()
            .expect("temp file");
        writeln!(file, "error_slot_prefix = \"err_\"\nsettle_ticks = 2").expect("write");

        let cfg = FormConfig::load(Some(file.path())).expect("load");
        assert_eq!(cfg.error_slot_prefix, "err_");
        assert_eq!(cfg.settle_ticks, 2);
        assert_eq!(cfg.debounce_ms, 600);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let cfg = FormConfig::load(None).expect("load");
        assert_eq!(cfg.error_slot_prefix, "error-");
    }
}
