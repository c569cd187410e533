//! Pipeline configuration loaded from TOML
//!
//! ```toml
//! language = "c17"
//!
//! [compile]
//! opt_level = "speed"
//! emission = "ir-text"
//!
//! [session]
//! resolution = "environment-then-process"
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Every section and field is optional; unknown keys are rejected.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::jit::SessionConfig;
use crate::logging::LoggingConfig;
use crate::options::CompileOptions;
use crate::source::Language;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Settings for a [`Pipeline`](crate::pipeline::Pipeline)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Language of snippets passed as plain text
    pub language: Language,
    pub compile: CompileOptions,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::jit::SymbolResolution;
    use crate::logging::LogLevel;
    use crate::options::{EmissionKind, OptLevel};
    use crate::source::CStandard;

    #[test]
    fn empty_config_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.compile.emission, EmissionKind::InMemory);
        assert_eq!(config.session.resolution, SymbolResolution::EnvironmentOnly);
        assert_eq!(config.language, Language::C(CStandard::C17));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
language = "c11"

[compile]
target = "x86_64-unknown-linux-gnu"
opt_level = "speed"
emission = "ir-binary"
warnings_as_errors = true

[compile.headers]
use_standard_cxx_includes = false

[compile.virtual_headers]
"helpers.h" = "int twice(int);"

[session]
resolution = "environment-then-process"

[logging]
level = "debug"
ansi = false
"#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.language, Language::C(CStandard::C11));
        assert_eq!(config.compile.target.as_deref(), Some("x86_64-unknown-linux-gnu"));
        assert_eq!(config.compile.opt_level, OptLevel::Speed);
        assert_eq!(config.compile.emission, EmissionKind::IrBinary);
        assert!(config.compile.warnings_as_errors);
        assert!(config.compile.headers.use_builtin_includes);
        assert!(!config.compile.headers.use_standard_cxx_includes);
        assert_eq!(config.compile.virtual_headers["helpers.h"], "int twice(int);");
        assert_eq!(
            config.session.resolution,
            SymbolResolution::EnvironmentThenProcess
        );
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert!(!config.logging.ansi);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = PipelineConfig::from_toml_str("[compile]\noptimize = true\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[compile]\nemission = \"assembly\"").unwrap();
        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.compile.emission, EmissionKind::Assembly);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = PipelineConfig::load(dir.path().join("absent.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn serialized_config_loads_back() {
        let config = PipelineConfig {
            compile: CompileOptions::default().with_opt_level(OptLevel::SpeedAndSize),
            ..PipelineConfig::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), config);
    }
}
