//! Structured CLI errors with meaningful exit codes.
//!
//! Exit code scheme:
//! - 0:  success
//! - 2:  clap arg parse error (automatic, before our code runs)
//! - 10: pipeline error (GPU setup, bad dimensions, unknown effect)
//! - 11: I/O error (shader or settings file access)
//! - 12: input error (bad setting key/value, unresolved placeholder, bad JSON params)
//! - 13: serialization error

use std::fmt;

use voxshade_core::settings::SettingsError;
use voxshade_core::{InjectionError, PipelineError};

/// Errors produced by CLI operations, each mapped to a distinct exit code.
#[derive(Debug)]
pub enum CliError {
    /// A pipeline-level error.
    Pipeline(PipelineError),
    /// An I/O error.
    Io(String),
    /// A user input error.
    Input(String),
    /// A serialization error (JSON output failure).
    Serialization(String),
}

impl CliError {
    /// Returns the process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Pipeline(_) => 10,
            CliError::Io(_) => 11,
            CliError::Input(_) => 12,
            CliError::Serialization(_) => 13,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Pipeline(e) => write!(f, "{e}"),
            CliError::Io(msg) => write!(f, "{msg}"),
            CliError::Input(msg) => write!(f, "{msg}"),
            CliError::Serialization(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<PipelineError> for CliError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Settings(inner) => inner.into(),
            PipelineError::Injection(inner) => inner.into(),
            other => CliError::Pipeline(other),
        }
    }
}

impl From<SettingsError> for CliError {
    fn from(e: SettingsError) -> Self {
        match e {
            SettingsError::Io { .. } => CliError::Io(e.to_string()),
            other => CliError::Input(other.to_string()),
        }
    }
}

impl From<InjectionError> for CliError {
    fn from(e: InjectionError) -> Self {
        CliError::Input(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxshade_core::SettingKey;

    #[test]
    fn pipeline_error_exit_code_is_10() {
        let err = CliError::Pipeline(PipelineError::UnknownEffect("bloom".into()));
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn io_error_exit_code_is_11() {
        let err = CliError::Io("read failed".into());
        assert_eq!(err.exit_code(), 11);
    }

    #[test]
    fn input_error_exit_code_is_12() {
        let err = CliError::Input("bad key".into());
        assert_eq!(err.exit_code(), 12);
    }

    #[test]
    fn serialization_error_exit_code_is_13() {
        let err = CliError::Serialization("json fail".into());
        assert_eq!(err.exit_code(), 13);
    }

    #[test]
    fn from_settings_io_routes_to_cli_io() {
        let settings_err = SettingsError::Io {
            path: "/nope/settings.json".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        let cli_err = CliError::from(PipelineError::Settings(settings_err));
        assert_eq!(cli_err.exit_code(), 11);
        assert!(cli_err.to_string().contains("settings.json"));
    }

    #[test]
    fn from_settings_type_mismatch_routes_to_input() {
        let cli_err = CliError::from(SettingsError::HostOwned(SettingKey::GodRayQuality));
        assert_eq!(cli_err.exit_code(), 12);
    }

    #[test]
    fn from_injection_error_routes_to_input() {
        let cli_err = CliError::from(InjectionError::UnterminatedPlaceholder { line: 3 });
        assert_eq!(cli_err.exit_code(), 12);
    }

    #[test]
    fn from_pipeline_non_settings_routes_to_cli_pipeline() {
        let cli_err = CliError::from(PipelineError::WrongThread);
        assert_eq!(cli_err.exit_code(), 10);
        assert!(cli_err.to_string().contains("render thread"));
    }

    #[test]
    fn from_serde_json_error_routes_to_serialization() {
        let bad_json = serde_json::from_str::<serde_json::Value>("{invalid");
        let cli_err = CliError::from(bad_json.unwrap_err());
        assert_eq!(cli_err.exit_code(), 13);
    }
}
