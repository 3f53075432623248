use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub log_level: String,
    pub log_format: LogFormat,
    /// Workspace opened at startup; clients may still switch with
    /// `workspace.select`.
    pub workspace: Option<PathBuf>,
}

impl AppConfig {
    /// Loads `gradebookd.toml` (optional), then `GRADEBOOKD_*` environment
    /// variables. `RUST_LOG` overrides the log level.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("log_level", "info")?
            .set_default("log_format", "pretty")?
            .add_source(File::with_name("gradebookd").required(false))
            .add_source(Environment::with_prefix("GRADEBOOKD").try_parsing(true))
            .set_override_option("log_level", std::env::var("RUST_LOG").ok())?;

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let cfg: AppConfig = Config::builder()
            .set_default("log_level", "info")
            .expect("default level")
            .set_default("log_format", "pretty")
            .expect("default format")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert!(cfg.workspace.is_none());
    }

    #[test]
    fn json_format_and_workspace_override() {
        let cfg: AppConfig = Config::builder()
            .set_default("log_level", "info")
            .expect("default level")
            .set_default("log_format", "pretty")
            .expect("default format")
            .set_override("log_format", "json")
            .expect("format")
            .set_override("workspace", "/tmp/course")
            .expect("workspace")
            .build()
            .expect("build")
            .try_deserialize()
            .expect("deserialize");
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.workspace, Some(PathBuf::from("/tmp/course")));
    }
}
