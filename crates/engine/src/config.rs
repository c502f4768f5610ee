use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::tools::ToolSet;

/// Default location of the configuration file when none is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/movietools/config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub temp_dir: PathBuf,
    pub activity_log: PathBuf,
    pub trace_log: PathBuf,
    pub accepted_extensions: Vec<String>,
    pub subtitle_extensions: Vec<String>,
    pub teletext_page: u16,
    pub compress_quality: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: PathBuf::from("/tmp/movietools"),
            activity_log: PathBuf::from("/var/log/movietools.log"),
            trace_log: PathBuf::from("/tmp/movietools-trace.log"),
            accepted_extensions: vec![
                "ts".to_string(),
                "mkv".to_string(),
                "srt".to_string(),
                "mp4".to_string(),
            ],
            subtitle_extensions: vec!["srt".to_string()],
            teletext_page: 398,
            compress_quality: 23.0,
        }
    }
}

impl AppConfig {
    pub fn accepts(&self, path: &Path) -> bool {
        extension_in(path, &self.accepted_extensions)
    }

    pub fn is_subtitle(&self, path: &Path) -> bool {
        extension_in(path, &self.subtitle_extensions)
    }
}

fn extension_in(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Load settings from a TOML file. A missing file means defaults; either
/// way the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(config_path) if config_path.exists() => {
            let contents = std::fs::read_to_string(config_path)
                .with_context(|| format!("Failed to read config file {:?}", config_path))?;
            toml::from_str::<AppConfig>(&contents)
                .with_context(|| format!("Failed to parse TOML config {:?}", config_path))?
        }
        Some(config_path) => {
            tracing::warn!("Config file not found at {:?}, using defaults", config_path);
            AppConfig::default()
        }
        None => AppConfig::default(),
    };

    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.accepted_extensions.is_empty() {
        anyhow::bail!("accepted_extensions cannot be empty");
    }

    if !(0.0..=51.0).contains(&config.compress_quality) {
        anyhow::bail!("compress_quality must be between 0 and 51");
    }

    if !(100..=899).contains(&config.teletext_page) {
        anyhow::bail!("teletext_page must be between 100 and 899");
    }

    Ok(())
}

/// Everything the session and the executor need to know about this run,
/// assembled once at startup.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub app: AppConfig,
    pub destination_dir: PathBuf,
    pub verbose: bool,
    pub shutdown: bool,
    pub tools: ToolSet,
}

impl RuntimeConfig {
    pub fn new(app: AppConfig, destination_dir: PathBuf, tools: ToolSet) -> Self {
        Self {
            app,
            destination_dir,
            verbose: false,
            shutdown: false,
            tools,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn arb_app_config() -> impl Strategy<Value = AppConfig> {
        (
            "[a-z/]{1,20}".prop_map(PathBuf::from),
            "[a-z/]{1,20}".prop_map(PathBuf::from),
            prop::collection::vec("[a-z0-9]{1,4}", 1..6),
            100u16..=899,
            0u8..=51,
        )
            .prop_map(|(temp_dir, activity_log, accepted_extensions, teletext_page, quality)| {
                AppConfig {
                    temp_dir,
                    activity_log,
                    accepted_extensions,
                    teletext_page,
                    compress_quality: quality as f32,
                    ..AppConfig::default()
                }
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_config_round_trip(config in arb_app_config()) {
            let toml_string = toml::to_string(&config)
                .expect("Failed to serialize config to TOML");

            let mut temp_file = NamedTempFile::new()
                .expect("Failed to create temp file");
            temp_file.write_all(toml_string.as_bytes())
                .expect("Failed to write to temp file");
            temp_file.flush()
                .expect("Failed to flush temp file");

            let loaded_config = load_config(Some(temp_file.path()))
                .expect("Failed to load config from file");

            prop_assert_eq!(config, loaded_config);
        }
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let non_existent_path = PathBuf::from("/tmp/non_existent_movietools_12345.toml");
        let config = load_config(Some(&non_existent_path)).expect("Should load defaults");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_no_config_path_uses_defaults() {
        let config = load_config(None).expect("Should load defaults");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_toml_syntax() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        temp_file
            .write_all(b"this is not valid TOML {{{")
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let result = load_config(Some(temp_file.path()));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("parse TOML"));
    }

    #[test]
    fn test_partial_config_with_defaults() {
        let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let partial_toml = r#"
temp_dir = "/scratch/movies"
teletext_page = 777
"#;
        temp_file
            .write_all(partial_toml.as_bytes())
            .expect("Failed to write");
        temp_file.flush().expect("Failed to flush");

        let config = load_config(Some(temp_file.path())).expect("Should load partial config");

        assert_eq!(config.temp_dir, PathBuf::from("/scratch/movies"));
        assert_eq!(config.teletext_page, 777);
        assert_eq!(config.accepted_extensions, AppConfig::default().accepted_extensions);
        assert_eq!(config.compress_quality, AppConfig::default().compress_quality);
    }

    #[test]
    fn test_validation_rejects_out_of_range_values() {
        let empty = AppConfig {
            accepted_extensions: vec![],
            ..Default::default()
        };
        assert!(validate_config(&empty)
            .unwrap_err()
            .to_string()
            .contains("accepted_extensions"));

        let quality = AppConfig {
            compress_quality: 60.0,
            ..Default::default()
        };
        assert!(validate_config(&quality)
            .unwrap_err()
            .to_string()
            .contains("compress_quality"));

        let page = AppConfig {
            teletext_page: 42,
            ..Default::default()
        };
        assert!(validate_config(&page)
            .unwrap_err()
            .to_string()
            .contains("teletext_page"));
    }

    #[test]
    fn test_extension_checks_ignore_case() {
        let config = AppConfig::default();
        assert!(config.accepts(Path::new("/media/Show.MKV")));
        assert!(config.accepts(Path::new("clip.ts")));
        assert!(!config.accepts(Path::new("notes.txt")));
        assert!(!config.accepts(Path::new("no_extension")));
        assert!(config.is_subtitle(Path::new("captions.SRT")));
        assert!(!config.is_subtitle(Path::new("movie.mkv")));
    }
}
