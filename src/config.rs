//! Configuration file schema for gpt-analyzer.
//!
//! Configuration is optional. Without a file the defaults reproduce the
//! classic behaviour: `gpt-4o` on the OpenAI chat completions endpoint,
//! the API key read from `./api.key`, and a 128 KiB prompt cap.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::analyzers::AnalyzerSpec;

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_KEY_FILE: &str = "api.key";
/// Environment variable consulted when the key file does not exist.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_MAX_PROMPT_BYTES: usize = 2 << 16;
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_QUESTION: &str = "Analyze the C code for bugs, unsafe functions, security issues, POSIX compliance and SEI CERT standard. Provide a detailed report. Here is the code:\n\n";

/// Config file names searched in the working directory.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["gpt-analyzer.yaml", ".gpt-analyzer.yaml"];

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("API key file {0} is empty")]
    EmptyApiKey(PathBuf),
    #[error("API key file {path} not found and {env} is not set")]
    MissingApiKey { path: PathBuf, env: &'static str },
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub version: String,
    pub model: String,
    pub api_url: String,
    pub api_key_file: PathBuf,
    /// Text placed before the fenced source code.
    pub question: String,
    /// Largest prompt, in bytes, that will be sent.
    pub max_prompt_bytes: usize,
    /// Largest response body, in bytes, that will be buffered.
    pub max_response_bytes: usize,
    pub timeout_secs: u64,
    /// Largest output, in bytes, kept from a single analyzer.
    pub max_analyzer_output_bytes: usize,
    pub analyzers: Vec<AnalyzerSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1".to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            api_key_file: PathBuf::from(DEFAULT_API_KEY_FILE),
            question: DEFAULT_QUESTION.to_string(),
            max_prompt_bytes: DEFAULT_MAX_PROMPT_BYTES,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_analyzer_output_bytes: 64 * 1024,
            analyzers: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a configuration from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Locate a config file: working directory first, then the user config dir.
    pub fn discover() -> Option<PathBuf> {
        for name in DEFAULT_CONFIG_NAMES {
            let path = PathBuf::from(name);
            if path.exists() {
                return Some(path);
            }
        }

        user_config_path().filter(|p| p.exists())
    }

    /// Load `explicit` if given, otherwise a discovered file, otherwise defaults.
    ///
    /// Returns the config and the path it came from.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>), ConfigError> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => Self::discover(),
        };

        match path {
            Some(p) => {
                log::debug!("loading config from {}", p.display());
                let config = Self::parse_file(&p)?;
                Ok((config, Some(p)))
            }
            None => {
                log::debug!("no config file found, using defaults");
                Ok((Self::default(), None))
            }
        }
    }

    /// Analyzers whose file patterns match `file`.
    pub fn analyzers_for(&self, file: &Path) -> Result<Vec<&AnalyzerSpec>, ConfigError> {
        let mut selected = Vec::new();
        for analyzer in &self.analyzers {
            let applies = analyzer
                .applies_to(file)
                .map_err(|e| invalid_pattern(analyzer, e))?;
            if applies {
                selected.push(analyzer);
            }
        }
        Ok(selected)
    }
}

fn invalid_pattern(analyzer: &AnalyzerSpec, err: globset::Error) -> ConfigError {
    ConfigError::Invalid(format!(
        "analyzer {:?} has an invalid file pattern: {}",
        analyzer.name, err
    ))
}

/// `<user config dir>/config.yaml`, if the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "gpt-analyzer").map(|dirs| dirs.config_dir().join("config.yaml"))
}

/// Check a configuration for values that would make a run meaningless.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.model.trim().is_empty() {
        return Err(ConfigError::Invalid("model must not be empty".to_string()));
    }

    if !config.api_url.starts_with("http://") && !config.api_url.starts_with("https://") {
        return Err(ConfigError::Invalid(format!(
            "api_url {:?} must be an http(s) URL",
            config.api_url
        )));
    }

    if config.max_prompt_bytes == 0 {
        return Err(ConfigError::Invalid(
            "max_prompt_bytes must be positive".to_string(),
        ));
    }
    if config.max_response_bytes == 0 {
        return Err(ConfigError::Invalid(
            "max_response_bytes must be positive".to_string(),
        ));
    }
    if config.max_analyzer_output_bytes == 0 && !config.analyzers.is_empty() {
        return Err(ConfigError::Invalid(
            "max_analyzer_output_bytes must be positive when analyzers are configured"
                .to_string(),
        ));
    }
    if config.timeout_secs == 0 {
        return Err(ConfigError::Invalid(
            "timeout_secs must be positive".to_string(),
        ));
    }

    let mut names = HashSet::new();
    for analyzer in &config.analyzers {
        if analyzer.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "analyzer name must not be empty".to_string(),
            ));
        }
        if analyzer.command.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "analyzer {:?} has an empty command",
                analyzer.name
            )));
        }
        if !names.insert(analyzer.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate analyzer name {:?}",
                analyzer.name
            )));
        }

        analyzer
            .file_matcher()
            .map_err(|e| invalid_pattern(analyzer, e))?;
    }

    Ok(())
}

/// Read the API key: first line of `path`, trimmed.
///
/// Falls back to `OPENAI_API_KEY` when the file does not exist.
pub fn read_api_key(path: &Path) -> Result<String, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            let key = content.lines().next().unwrap_or("").trim();
            if key.is_empty() {
                return Err(ConfigError::EmptyApiKey(path.to_path_buf()));
            }
            Ok(key.to_string())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            match std::env::var(API_KEY_ENV) {
                Ok(key) if !key.trim().is_empty() => {
                    log::debug!("{} not found, using {}", path.display(), API_KEY_ENV);
                    Ok(key.trim().to_string())
                }
                _ => Err(ConfigError::MissingApiKey {
                    path: path.to_path_buf(),
                    env: API_KEY_ENV,
                }),
            }
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_classic_constants() {
        let config = Config::default();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.api_key_file, PathBuf::from("api.key"));
        assert_eq!(config.max_prompt_bytes, 131072);
        assert!(config.analyzers.is_empty());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("gpt-analyzer.yaml");
        fs::write(
            &path,
            r#"
model: gpt-4o-mini
analyzers:
  - name: cppcheck
    command: "cppcheck --quiet {file}"
    files: ["*.c"]
"#,
        )
        .unwrap();

        let config = Config::parse_file(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.analyzers.len(), 1);
        assert_eq!(config.analyzers[0].name, "cppcheck");
        assert!(!config.analyzers[0].required);
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.yaml");
        fs::write(&path, "model: [unclosed").unwrap();

        let err = Config::parse_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = Config {
            api_url: "ftp://example.com".to_string(),
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_analyzers() {
        let spec = AnalyzerSpec {
            name: "lint".to_string(),
            command: "true".to_string(),
            files: vec![],
            required: false,
        };
        let config = Config {
            analyzers: vec![spec.clone(), spec],
            ..Default::default()
        };
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_rejects_bad_glob() {
        let config = Config {
            analyzers: vec![AnalyzerSpec {
                name: "lint".to_string(),
                command: "true".to_string(),
                files: vec!["[".to_string()],
                required: false,
            }],
            ..Default::default()
        };
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_zero_analyzer_output_cap() {
        let mut config = Config {
            max_analyzer_output_bytes: 0,
            ..Default::default()
        };
        // No analyzers: the cap is never used.
        assert!(validate(&config).is_ok());

        config.analyzers.push(AnalyzerSpec {
            name: "lint".to_string(),
            command: "true".to_string(),
            files: vec![],
            required: false,
        });
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("max_analyzer_output_bytes"));
    }

    #[test]
    fn test_analyzers_for_reports_bad_pattern() {
        let config = Config {
            analyzers: vec![AnalyzerSpec {
                name: "lint".to_string(),
                command: "true".to_string(),
                files: vec!["[".to_string()],
                required: false,
            }],
            ..Default::default()
        };
        assert!(matches!(
            config.analyzers_for(Path::new("main.c")),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_read_api_key_first_line() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("api.key");
        fs::write(&path, "  sk-test-123  \nsecond line\n").unwrap();

        assert_eq!(read_api_key(&path).unwrap(), "sk-test-123");
    }

    #[test]
    fn test_read_api_key_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("api.key");
        fs::write(&path, "\n").unwrap();

        assert!(matches!(
            read_api_key(&path),
            Err(ConfigError::EmptyApiKey(_))
        ));
    }

    #[test]
    fn test_analyzers_for_filters_by_pattern() {
        let config = Config {
            analyzers: vec![
                AnalyzerSpec {
                    name: "c-only".to_string(),
                    command: "true".to_string(),
                    files: vec!["*.c".to_string()],
                    required: false,
                },
                AnalyzerSpec {
                    name: "any".to_string(),
                    command: "true".to_string(),
                    files: vec![],
                    required: false,
                },
            ],
            ..Default::default()
        };

        let names: Vec<_> = config
            .analyzers_for(Path::new("src/main.c"))
            .unwrap()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["c-only", "any"]);

        let names: Vec<_> = config
            .analyzers_for(Path::new("src/main.cpp"))
            .unwrap()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["any"]);
    }
}
