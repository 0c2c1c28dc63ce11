use std::path::Path;

use serde::Deserialize;

use crate::cli::Cli;
use crate::error::{Error, Result};

const DEFAULT_CONFIG_PATH: &str = ".prlens/config.toml";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// How exhaustive a review should be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    Quick,
    Standard,
    Thorough,
}

impl Depth {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "quick" => Some(Depth::Quick),
            "standard" => Some(Depth::Standard),
            "thorough" => Some(Depth::Thorough),
            _ => None,
        }
    }
}

/// User-selected review dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusAreas {
    pub bugs: bool,
    pub security: bool,
    pub performance: bool,
    pub style: bool,
    pub naming: bool,
    pub docs: bool,
    pub tests: bool,
}

impl Default for FocusAreas {
    fn default() -> Self {
        Self {
            bugs: true,
            security: true,
            performance: true,
            style: false,
            naming: false,
            docs: false,
            tests: false,
        }
    }
}

impl FocusAreas {
    /// Build from a list of area names; unknown names are rejected.
    pub fn from_names(names: &[String]) -> Result<Self> {
        let mut areas = Self {
            bugs: false,
            security: false,
            performance: false,
            style: false,
            naming: false,
            docs: false,
            tests: false,
        };
        for name in names {
            match name.trim().to_ascii_lowercase().as_str() {
                "bugs" => areas.bugs = true,
                "security" => areas.security = true,
                "performance" => areas.performance = true,
                "style" => areas.style = true,
                "naming" => areas.naming = true,
                "docs" => areas.docs = true,
                "tests" => areas.tests = true,
                other => {
                    return Err(Error::ConfigValidation(format!(
                        "unknown focus area: {other} (expected: bugs, security, performance, style, naming, docs, tests)"
                    )));
                }
            }
        }
        Ok(areas)
    }
}

/// Everything a single review pass needs. Captured at pass start and
/// immutable for its duration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model", alias = "modelId")]
    pub model: String,
    #[serde(default = "default_depth")]
    pub depth: Depth,
    #[serde(default, alias = "focusAreas")]
    pub focus: FocusAreas,
    /// Optional access token for the remote content API.
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_depth() -> Depth {
    Depth::Standard
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            depth: Depth::Standard,
            focus: FocusAreas::default(),
            access_token: None,
        }
    }
}

impl ReviewSettings {
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(Error::ConfigValidation(
                "api key not set (use --api-key, PRLENS_API_KEY, or the config file)".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub depth: Option<String>,
    pub focus: Option<Vec<String>>,
    pub access_token: Option<String>,
    pub state_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub settings: ReviewSettings,
    pub state_dir: String,
}

impl Config {
    /// Load config from file (explicit path must exist; the default path is
    /// optional) and merge CLI/env overrides on top.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file_config = match cli.config {
            Some(ref path) => {
                let path = Path::new(path);
                if !path.exists() {
                    return Err(Error::ConfigNotFound(path.to_path_buf()));
                }
                parse_config(&std::fs::read_to_string(path)?)?
            }
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    parse_config(&std::fs::read_to_string(path)?)?
                } else {
                    ConfigFile::default()
                }
            }
        };
        merge(file_config, cli)
    }
}

pub fn parse_config(content: &str) -> Result<ConfigFile> {
    let config: ConfigFile = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &ConfigFile) -> Result<()> {
    if let Some(ref depth) = config.depth
        && Depth::parse(depth).is_none()
    {
        return Err(Error::ConfigValidation(format!(
            "unknown depth: {depth} (expected: quick, standard, thorough)"
        )));
    }
    if let Some(ref focus) = config.focus {
        FocusAreas::from_names(focus)?;
    }
    Ok(())
}

/// Resolve the model API key: CLI flag, then env vars, then config file.
fn resolve_api_key(cli: &Cli, file: &ConfigFile) -> String {
    if let Some(ref key) = cli.api_key {
        return key.clone();
    }
    for var in ["PRLENS_API_KEY", "GEMINI_API_KEY"] {
        if let Ok(key) = std::env::var(var)
            && !key.is_empty()
        {
            return key;
        }
    }
    file.api_key.clone().unwrap_or_default()
}

pub fn merge(file: ConfigFile, cli: &Cli) -> Result<Config> {
    let api_key = resolve_api_key(cli, &file);

    let depth = match cli.depth.as_deref().or(file.depth.as_deref()) {
        Some(raw) => Depth::parse(raw).ok_or_else(|| {
            Error::ConfigValidation(format!(
                "unknown depth: {raw} (expected: quick, standard, thorough)"
            ))
        })?,
        None => Depth::Standard,
    };

    let focus = match cli.focus {
        Some(ref list) => {
            let names: Vec<String> = list.split(',').map(|s| s.to_string()).collect();
            FocusAreas::from_names(&names)?
        }
        None => match file.focus {
            Some(ref names) => FocusAreas::from_names(names)?,
            None => FocusAreas::default(),
        },
    };

    Ok(Config {
        settings: ReviewSettings {
            api_key,
            model: cli
                .model
                .clone()
                .or(file.model)
                .unwrap_or_else(default_model),
            depth,
            focus,
            access_token: cli.access_token.clone().or(file.access_token),
        },
        state_dir: cli
            .state_dir
            .clone()
            .or(file.state_dir)
            .unwrap_or_else(|| ".prlens".to_string()),
    })
}
