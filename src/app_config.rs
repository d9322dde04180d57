//! Application configuration loading and merging with CLI arguments.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use copier_core::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY};

use crate::cli::Args;

const APP_DIR: &str = "copier";
const DEFAULT_DEST_DIR: &str = "dist";

/// TOML-style file configuration for copier defaults.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// Default destination root when none is given on the command line.
    pub dest_dir: Option<PathBuf>,
    /// Default concurrency (same range as CLI).
    pub concurrency: Option<u16>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency
            && !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&usize::from(concurrency))
        {
            bail!(
                "Invalid config value for `concurrency`: {concurrency}. Expected range: {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"
            );
        }

        if let Some(dest_dir) = &self.dest_dir
            && dest_dir.as_os_str().is_empty()
        {
            bail!("Invalid config value for `dest_dir`: must not be empty");
        }

        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Returns the stable string label for display output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Verbose => "verbose",
            Self::Quiet => "quiet",
            Self::Debug => "debug",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Effective settings for one run after merging CLI, config file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub concurrency: usize,
    pub dry_run: bool,
    pub verbosity: VerbositySetting,
    /// `-v` count beyond the first, for `-vv` trace output.
    pub extra_verbose: bool,
}

impl RunSettings {
    /// Merges parsed arguments over the optional file config.
    ///
    /// Precedence: command line > config file > built-in defaults.
    #[must_use]
    pub fn resolve(args: Args, file_config: Option<&FileConfig>) -> Self {
        let dest = args
            .dst
            .or_else(|| file_config.and_then(|cfg| cfg.dest_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DEST_DIR));

        let concurrency = args
            .concurrency
            .or_else(|| file_config.and_then(|cfg| cfg.concurrency))
            .map_or(DEFAULT_CONCURRENCY, usize::from);

        let cli_verbosity = if args.quiet {
            Some(VerbositySetting::Quiet)
        } else if args.verbose > 0 {
            Some(VerbositySetting::Verbose)
        } else {
            None
        };
        let verbosity = cli_verbosity
            .or_else(|| file_config.and_then(|cfg| cfg.verbosity))
            .unwrap_or(VerbositySetting::Default);

        Self {
            src: args.src,
            dest,
            concurrency,
            dry_run: args.dry_run,
            verbosity,
            extra_verbose: args.verbose > 1,
        }
    }

    /// Default tracing filter, used when `RUST_LOG` is not set.
    #[must_use]
    pub fn default_log_level(&self) -> &'static str {
        match self.verbosity {
            VerbositySetting::Quiet => "error",
            VerbositySetting::Default => "info",
            VerbositySetting::Verbose if !self.extra_verbose => "debug",
            VerbositySetting::Verbose | VerbositySetting::Debug => "trace",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/copier/config.toml`
/// 2. `$HOME/.config/copier/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(xdg_config_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    if let Some(xdg_config_home) = xdg_config_home {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(APP_DIR)
                .join("config.toml"),
        );
    }

    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(APP_DIR)
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();

        match key {
            "dest_dir" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `dest_dir` value on line {}", line_index + 1)
                })?;
                cfg.dest_dir = Some(PathBuf::from(parsed));
            }
            "concurrency" => {
                let parsed = parse_integer_u16(value).with_context(|| {
                    format!("Invalid `concurrency` value on line {}", line_index + 1)
                })?;
                cfg.concurrency = Some(parsed);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(|| {
                    format!("Invalid `verbosity` value on line {}", line_index + 1)
                })?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!(
                        "Invalid `verbosity` value '{}' on line {}",
                        parsed,
                        line_index + 1
                    )
                })?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u16(raw_value: &str) -> Result<u16> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i64>()?;
    u16::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u16"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
