use super::HuddleConfig;
use super::constants::files::{CONFIG_DIR_NAME, CONFIG_FILE_NAME};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

impl HuddleConfig {
    /// Write the default configuration to `output`
    pub fn create_sample_config<P: AsRef<Path>>(output: P) -> Result<()> {
        let output = output.as_ref();
        if let Some(parent) = output.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory: {}", parent.display())
                })?;
            }
        }

        let config_content = toml::to_string_pretty(&HuddleConfig::default())
            .context("Failed to serialize default configuration")?;

        fs::write(output, config_content)
            .with_context(|| format!("Failed to write config file: {}", output.display()))?;

        Ok(())
    }

    /// Write `huddle.toml` into `workspace` unless it exists. Returns the
    /// created file names.
    pub fn bootstrap_workspace<P: AsRef<Path>>(workspace: P, force: bool) -> Result<Vec<String>> {
        let config_path = workspace.as_ref().join(CONFIG_FILE_NAME);
        let mut created_files = Vec::new();

        if !config_path.exists() || force {
            Self::create_sample_config(&config_path)?;
            created_files.push(CONFIG_FILE_NAME.to_string());
        }

        Ok(created_files)
    }
}

/// Configuration manager for loading configurations
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: HuddleConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from the default locations
    pub fn load() -> Result<Self> {
        Self::load_from_workspace(std::env::current_dir()?)
    }

    /// Get the user's home directory path
    fn get_home_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            return Some(PathBuf::from(home));
        }

        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            return Some(PathBuf::from(userprofile));
        }

        dirs::home_dir()
    }

    /// Load configuration from a specific workspace.
    ///
    /// Lookup order: `<workspace>/huddle.toml`, `<workspace>/.huddle/huddle.toml`,
    /// `~/.huddle/huddle.toml`, then built-in defaults.
    pub fn load_from_workspace(workspace: impl AsRef<Path>) -> Result<Self> {
        let workspace = workspace.as_ref();

        let mut candidates = vec![
            workspace.join(CONFIG_FILE_NAME),
            workspace.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME),
        ];
        if let Some(home_dir) = Self::get_home_dir() {
            candidates.push(home_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
        }

        for path in candidates {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self {
            config: HuddleConfig::default(),
            config_path: None,
        })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: HuddleConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &HuddleConfig {
        &self.config
    }

    /// Consume the manager and keep the configuration
    pub fn into_config(self) -> HuddleConfig {
        self.config
    }

    /// Get the configuration file path (if loaded from file)
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}
