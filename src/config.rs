use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::objects::ObjectFormat;

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for gitpack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitpackConfig {
    /// Container written by `pack` when no output is given
    #[serde(default = "defaults::pack_output")]
    pub pack_output: PathBuf,
    /// Directory populated by `unpack` when no output is given
    #[serde(default = "defaults::unpack_output")]
    pub unpack_output: PathBuf,
    /// Object format of snapshots, which fixes the trailer width
    #[serde(default)]
    pub object_format: ObjectFormat,
    /// Directory holding temporary stores and pack files (system temp dir if unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    /// git executable driving the object store
    #[serde(default = "defaults::git_program")]
    pub git_program: PathBuf,
    /// Author and committer recorded in snapshot commits
    #[serde(default)]
    pub identity: Identity,
    /// Honour .gitignore and exclude files while staging
    #[serde(default)]
    pub respect_ignore_files: bool,
}

/// Fixed identity and message of snapshot commits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identity {
    #[serde(default = "defaults::author_name")]
    pub name: String,
    #[serde(default = "defaults::author_email")]
    pub email: String,
    #[serde(default = "defaults::message")]
    pub message: String,
    /// Seconds since the epoch; the current time is used if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Default for Identity {
    fn default() -> Self {
        Self {
            name: defaults::author_name(),
            email: defaults::author_email(),
            message: defaults::message(),
            timestamp: None,
        }
    }
}

impl Default for GitpackConfig {
    fn default() -> Self {
        Self {
            pack_output: defaults::pack_output(),
            unpack_output: defaults::unpack_output(),
            object_format: ObjectFormat::default(),
            scratch_dir: None,
            git_program: defaults::git_program(),
            identity: Identity::default(),
            respect_ignore_files: false,
        }
    }
}

impl GitpackConfig {
    /// Load configuration from the config file (if any) and environment variables
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let config_path = Self::resolve_path(explicit_path, env::var_os("GITPACK_CONFIG"));

        let mut config = match config_path {
            Some(path) if path.exists() => {
                tracing::debug!("loading gitpack config from {:?}", path);
                Self::load_from_file(&path)?
            }
            Some(path) if explicit_path.is_some() => {
                anyhow::bail!("config file not found at {:?}", path);
            }
            _ => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `GITPACK_*` overrides looked up through `var`
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = var("GITPACK_OUTPUT") {
            self.pack_output = expand_tilde(Path::new(&path));
        }

        if let Some(path) = var("GITPACK_UNPACK_DIR") {
            self.unpack_output = expand_tilde(Path::new(&path));
        }

        if let Some(path) = var("GITPACK_SCRATCH_DIR") {
            self.scratch_dir = Some(expand_tilde(Path::new(&path)));
        }

        if let Some(path) = var("GITPACK_GIT") {
            self.git_program = expand_tilde(Path::new(&path));
        }

        if let Some(format) = var("GITPACK_OBJECT_FORMAT") {
            self.object_format = format
                .parse()
                .map_err(anyhow::Error::msg)
                .context("Failed to parse GITPACK_OBJECT_FORMAT")?;
        }

        if let Some(timestamp) = var("GITPACK_COMMIT_TIMESTAMP") {
            self.identity.timestamp = Some(
                timestamp
                    .parse()
                    .context("Failed to parse GITPACK_COMMIT_TIMESTAMP as i64")?,
            );
        }

        Ok(())
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let mut config: GitpackConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config.pack_output = expand_tilde(&config.pack_output);
        config.unpack_output = expand_tilde(&config.unpack_output);
        config.git_program = expand_tilde(&config.git_program);
        if let Some(ref scratch) = config.scratch_dir {
            config.scratch_dir = Some(expand_tilde(scratch));
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// Config file to use: `explicit_path`, then `GITPACK_CONFIG`, then the default location
    pub fn resolve_path(explicit_path: Option<&Path>, env_path: Option<OsString>) -> Option<PathBuf> {
        match (explicit_path, env_path) {
            (Some(path), _) => Some(expand_tilde(path)),
            (None, Some(path)) => Some(expand_tilde(Path::new(&path))),
            (None, None) => Self::config_file_path(),
        }
    }

    /// Default config file path
    pub fn config_file_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/gitpack/config.yaml"))
    }

    /// Directory under which temporary resources are created
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(env::temp_dir)
    }
}

mod defaults {
    use std::path::PathBuf;

    pub(crate) fn pack_output() -> PathBuf {
        PathBuf::from("build/output/packed.gpk")
    }

    pub(crate) fn unpack_output() -> PathBuf {
        PathBuf::from("build/output/unpacked")
    }

    pub(crate) fn git_program() -> PathBuf {
        PathBuf::from("git")
    }

    pub(crate) fn author_name() -> String {
        "GitPacker".to_string()
    }

    pub(crate) fn author_email() -> String {
        "gitpacker@example.com".to_string()
    }

    pub(crate) fn message() -> String {
        "Pack commit".to_string()
    }
}
