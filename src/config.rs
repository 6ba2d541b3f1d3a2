use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SyncError};

pub const TOKEN_ENV: &str = "LINEAR_API_KEY";
pub const HOME_ENV: &str = "LINEAR_MANAGER_HOME";
pub const BASE_BRANCH_ENV: &str = "LINEAR_MANAGER_BASE_BRANCH";
pub const API_URL_ENV: &str = "LINEAR_API_URL";

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    pub settings: Settings,
}

/// Optional `<home>/config.yaml`. Environment variables win over file values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_check_workers")]
    pub check_workers: usize,
    #[serde(default = "default_pull_limit")]
    pub pull_limit: usize,
    #[serde(default)]
    pub base_branch: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout_secs: default_request_timeout(),
            check_workers: default_check_workers(),
            pull_limit: default_pull_limit(),
            base_branch: None,
        }
    }
}

fn default_api_url() -> String {
    "https://api.linear.app/graphql".to_string()
}
fn default_request_timeout() -> u64 {
    20
}
fn default_check_workers() -> usize {
    4
}
fn default_pull_limit() -> usize {
    100
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("LinearManager")
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    pub fn load() -> Result<Self> {
        let home = non_empty_env(HOME_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_home);
        Self::load_from(home)
    }

    pub fn load_from(home: PathBuf) -> Result<Self> {
        let path = home.join("config.yaml");
        let mut settings = if path.exists() {
            debug!("loading settings from {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            serde_yaml::from_str::<Option<Settings>>(&content)?.unwrap_or_default()
        } else {
            Settings::default()
        };

        if let Some(url) = non_empty_env(API_URL_ENV) {
            settings.api_url = url;
        }
        if let Some(branch) = non_empty_env(BASE_BRANCH_ENV) {
            settings.base_branch = Some(branch);
        }

        let config = Self { home, settings };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.settings.request_timeout_secs == 0 {
            return Err(SyncError::Config(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.settings.pull_limit == 0 {
            return Err(SyncError::Config("pull_limit must be greater than zero".into()));
        }
        Ok(())
    }

    /// Directory where task manifests are stored.
    pub fn tasks_dir(&self) -> PathBuf {
        self.home.join("tasks")
    }

    /// Directory where managed git worktrees live.
    pub fn worktrees_dir(&self) -> PathBuf {
        self.home.join("worktrees")
    }

    pub fn base_branch(&self) -> Option<&str> {
        self.settings
            .base_branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
    }

    pub fn api_token(&self) -> Result<String> {
        non_empty_env(TOKEN_ENV).ok_or_else(|| {
            SyncError::Config(format!(
                "{TOKEN_ENV} environment variable is required to talk to Linear"
            ))
        })
    }

    pub fn manifest_path_or_default(&self, path: Option<&Path>) -> PathBuf {
        path.map(Path::to_path_buf)
            .unwrap_or_else(|| self.tasks_dir())
    }
}
