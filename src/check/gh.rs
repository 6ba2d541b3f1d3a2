use std::path::Path;
use std::process::Command;

use tracing::{debug, info};

use crate::error::{Result, SyncError};

/// Fields requested from `gh pr checks --json`.
pub const CHECK_FIELDS: &str = "name,state,bucket,workflow";

/// `gh pr checks` exits with this code while checks are still running.
pub const PENDING_EXIT_CODE: i32 = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum GhOutcome {
  /// The `gh` binary is not on `PATH`.
  Missing,
  Finished {
    exit_code: i32,
    stdout: String,
    stderr: String,
  },
}

pub trait CheckRunner: Send + Sync {
  fn pr_checks(&self, branch: &str, cwd: &Path) -> Result<GhOutcome>;
}

/// Runs the GitHub CLI as a blocking subprocess.
#[derive(Debug, Clone, Default)]
pub struct GhRunner;

impl CheckRunner for GhRunner {
  fn pr_checks(&self, branch: &str, cwd: &Path) -> Result<GhOutcome> {
    info!("running gh pr checks {branch} in {}", cwd.display());

    let output = match Command::new("gh")
      .args(["pr", "checks", branch, "--json", CHECK_FIELDS])
      .current_dir(cwd)
      .output()
    {
      Ok(output) => output,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(GhOutcome::Missing),
      Err(e) => return Err(SyncError::Checks(format!("failed to run gh: {e}"))),
    };

    let exit_code = output.status.code().unwrap_or(-1);
    debug!("gh pr checks {branch} exited with {exit_code}");
    Ok(GhOutcome::Finished {
      exit_code,
      stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
  }
}
