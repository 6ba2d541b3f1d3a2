use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

const MAX_SLUG_LEN: usize = 63;
const FALLBACK_SLUG: &str = "ticket";

fn run_git(args: &[&str], cwd: &Path) -> Result<Output> {
    Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => SyncError::Git("git not found in PATH".into()),
            _ => SyncError::Git(format!("git {}: {e}", args.join(" "))),
        })
}

/// Branch-safe form of a title: lowercase, runs of other characters collapsed to `-`.
pub fn slugify(label: &str) -> String {
    static NON_ALNUM: OnceLock<Regex> = OnceLock::new();
    let re = NON_ALNUM.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

    let lowered = label.to_lowercase();
    let slug = re.replace_all(&lowered, "-");
    let slug: String = slug.trim_matches('-').chars().take(MAX_SLUG_LEN).collect();
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Short stable id for a repository, used to keep worktrees of different repos apart.
pub fn repo_identifier(repo_root: &Path) -> String {
    let resolved = repo_root
        .canonicalize()
        .unwrap_or_else(|_| repo_root.to_path_buf());
    let digest = Sha256::digest(resolved.to_string_lossy().as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

pub fn repo_root(start: &Path) -> Result<PathBuf> {
    let output = run_git(&["rev-parse", "--show-toplevel"], start)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SyncError::Git(format!(
            "unable to determine git repo root: {}",
            stderr.trim()
        )));
    }
    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        return Err(SyncError::Git("unable to determine git repo root".into()));
    }
    Ok(PathBuf::from(root))
}

pub fn branch_exists(repo_root: &Path, branch: &str) -> bool {
    run_git(&["rev-parse", "--verify", "--quiet", branch], repo_root)
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Directory holding this repository's managed worktrees.
pub fn repo_worktrees_dir(worktrees_base: &Path, repo_root: &Path) -> PathBuf {
    worktrees_base.join(repo_identifier(repo_root))
}

/// First `slug`, `slug-1`, `slug-2`, ... with neither a branch nor a worktree directory.
pub fn pick_unique_branch(label: &str, repo_root: &Path, worktrees_dir: &Path) -> (String, PathBuf) {
    let base = slugify(label);
    let mut attempt = 0usize;
    loop {
        let branch = if attempt == 0 {
            base.clone()
        } else {
            format!("{base}-{attempt}")
        };
        let path = worktrees_dir.join(branch.replace('/', "-"));
        if !branch_exists(repo_root, &branch) && !path.exists() {
            return (branch, path);
        }
        debug!("branch or worktree {branch} taken, trying next suffix");
        attempt += 1;
    }
}

/// Creates a new branch checked out in its own worktree under `worktrees_base`.
///
/// The branch starts from `base_branch` when given, otherwise from the current HEAD.
pub fn create_branch_and_worktree(
    label: &str,
    start: &Path,
    worktrees_base: &Path,
    base_branch: Option<&str>,
) -> Result<(String, PathBuf)> {
    let root = repo_root(start)?;
    let dir = repo_worktrees_dir(worktrees_base, &root);
    std::fs::create_dir_all(&dir)?;

    let (branch, worktree_path) = pick_unique_branch(label, &root, &dir);

    info!("creating worktree: {}", worktree_path.display());
    let path_arg = worktree_path.to_string_lossy().into_owned();
    let mut args = vec!["worktree", "add", "-b", branch.as_str(), path_arg.as_str()];
    if let Some(base) = base_branch {
        args.push(base);
    }
    let output = run_git(&args, &root)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SyncError::Git(format!("worktree add failed: {}", stderr.trim())));
    }

    Ok((branch, worktree_path))
}
