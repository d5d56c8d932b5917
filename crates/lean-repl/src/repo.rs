//! Resolution of theorem source repositories to local checkouts.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tokio::sync::Mutex;
use url::Url;

/// Errors raised while resolving a repository checkout.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("invalid repository url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid commit {0:?}: expected a hex revision")]
    InvalidCommit(String),

    #[error("checkout {} not found and fetching is disabled", .0.display())]
    Missing(PathBuf),

    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    #[error("lake {command} failed in {}: {stderr}", .dir.display())]
    Build {
        command: String,
        dir: PathBuf,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A Lean project pinned to one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeanGitRepo {
    url: Url,
    commit: String,
}

impl LeanGitRepo {
    pub fn new(url: &str, commit: &str) -> Result<Self, RepoError> {
        let parsed = Url::parse(url).map_err(|e| RepoError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let commit = commit.trim();
        if commit.is_empty() || !commit.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RepoError::InvalidCommit(commit.to_string()));
        }
        let repo = Self {
            url: parsed,
            commit: commit.to_ascii_lowercase(),
        };
        if repo.name().is_empty() {
            return Err(RepoError::InvalidUrl {
                url: url.to_string(),
                reason: "no repository name in path".into(),
            });
        }
        Ok(repo)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn commit(&self) -> &str {
        &self.commit
    }

    /// Last path segment of the URL without a `.git` suffix.
    pub fn name(&self) -> &str {
        let last = self
            .url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .unwrap_or("");
        last.strip_suffix(".git").unwrap_or(last)
    }

    /// Checkout location under `root`: `<root>/<name>-<commit>`.
    pub fn checkout_dir(&self, root: &Path) -> PathBuf {
        root.join(format!("{}-{}", self.name(), self.commit))
    }
}

/// Directory of repository checkouts, optionally populated on demand.
///
/// A fetched repository is cloned, checked out and built with `lake` before
/// it becomes visible under its final name, so a checkout directory always
/// holds the `.olean` files a session needs to import its modules.
pub struct RepoCache {
    root: PathBuf,
    fetch_missing: bool,
    lake_path: PathBuf,
    // Concurrent theorems from one repository must not clone it twice.
    fetch_lock: Mutex<()>,
}

impl RepoCache {
    pub fn new(root: impl Into<PathBuf>, fetch_missing: bool) -> Self {
        Self {
            root: root.into(),
            fetch_missing,
            lake_path: PathBuf::from("lake"),
            fetch_lock: Mutex::new(()),
        }
    }

    /// Use this `lake` executable to build fetched repositories.
    pub fn with_lake(mut self, lake_path: impl Into<PathBuf>) -> Self {
        self.lake_path = lake_path.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the checkout directory for `repo`, cloning it first if allowed.
    pub async fn resolve(&self, repo: &LeanGitRepo) -> Result<PathBuf, RepoError> {
        let dir = repo.checkout_dir(&self.root);
        if is_checkout(&dir) {
            return Ok(dir);
        }
        if !self.fetch_missing {
            return Err(RepoError::Missing(dir));
        }

        let _guard = self.fetch_lock.lock().await;
        if is_checkout(&dir) {
            return Ok(dir);
        }

        tracing::info!(url = %repo.url(), commit = repo.commit(), dir = %dir.display(), "Fetching repository");
        tokio::fs::create_dir_all(&self.root).await?;

        let partial = dir.with_extension("partial");
        if partial.exists() {
            tokio::fs::remove_dir_all(&partial).await?;
        }
        git(
            &self.root,
            &["clone", "--quiet", repo.url().as_str(), &partial.to_string_lossy()],
        )
        .await?;
        git(&partial, &["checkout", "--quiet", repo.commit()]).await?;
        self.build(&partial).await?;
        tokio::fs::rename(&partial, &dir).await?;

        Ok(dir)
    }

    /// Build a fresh checkout so its modules can be imported.
    ///
    /// Projects depending on Mathlib first download its prebuilt cache; a
    /// failed download only costs time, since `lake build` compiles whatever
    /// is missing. A failed build is an error.
    pub async fn build(&self, project: &Path) -> Result<(), RepoError> {
        if uses_mathlib(project) {
            tracing::info!(project = %project.display(), "Fetching Mathlib build cache");
            if let Err(e) = lake(&self.lake_path, project, &["exe", "cache", "get"]).await {
                tracing::warn!(error = %e, "Mathlib cache download failed, building from source");
            }
        }

        tracing::info!(project = %project.display(), "Building Lean project");
        lake(&self.lake_path, project, &["build"]).await
    }
}

/// Whether `project` is Mathlib or pins it in `lake-manifest.json`.
fn uses_mathlib(project: &Path) -> bool {
    let Ok(text) = std::fs::read_to_string(project.join("lake-manifest.json")) else {
        return false;
    };
    let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&text) else {
        return false;
    };
    let is_mathlib = |v: &serde_json::Value| v.get("name").and_then(|n| n.as_str()) == Some("mathlib");
    is_mathlib(&manifest)
        || manifest
            .get("packages")
            .and_then(|p| p.as_array())
            .is_some_and(|packages| packages.iter().any(is_mathlib))
}

fn is_checkout(dir: &Path) -> bool {
    dir.join("lakefile.lean").is_file() || dir.join("lakefile.toml").is_file()
}

async fn git(cwd: &Path, args: &[&str]) -> Result<(), RepoError> {
    let output = Command::new("git").args(args).current_dir(cwd).output().await?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RepoError::Git {
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

async fn lake(lake_path: &Path, cwd: &Path, args: &[&str]) -> Result<(), RepoError> {
    let output = Command::new(lake_path)
        .args(args)
        .current_dir(cwd)
        .output()
        .await?;
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stderr = if stderr.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            stderr
        };
        Err(RepoError::Build {
            command: args.join(" "),
            dir: cwd.to_path_buf(),
            stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write a `lake` stand-in that appends its arguments to `lake.log` and
    /// fails any subcommand listed in `failing`.
    fn stub_lake(dir: &Path, failing: &[&str]) -> PathBuf {
        let log = dir.join("lake.log");
        let mut script = format!("#!/bin/sh\necho \"$*\" >> '{}'\n", log.display());
        for sub in failing {
            script.push_str(&format!(
                "if [ \"$*\" = \"{sub}\" ]; then echo \"error: {sub} broke\" >&2; exit 1; fi\n"
            ));
        }
        let path = dir.join("lake");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn lake_calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("lake.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn project(root: &Path, manifest: Option<&str>) -> PathBuf {
        let dir = root.join("proj");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("lakefile.lean"), "").unwrap();
        if let Some(manifest) = manifest {
            std::fs::write(dir.join("lake-manifest.json"), manifest).unwrap();
        }
        dir
    }

    const MATHLIB_MANIFEST: &str = r#"{"version": 7, "name": "demo",
        "packages": [{"name": "batteries"}, {"name": "mathlib"}]}"#;

    #[test]
    fn checkout_dir_uses_name_and_commit() {
        let repo =
            LeanGitRepo::new("https://github.com/leanprover-community/mathlib4.git", "ABC123")
                .unwrap();
        assert_eq!(repo.name(), "mathlib4");
        assert_eq!(repo.commit(), "abc123");
        assert_eq!(
            repo.checkout_dir(Path::new("/repos")),
            PathBuf::from("/repos/mathlib4-abc123")
        );
    }

    #[test]
    fn trailing_slash_is_ignored() {
        let repo = LeanGitRepo::new("https://github.com/owner/proj/", "deadbeef").unwrap();
        assert_eq!(repo.name(), "proj");
    }

    #[test]
    fn rejects_bad_url() {
        assert!(matches!(
            LeanGitRepo::new("not a url", "abc"),
            Err(RepoError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn rejects_non_hex_commit() {
        assert!(matches!(
            LeanGitRepo::new("https://github.com/a/b", "main"),
            Err(RepoError::InvalidCommit(_))
        ));
        assert!(matches!(
            LeanGitRepo::new("https://github.com/a/b", ""),
            Err(RepoError::InvalidCommit(_))
        ));
    }

    #[tokio::test]
    async fn resolve_finds_existing_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = LeanGitRepo::new("https://github.com/a/proj", "cafe").unwrap();
        let dir = repo.checkout_dir(tmp.path());
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("lakefile.lean"), "").unwrap();

        let cache = RepoCache::new(tmp.path(), false);
        assert_eq!(cache.resolve(&repo).await.unwrap(), dir);
    }

    #[tokio::test]
    async fn resolve_missing_without_fetch_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = LeanGitRepo::new("https://github.com/a/proj", "cafe").unwrap();

        let cache = RepoCache::new(tmp.path(), false);
        let err = cache.resolve(&repo).await.unwrap_err();
        assert!(matches!(err, RepoError::Missing(_)));
    }

    #[test]
    fn mathlib_is_detected_from_manifest() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!uses_mathlib(&project(tmp.path(), None)));

        let tmp = tempfile::tempdir().unwrap();
        assert!(uses_mathlib(&project(tmp.path(), Some(MATHLIB_MANIFEST))));

        let tmp = tempfile::tempdir().unwrap();
        let own = r#"{"version": 7, "name": "mathlib", "packages": []}"#;
        assert!(uses_mathlib(&project(tmp.path(), Some(own))));

        let tmp = tempfile::tempdir().unwrap();
        let plain = r#"{"version": 7, "name": "demo", "packages": [{"name": "batteries"}]}"#;
        assert!(!uses_mathlib(&project(tmp.path(), Some(plain))));
    }

    #[tokio::test]
    async fn build_fetches_mathlib_cache_then_builds() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = project(tmp.path(), Some(MATHLIB_MANIFEST));
        let cache = RepoCache::new(tmp.path(), true).with_lake(stub_lake(tmp.path(), &[]));

        cache.build(&dir).await.unwrap();
        assert_eq!(lake_calls(tmp.path()), vec!["exe cache get", "build"]);
    }

    #[tokio::test]
    async fn build_without_mathlib_skips_cache() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = project(tmp.path(), None);
        let cache = RepoCache::new(tmp.path(), true).with_lake(stub_lake(tmp.path(), &[]));

        cache.build(&dir).await.unwrap();
        assert_eq!(lake_calls(tmp.path()), vec!["build"]);
    }

    #[tokio::test]
    async fn failed_cache_download_still_builds() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = project(tmp.path(), Some(MATHLIB_MANIFEST));
        let lake = stub_lake(tmp.path(), &["exe cache get"]);
        let cache = RepoCache::new(tmp.path(), true).with_lake(lake);

        cache.build(&dir).await.unwrap();
        assert_eq!(lake_calls(tmp.path()), vec!["exe cache get", "build"]);
    }

    #[tokio::test]
    async fn failed_build_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = project(tmp.path(), None);
        let cache = RepoCache::new(tmp.path(), true).with_lake(stub_lake(tmp.path(), &["build"]));

        let err = cache.build(&dir).await.unwrap_err();
        assert!(
            matches!(err, RepoError::Build { ref command, ref stderr, .. }
                if command == "build" && stderr.contains("build broke")),
            "{err}"
        );
    }

    /// Commit a minimal Lake project into a local git repository and return
    /// its `file://` URL and HEAD commit, or `None` when git is unavailable.
    fn local_git_project(root: &Path) -> Option<(String, String)> {
        let src = root.join("upstream").join("demo");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("lakefile.lean"), "package demo\n").unwrap();

        let git = |args: &[&str]| {
            std::process::Command::new("git")
                .args(["-c", "user.name=t", "-c", "user.email=t@t", "-c", "init.defaultBranch=main"])
                .args(args)
                .current_dir(&src)
                .output()
                .ok()
                .filter(|o| o.status.success())
        };
        git(&["init", "--quiet"])?;
        git(&["add", "."])?;
        git(&["commit", "--quiet", "-m", "init"])?;
        let head = git(&["rev-parse", "HEAD"])?;
        let commit = String::from_utf8_lossy(&head.stdout).trim().to_string();
        let url = Url::from_directory_path(&src).ok()?.to_string();
        Some((url, commit))
    }

    #[tokio::test]
    async fn fetched_repository_is_built_before_use() {
        let tmp = tempfile::tempdir().unwrap();
        let Some((url, commit)) = local_git_project(tmp.path()) else {
            eprintln!("git unavailable, skipping");
            return;
        };
        let repo = LeanGitRepo::new(&url, &commit).unwrap();
        let repos = tmp.path().join("repos");
        let cache = RepoCache::new(&repos, true).with_lake(stub_lake(tmp.path(), &[]));

        let dir = cache.resolve(&repo).await.unwrap();
        assert_eq!(dir, repo.checkout_dir(&repos));
        assert!(dir.join("lakefile.lean").is_file());
        assert_eq!(lake_calls(tmp.path()), vec!["build"]);

        // A second resolve reuses the checkout without rebuilding.
        cache.resolve(&repo).await.unwrap();
        assert_eq!(lake_calls(tmp.path()).len(), 1);
    }

    #[tokio::test]
    async fn failed_build_leaves_no_checkout() {
        let tmp = tempfile::tempdir().unwrap();
        let Some((url, commit)) = local_git_project(tmp.path()) else {
            eprintln!("git unavailable, skipping");
            return;
        };
        let repo = LeanGitRepo::new(&url, &commit).unwrap();
        let repos = tmp.path().join("repos");
        let cache = RepoCache::new(&repos, true).with_lake(stub_lake(tmp.path(), &["build"]));

        let err = cache.resolve(&repo).await.unwrap_err();
        assert!(matches!(err, RepoError::Build { .. }), "{err}");
        assert!(!repo.checkout_dir(&repos).exists());
    }
}
