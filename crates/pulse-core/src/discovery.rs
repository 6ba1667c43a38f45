use crate::error::DiscoveryError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directory names never descended into.
pub const SKIPPED_DIRS: [&str; 3] = ["node_modules", "vendor", ".Trash"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovered {
    /// Canonical scan root.
    pub root: PathBuf,
    /// Repository roots, unordered.
    pub repos: Vec<PathBuf>,
    /// Sibling directories of repositories that hold no repository,
    /// relative to `root` and sorted.
    pub non_git_paths: Vec<String>,
}

/// Walks `root` looking for repositories. A repository whose `.git` entry
/// would sit deeper than `max_depth` levels below the root is not reported.
pub fn find_repos(root: &Path, max_depth: usize) -> Result<Discovered, DiscoveryError> {
    let metadata = fs::metadata(root).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            DiscoveryError::MissingRoot {
                path: root.to_path_buf(),
            }
        } else {
            DiscoveryError::Unreadable {
                path: root.to_path_buf(),
                source,
            }
        }
    })?;
    if !metadata.is_dir() {
        return Err(DiscoveryError::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    let root = fs::canonicalize(root).map_err(|source| DiscoveryError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;
    fs::read_dir(&root).map_err(|source| DiscoveryError::Unreadable {
        path: root.clone(),
        source,
    })?;

    let mut repos = Vec::new();
    walk(&root, 0, max_depth, &mut repos);
    let non_git_paths = non_git_siblings(&root, &repos);
    Ok(Discovered {
        root,
        repos,
        non_git_paths,
    })
}

fn walk(dir: &Path, depth: usize, max_depth: usize, repos: &mut Vec<PathBuf>) {
    if depth >= max_depth {
        return;
    }
    if dir.join(".git").exists() {
        repos.push(dir.to_path_buf());
        return;
    }
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(path = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };
    for entry in entries.flatten() {
        if !is_candidate_dir(&entry) {
            continue;
        }
        walk(&entry.path(), depth + 1, max_depth, repos);
    }
}

/// Real directories only; symlinks are not followed.
fn is_candidate_dir(entry: &fs::DirEntry) -> bool {
    let is_dir = entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false);
    if !is_dir {
        return false;
    }
    let name = entry.file_name();
    let name = name.to_string_lossy();
    name != ".git" && !SKIPPED_DIRS.contains(&name.as_ref())
}

/// Directories next to a repository that neither are one nor contain one.
pub fn non_git_siblings(root: &Path, repos: &[PathBuf]) -> Vec<String> {
    let repo_set: BTreeSet<&Path> = repos.iter().map(PathBuf::as_path).collect();
    let parents: BTreeSet<&Path> = repos.iter().filter_map(|repo| repo.parent()).collect();

    let mut found = BTreeSet::new();
    for parent in parents {
        let Ok(entries) = fs::read_dir(parent) else {
            continue;
        };
        for entry in entries.flatten() {
            if !is_candidate_dir(&entry) {
                continue;
            }
            let child = entry.path();
            if repo_set.contains(child.as_path()) {
                continue;
            }
            if repos.iter().any(|repo| repo.starts_with(&child)) {
                continue;
            }
            let label = match child.strip_prefix(root) {
                Ok(relative) if !relative.as_os_str().is_empty() => relative.display().to_string(),
                _ => entry.file_name().to_string_lossy().into_owned(),
            };
            found.insert(label);
        }
    }
    found.into_iter().collect()
}
