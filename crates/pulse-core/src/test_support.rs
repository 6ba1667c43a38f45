use git2::{Commit, Oid, Repository, RepositoryInitOptions, Signature, Time};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

pub(crate) fn days_ago(days: i64) -> OffsetDateTime {
    OffsetDateTime::now_utc() - Duration::days(days)
}

pub(crate) struct TestRepo {
    _dir: Option<TempDir>,
    path: PathBuf,
    repo: Repository,
}

impl TestRepo {
    pub(crate) fn new(branch: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let mut repo = Self::init_at(dir.path(), branch);
        repo._dir = Some(dir);
        repo
    }

    /// Initializes a repository at `path`, which the caller keeps alive.
    pub(crate) fn init_at(path: &Path, branch: &str) -> Self {
        std::fs::create_dir_all(path).unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);
        let repo = Repository::init_opts(path, &opts).unwrap();
        Self {
            _dir: None,
            path: path.to_path_buf(),
            repo,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn write(&self, name: &str, contents: &str) {
        std::fs::write(self.path.join(name), contents).unwrap();
    }

    /// Clones `source` into a fresh temporary directory. The clone's
    /// `origin` points at `source`.
    pub(crate) fn clone_of(source: &TestRepo) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clone");
        let url = source.path().to_str().unwrap();
        let repo = Repository::clone(url, &path).unwrap();
        Self {
            _dir: Some(dir),
            path,
            repo,
        }
    }

    /// Commits `name` on top of HEAD with author and committer time `when`.
    pub(crate) fn commit(&self, name: &str, contents: &str, when: OffsetDateTime) -> Oid {
        self.commit_authored(name, contents, when, when)
    }

    /// Like [`TestRepo::commit`], with distinct author and committer times,
    /// as left behind by a rebase or cherry-pick.
    pub(crate) fn commit_authored(
        &self,
        name: &str,
        contents: &str,
        authored: OffsetDateTime,
        committed: OffsetDateTime,
    ) -> Oid {
        let parent = self
            .repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok());
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        self.write(name, contents);
        let mut index = self.repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        self.repo
            .commit(
                Some("HEAD"),
                &signature(authored),
                &signature(committed),
                &format!("add {name}"),
                &tree,
                &parents,
            )
            .unwrap()
    }

    /// Renames a tracked file in the working tree and stages the rename.
    pub(crate) fn stage_rename(&self, from: &str, to: &str) {
        std::fs::rename(self.path.join(from), self.path.join(to)).unwrap();
        let mut index = self.repo.index().unwrap();
        index.remove_path(Path::new(from)).unwrap();
        index.add_path(Path::new(to)).unwrap();
        index.write().unwrap();
    }

    /// Commits `name` with no parents and without touching refs, index or
    /// working tree.
    pub(crate) fn orphan_commit(&self, name: &str, contents: &str, when: OffsetDateTime) -> Oid {
        self.detached_commit(None, name, contents, when)
    }

    /// Commits `name` on top of `parent` without touching refs, index or
    /// working tree.
    pub(crate) fn commit_on(
        &self,
        parent: Oid,
        name: &str,
        contents: &str,
        when: OffsetDateTime,
    ) -> Oid {
        self.detached_commit(Some(parent), name, contents, when)
    }

    pub(crate) fn set_remote_ref(&self, remote: &str, branch: &str, target: Oid) {
        self.repo
            .reference(
                &format!("refs/remotes/{remote}/{branch}"),
                target,
                true,
                "test remote ref",
            )
            .unwrap();
    }

    pub(crate) fn detach_at(&self, target: Oid) {
        self.repo.set_head_detached(target).unwrap();
    }

    fn detached_commit(
        &self,
        parent: Option<Oid>,
        name: &str,
        contents: &str,
        when: OffsetDateTime,
    ) -> Oid {
        let parent = parent.map(|oid| self.repo.find_commit(oid).unwrap());
        let base_tree = parent.as_ref().map(|commit| commit.tree().unwrap());
        let blob = self.repo.blob(contents.as_bytes()).unwrap();
        let mut builder = self.repo.treebuilder(base_tree.as_ref()).unwrap();
        builder.insert(name, blob, 0o100644).unwrap();
        let tree = self.repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = signature(when);
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        self.repo
            .commit(None, &sig, &sig, &format!("add {name}"), &tree, &parents)
            .unwrap()
    }
}

fn signature(when: OffsetDateTime) -> Signature<'static> {
    let time = Time::new(when.unix_timestamp(), 0);
    Signature::new("tester", "tester@example.com", &time).unwrap()
}
