use assert_cmd::{cargo::cargo_bin_cmd, Command};
use git2::{Repository, RepositoryInitOptions, Signature};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Create an upstream git repository on branch `main` inside a new temp dir.
#[allow(dead_code)]
pub fn create_upstream() -> (TempDir, Repository) {
    let temp = TempDir::new().expect("failed to create temp dir");
    let mut options = RepositoryInitOptions::new();
    options.initial_head("main");
    let repo = Repository::init_opts(temp.path(), &options).expect("failed to init git repo");
    (temp, repo)
}

/// Write and commit files to an upstream repository.
#[allow(dead_code)]
pub fn commit_files(repo: &Repository, files: &[(&str, &str)]) {
    let workdir = repo.workdir().expect("repository has a working directory");
    let mut index = repo.index().expect("failed to open index");

    for (name, content) in files {
        let path = workdir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create directories");
        }
        fs::write(&path, content).expect("failed to write file");
        index.add_path(Path::new(name)).expect("failed to stage file");
    }
    index.write().expect("failed to write index");

    let tree = repo
        .find_tree(index.write_tree().expect("failed to write tree"))
        .expect("failed to find tree");
    let signature = Signature::now("Test User", "test@example.com").expect("signature");
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<_> = parent.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, "update", &tree, &parents)
        .expect("failed to commit");
}

/// URL of a local upstream repository.
#[allow(dead_code)]
pub fn url_of(temp: &TempDir) -> String {
    temp.path().to_str().expect("utf-8 temp path").to_string()
}

/// Convenience helper for spawning the configserver binary via assert_cmd.
#[allow(dead_code)]
pub fn configserver_cmd() -> Command {
    cargo_bin_cmd!("configserver")
}
