//! Integration tests for berth

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    fn berth() -> Command {
        let mut cmd = cargo_bin_cmd!("berth");
        cmd.env_remove("BERTH_CACHE_PREFIX")
            .env_remove("BERTH_PUSH_IMAGE_CACHE")
            .env_remove("BERTH_CACHE_DIR")
            .env_remove("BERTH_CONFIG");
        cmd
    }

    /// A checkout of github.com/acme/widgets with one Dockerfile
    fn checkout() -> TempDir {
        let repo = TempDir::new().unwrap();
        let git = git2::Repository::init(repo.path()).unwrap();
        git.remote("origin", "git@github.com:Acme/Widgets.git").unwrap();
        fs::create_dir_all(repo.path().join("tools/lint")).unwrap();
        fs::write(repo.path().join("tools/lint/Dockerfile"), "FROM scratch\n").unwrap();
        repo
    }

    #[test]
    fn help_displays() {
        berth()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Background containers"));
    }

    #[test]
    fn version_displays() {
        berth()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("berth"));
    }

    #[test]
    fn config_path() {
        berth()
            .args(["--no-local", "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        berth()
            .current_dir(dir.path())
            .args(["-c", "missing.toml", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn local_config_takes_effect() {
        let repo = checkout();
        fs::write(
            repo.path().join(".berth.toml"),
            "[cache]\nprefix = \"registry.local/team\"\n",
        )
        .unwrap();
        berth()
            .current_dir(repo.path())
            .args(["key", "tools/lint/Dockerfile"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("registry.local/team/tools/lint:"));
    }

    #[test]
    fn pull_missing_recipe() {
        let dir = TempDir::new().unwrap();
        berth()
            .current_dir(dir.path())
            .args(["--no-local", "pull", "nope/Dockerfile"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Recipe does not exist"));
    }

    #[test]
    fn key_derives_from_origin() {
        let repo = checkout();
        berth()
            .current_dir(repo.path())
            .args(["--no-local", "key", "tools/lint/Dockerfile"])
            .assert()
            .success()
            .stdout(predicate::str::is_match(r"^ghcr\.io/acme/widgets/tools/lint:[0-9a-f]{64}\n$").unwrap());
    }

    #[test]
    fn key_export_json() {
        let repo = checkout();
        berth()
            .current_dir(repo.path())
            .args(["--no-local", "key", "tools/lint/Dockerfile", "--export", "-f", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("tools/lint-dir:"))
            .stdout(predicate::str::contains(".cache"));
    }

    #[test]
    fn key_outside_repository() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        berth()
            .current_dir(dir.path())
            .args(["--no-local", "key", "Dockerfile"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Repository root not found"));
    }

    #[test]
    fn key_outside_repository_with_prefix_override() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        berth()
            .env("BERTH_CACHE_PREFIX", "localhost:5000/mirror")
            .current_dir(dir.path())
            .args(["--no-local", "key", "Dockerfile"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("localhost:5000/mirror/root:"));
    }

    #[test]
    fn run_rejects_bad_port() {
        berth()
            .args(["run", "alpine", "-p", "80"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("HOST:CONTAINER"));
    }
}
