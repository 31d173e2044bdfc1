//! Integration tests for Drydock

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    const PROJECT_CONFIG: &str = r#"
[general]
journal = false

[[axes]]
name = "python"
values = ["3.9", "3.10", "3.12"]
default = "3.12"

[[axes]]
name = "backend"
values = ["sqlite", "postgres"]
default = "sqlite"

[[exclude]]
python = "3.9"
backend = "postgres"

[image]
dockerfile = "Dockerfile.ci"
base_image = "python:{python}-slim"
build_args = { PYTHON_VERSION = "{python}", BACKEND = "{backend}" }

[[inputs]]
name = "requirements"
path = "requirements/{backend}.txt"
"#;

    /// A throwaway project with its own config and state directory
    struct Project {
        dir: TempDir,
    }

    impl Project {
        fn new() -> Self {
            Self::with_config(PROJECT_CONFIG)
        }

        fn with_config(config: &str) -> Self {
            let dir = TempDir::new().unwrap();
            fs::write(dir.path().join("drydock.toml"), config).unwrap();
            fs::write(dir.path().join("Dockerfile.ci"), "ARG BASE_IMAGE\nFROM ${BASE_IMAGE}\n").unwrap();
            fs::create_dir_all(dir.path().join("requirements")).unwrap();
            for backend in ["sqlite", "postgres"] {
                fs::write(
                    dir.path().join(format!("requirements/{}.txt", backend)),
                    "pytest==8.0\n",
                )
                .unwrap();
            }
            Self { dir }
        }

        fn drydock(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("drydock");
            cmd.current_dir(self.dir.path())
                .env("DRYDOCK_CONFIG", self.dir.path().join("global.toml"))
                .env("DRYDOCK_STATE_DIR", self.dir.path().join("state"))
                .env_remove("RUST_LOG");
            cmd
        }
    }

    #[test]
    fn help_displays() {
        Project::new()
            .drydock()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("build cache"));
    }

    #[test]
    fn version_displays() {
        Project::new()
            .drydock()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("drydock"));
    }

    #[test]
    fn matrix_defaults_to_one_cell() {
        Project::new()
            .drydock()
            .args(["matrix", "--format", "plain"])
            .assert()
            .success()
            .stdout("python=3.12,backend=sqlite\n");
    }

    #[test]
    fn matrix_all_is_ordered_and_excludes() {
        Project::new()
            .drydock()
            .args(["matrix", "--all", "--format", "plain"])
            .assert()
            .success()
            .stdout(
                "python=3.9,backend=sqlite\n\
                 python=3.10,backend=postgres\n\
                 python=3.10,backend=sqlite\n\
                 python=3.12,backend=postgres\n\
                 python=3.12,backend=sqlite\n",
            );
    }

    #[test]
    fn matrix_table_lists_axes() {
        Project::new()
            .drydock()
            .args(["matrix", "--axis", "python=3.10", "--axis", "backend=all"])
            .assert()
            .success()
            .stdout(predicate::str::contains("PYTHON").and(predicate::str::contains("2 cell(s)")));
    }

    #[test]
    fn empty_matrix_fails() {
        Project::new()
            .drydock()
            .args(["matrix", "--axis", "python=3.9", "--axis", "backend=postgres"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Matrix is empty"));
    }

    #[test]
    fn unknown_axis_value_fails() {
        Project::new()
            .drydock()
            .args(["matrix", "--axis", "python=2.7"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown value '2.7'"));
    }

    #[test]
    fn plan_reports_first_build() {
        Project::new()
            .drydock()
            .args(["plan", "--axis", "python=3.10,3.12", "--format", "plain"])
            .assert()
            .success()
            .stdout(
                "python=3.10,backend=sqlite\trebuild\tno-prior-build\n\
                 python=3.12,backend=sqlite\trebuild\tno-prior-build\n",
            );
    }

    #[test]
    fn plan_force_overrides() {
        Project::new()
            .drydock()
            .args(["plan", "--force", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("rebuild-forced\tuser-forced"));
    }

    #[test]
    fn plan_fails_for_missing_input() {
        let project = Project::new();
        fs::remove_file(project.dir.path().join("requirements/postgres.txt")).unwrap();

        project
            .drydock()
            .args(["plan", "--axis", "backend=all", "--format", "plain"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("python=3.12,backend=postgres\terror"))
            .stdout(predicate::str::contains("python=3.12,backend=sqlite\trebuild"))
            .stderr(predicate::str::contains("1 cell(s) could not be planned"));
    }

    #[test]
    fn ledger_starts_empty() {
        Project::new()
            .drydock()
            .args(["ledger", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No builds recorded"));
    }

    #[test]
    fn ledger_list_json_empty() {
        Project::new()
            .drydock()
            .args(["ledger", "list", "--format", "json"])
            .assert()
            .success()
            .stdout("[]\n");
    }

    #[test]
    fn ledger_forget_unknown_cell() {
        Project::new()
            .drydock()
            .args(["ledger", "forget", "python=3.12,backend=sqlite"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No record for python=3.12,backend=sqlite"));
    }

    #[test]
    fn ledger_clear_reports_count() {
        Project::new()
            .drydock()
            .args(["ledger", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("0 record(s) removed"));
    }

    #[test]
    fn config_show_merges_project_file() {
        Project::new()
            .drydock()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[dispatch]").and(predicate::str::contains("3.10")));
    }

    #[test]
    fn config_path_follows_env() {
        Project::new()
            .drydock()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("global.toml"));
    }

    #[test]
    fn invalid_config_is_reported() {
        Project::with_config("[[axes]]\nname = \"python\"\nvalues = []\n")
            .drydock()
            .args(["matrix"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("has no values"));
    }

    #[test]
    fn run_requires_a_command() {
        Project::new()
            .drydock()
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("required"));
    }

    #[test]
    fn run_without_engine_fails_cleanly() {
        let config = format!(
            "{}\n[engine]\nbinary = \"drydock-test-missing-engine\"\n",
            PROJECT_CONFIG
        );
        Project::with_config(&config)
            .drydock()
            .args(["run", "--", "pytest"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Container engine not found"));
    }

    #[test]
    fn completions_generate() {
        Project::new()
            .drydock()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("drydock"));
    }
}
