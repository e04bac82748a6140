//! Integration tests for kiln

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn kiln() -> Command {
        cargo_bin_cmd!("kiln")
    }

    /// A scratch directory with a config file that keeps every path inside it
    struct Sandbox {
        dir: TempDir,
    }

    impl Sandbox {
        fn new(extra: &str) -> Self {
            let dir = TempDir::new().unwrap();
            let config = format!(
                "[cache]\nroot = '{}'\nnamespace = 'kiln-it'\n\n[packages]\nstore = '{}'\n\n{}",
                dir.path().join("cache").display(),
                dir.path().join("store").display(),
                extra
            );
            std::fs::write(dir.path().join("config.toml"), config).unwrap();
            Self { dir }
        }

        fn path(&self) -> &Path {
            self.dir.path()
        }

        fn config(&self) -> PathBuf {
            self.dir.path().join("config.toml")
        }

        fn source(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        }

        fn cmd(&self) -> Command {
            let mut cmd = kiln();
            cmd.arg("--config").arg(self.config());
            cmd
        }
    }

    /// Shell-based toolchain: the "compiler" concatenates sources, the runner is `sh`
    const SHELL_TOOLCHAIN: &str = r#"
[compiler]
program = "sh"
args = ['-c', 'cat "$@" > "$0"', '{artifact}', '{sources}']

[runner]
program = "sh"
"#;

    #[test]
    fn help_displays() {
        kiln()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("compile-and-run"));
    }

    #[test]
    fn version_displays() {
        kiln()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln"));
    }

    #[test]
    fn config_path() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("kiln-it"));
    }

    #[test]
    fn config_init_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        kiln()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success();
        assert!(path.exists());

        kiln()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn config_from_env() {
        let sandbox = Sandbox::new("");
        kiln()
            .env("KILN_CONFIG", sandbox.config())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(sandbox.path().display().to_string()));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[cache\n").unwrap();

        kiln()
            .arg("--config")
            .arg(&path)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn run_without_files_fails() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .arg("run")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No source files"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn build_lists_every_missing_file() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["build", "Missing1.cs", "Missing2.cs"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Missing1.cs"))
            .stderr(predicate::str::contains("Missing2.cs"));
    }

    #[test]
    fn packages_resolves_directives() {
        let sandbox = Sandbox::new("");
        let main = sandbox.source(
            "Program.cs",
            "// Package: Foo 1.0.0\n/* Package: Foo 2.3.1\n   Package: Bar 0.9.0-beta1 */\nclass P {}\n",
        );

        sandbox
            .cmd()
            .args(["packages", "--format", "plain"])
            .arg(&main)
            .assert()
            .success()
            .stdout(predicate::str::contains("Bar 0.9.0-beta1\nFoo 2.3.1"));
    }

    #[test]
    fn packages_transitive_uses_store() {
        let sandbox = Sandbox::new("");
        let foo = sandbox.path().join("store/Foo/1.0.0");
        std::fs::create_dir_all(&foo).unwrap();
        std::fs::write(
            foo.join("package.toml"),
            "[package]\nname = \"Foo\"\nversion = \"1.0.0\"\n\n[dependencies]\nBar = \">=1.1.0\"\n",
        )
        .unwrap();
        std::fs::create_dir_all(sandbox.path().join("store/Bar/1.1.0")).unwrap();
        std::fs::create_dir_all(sandbox.path().join("store/Bar/2.0.0")).unwrap();
        let main = sandbox.source("Program.cs", "// Package: Foo 1.0.0\n");

        sandbox
            .cmd()
            .args(["packages", "--transitive", "--format", "json"])
            .arg(&main)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"Bar\": \"1.1.0\""))
            .stdout(predicate::str::contains("\"Foo\": \"1.0.0\""));
    }

    #[test]
    fn packages_transitive_reports_missing() {
        let sandbox = Sandbox::new("");
        let main = sandbox.source("Program.cs", "// Package: Ghost 1.0.0\n");

        sandbox
            .cmd()
            .args(["packages", "--transitive"])
            .arg(&main)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Packages not found"))
            .stderr(predicate::str::contains("Ghost"));
    }

    #[test]
    fn cache_path_is_under_configured_root() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["cache", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("kiln-it"));
    }

    #[test]
    fn cache_list_empty() {
        let sandbox = Sandbox::new("");
        sandbox
            .cmd()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No cached builds found"));
    }

    #[cfg(unix)]
    #[test]
    fn second_build_reuses_artifact() {
        let sandbox = Sandbox::new(SHELL_TOOLCHAIN);
        let main = sandbox.source("main.sh", "echo hello\n");

        sandbox
            .cmd()
            .arg("build")
            .arg(&main)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("built "));

        sandbox
            .cmd()
            .arg("build")
            .arg(&main)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("reused "));

        std::fs::write(&main, "echo changed\n").unwrap();
        sandbox
            .cmd()
            .arg("build")
            .arg(&main)
            .assert()
            .success()
            .stdout(predicate::str::starts_with("built "));
    }

    #[cfg(unix)]
    #[test]
    fn concurrent_processes_compile_once() {
        const PROCESSES: usize = 4;

        let scratch = TempDir::new().unwrap();
        let counter = scratch.path().join("compiles.log");
        let sandbox = Sandbox::new(&format!(
            "[compiler]\nprogram = 'sh'\nargs = ['-c', 'echo compiled >> \"$1\"; sleep 1; cat \"$2\" > \"$0\"', '{{artifact}}', '{}', '{{sources}}']\n",
            counter.display()
        ));
        let main = sandbox.source("main.sh", "echo shared\n");

        let outputs: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..PROCESSES)
                .map(|_| {
                    scope.spawn(|| {
                        let output = sandbox.cmd().arg("build").arg(&main).output().unwrap();
                        assert!(
                            output.status.success(),
                            "build failed: {}",
                            String::from_utf8_lossy(&output.stderr)
                        );
                        String::from_utf8(output.stdout).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let compiles = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(compiles.lines().count(), 1);
        assert_eq!(outputs.iter().filter(|o| o.starts_with("built ")).count(), 1);
        assert_eq!(
            outputs.iter().filter(|o| o.starts_with("reused ")).count(),
            PROCESSES - 1
        );
    }

    #[cfg(unix)]
    #[test]
    fn failed_compile_is_not_reused() {
        let sandbox = Sandbox::new(
            "[compiler]\nprogram = 'sh'\nargs = ['-c', 'echo partial > \"$0\"; exit 1', '{artifact}']\n",
        );
        let main = sandbox.source("Program.cs", "class P {");

        for _ in 0..2 {
            sandbox
                .cmd()
                .arg("build")
                .arg(&main)
                .assert()
                .failure()
                .stderr(predicate::str::contains("Compilation failed"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn run_passes_args_and_exit_code() {
        let sandbox = Sandbox::new(SHELL_TOOLCHAIN);
        let main = sandbox.source("main.sh", "echo \"hello-$1\"\nexit 7\n");

        sandbox
            .cmd()
            .arg("run")
            .arg(&main)
            .args(["--", "world"])
            .assert()
            .code(7)
            .stdout(predicate::str::contains("hello-world"));
    }

    #[cfg(unix)]
    #[test]
    fn compile_failure_shows_output() {
        let sandbox = Sandbox::new(
            "[compiler]\nprogram = 'sh'\nargs = ['-c', 'echo \"error CS1002: ; expected\" >&2; exit 1']\n",
        );
        let main = sandbox.source("Program.cs", "class P {");

        sandbox
            .cmd()
            .arg("build")
            .arg(&main)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Compilation failed"))
            .stderr(predicate::str::contains("error CS1002"));
    }

    #[cfg(unix)]
    #[test]
    fn cache_list_and_clear() {
        let sandbox = Sandbox::new(SHELL_TOOLCHAIN);
        let main = sandbox.source("main.sh", "echo cached\n");
        sandbox.cmd().arg("build").arg(&main).assert().success();

        sandbox
            .cmd()
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"state\": \"complete\""));

        sandbox
            .cmd()
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1 build(s)"));

        sandbox
            .cmd()
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty());
    }
}
