//! CLI integration tests
//!
//! Help and error paths run everywhere. Tests that call into the native
//! library need the snopher-native cdylib next to the test binaries and are
//! skipped when it has not been built.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Command isolated from the caller's settings: empty HOME and working
/// directory, no SNOPHER_* variables.
fn snopher_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("snopher").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env_remove("SNOPHER_LIBRARY")
        .env_remove("SNOPHER_STRING_CAPACITY")
        .env_remove("SNOPHER_LOG");
    cmd
}

fn native_library() -> Option<PathBuf> {
    let bin = PathBuf::from(env!("CARGO_BIN_EXE_snopher"));
    let dir = bin.parent()?;
    let file = format!("{}snopher_native{}", DLL_PREFIX, DLL_SUFFIX);
    [dir.join(&file), dir.join("deps").join(&file)]
        .into_iter()
        .find(|p| p.is_file())
}

/// Runs `args` against the built cdylib, or returns `None` to skip.
fn with_library(args: &[&str]) -> Option<assert_cmd::assert::Assert> {
    let Some(lib) = native_library() else {
        eprintln!("skipping: snopher_native cdylib not built");
        return None;
    };
    let home = TempDir::new().unwrap();
    Some(snopher_cmd(&home).arg("--lib").arg(&lib).args(args).assert())
}

// ══════════════════════════════════════════════════════════════════════════════
// HELP AND ARGUMENT TESTS
// ══════════════════════════════════════════════════════════════════════════════

mod help_messages {
    use super::*;

    #[test]
    fn test_main_help_shows_all_commands() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("add"))
            .stdout(predicate::str::contains("squares"))
            .stdout(predicate::str::contains("normalize"))
            .stdout(predicate::str::contains("increase"))
            .stdout(predicate::str::contains("repeat"))
            .stdout(predicate::str::contains("user-info"))
            .stdout(predicate::str::contains("sqrts"))
            .stdout(predicate::str::contains("describe"));
    }

    #[test]
    fn test_main_help_shows_environment_variables() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("SNOPHER_LIBRARY"))
            .stdout(predicate::str::contains("SNOPHER_LOG"));
    }

    #[test]
    fn test_unknown_command_fails() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .arg("frobnicate")
            .assert()
            .failure()
            .stderr(predicate::str::contains("unrecognized subcommand"));
    }

    #[test]
    fn test_add_requires_integers() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .args(["add", "ten", "15"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid value"));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION ERRORS
// ══════════════════════════════════════════════════════════════════════════════

mod configuration {
    use super::*;

    #[test]
    fn test_missing_library_is_reported() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .args(["add", "1", "2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No native library configured"));
    }

    #[test]
    fn test_nonexistent_library_path() {
        let home = TempDir::new().unwrap();
        let missing = home.path().join("libmissing.so");
        snopher_cmd(&home)
            .arg("--lib")
            .arg(&missing)
            .args(["add", "1", "2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to load native library"));
    }

    #[test]
    fn test_invalid_settings_file() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("snopher.toml"), "[buffers]\nsize = 1\n").unwrap();
        snopher_cmd(&home)
            .args(["add", "1", "2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("snopher.toml"));
    }

    #[test]
    fn test_invalid_env_capacity() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .env("SNOPHER_STRING_CAPACITY", "many")
            .args(["add", "1", "2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("SNOPHER_STRING_CAPACITY"));
    }

    #[test]
    fn test_invalid_log_flag() {
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .args(["--log", "chatty", "add", "1", "2"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--log"));
    }

    #[test]
    fn test_library_from_settings_file() {
        let Some(lib) = native_library() else {
            return;
        };
        let home = TempDir::new().unwrap();
        let settings = format!("[library]\npath = {:?}\n", lib.display().to_string());
        std::fs::write(home.path().join("snopher.toml"), settings).unwrap();
        snopher_cmd(&home)
            .args(["add", "10", "15"])
            .assert()
            .success()
            .stdout("25\n");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// NATIVE CALLS
// ══════════════════════════════════════════════════════════════════════════════

mod native_calls {
    use super::*;

    #[test]
    fn test_add() {
        if let Some(assert) = with_library(&["add", "10", "15"]) {
            assert.success().stdout("25\n");
        }
    }

    #[test]
    fn test_add_negative() {
        if let Some(assert) = with_library(&["add", "-4", "4"]) {
            assert.success().stdout("0\n");
        }
    }

    #[test]
    fn test_squares() {
        if let Some(assert) = with_library(&["squares", "1", "2", "3"]) {
            assert.success().stdout("1 4 9\n");
        }
    }

    #[test]
    fn test_dot() {
        if let Some(assert) = with_library(&["dot", "--a", "1,2,3", "--b", "4,5,6"]) {
            assert.success().stdout("32\n");
        }
    }

    #[test]
    fn test_increase() {
        if let Some(assert) = with_library(&["increase", "--by", "5", "20", "30", "40"]) {
            assert.success().stdout("25 35 45\n");
        }
    }

    #[test]
    fn test_increase_int32_refused() {
        if let Some(assert) = with_library(&["increase", "--dtype", "int32", "20"]) {
            assert
                .failure()
                .stderr(predicate::str::contains("Type mismatch"));
        }
    }

    #[test]
    fn test_increase_int32_converted() {
        if let Some(assert) =
            with_library(&["increase", "--dtype", "int32", "--convert", "--by", "5", "20"])
        {
            assert.success().stdout("25\n");
        }
    }

    #[test]
    fn test_repeat() {
        if let Some(assert) = with_library(&["repeat", "Badger", "4"]) {
            assert.success().stdout("BadgerBadgerBadgerBadger\n");
        }
    }

    #[test]
    fn test_repeat_over_capacity() {
        if let Some(assert) =
            with_library(&["--string-capacity", "8", "repeat", "Badger", "4"])
        {
            assert
                .failure()
                .stderr(predicate::str::contains("does not fit"));
        }
    }

    #[test]
    fn test_join() {
        if let Some(assert) = with_library(&["join", "-s", "a", "yab", "dab", "doo!"]) {
            assert.success().stdout("yabadabadoo!\n");
        }
    }

    #[test]
    fn test_fill() {
        if let Some(assert) = with_library(&["fill", "John", "Galt"]) {
            assert.success().stdout("John Galt\n");
        }
    }

    #[test]
    fn test_even() {
        if let Some(assert) = with_library(&["even", "-5"]) {
            assert.success().stdout("false\n");
        }
    }

    #[test]
    fn test_even_non_negative_fault() {
        if let Some(assert) = with_library(&["even", "-5", "--non-negative"]) {
            assert
                .failure()
                .stderr(predicate::str::contains("-5 is negative, want at least 0"));
        }
    }

    #[test]
    fn test_user_info() {
        if let Some(assert) = with_library(&["user-info", "Alice", "Bob"]) {
            assert.success().stdout(
                "User \"Alice\" has 5 letters in their name\n\
                 User \"Bob\" has 3 letters in their name\n",
            );
        }
    }

    #[test]
    fn test_user_info_json() {
        let Some(assert) = with_library(&["user-info", "--json", "Ada"]) else {
            return;
        };
        let output = assert.success().get_output().stdout.clone();
        let records: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(records[0]["name"], "Ada");
        assert_eq!(records[0]["name_length"], 3);
    }

    #[test]
    fn test_sqrts() {
        if let Some(assert) = with_library(&["sqrts", "4"]) {
            assert
                .success()
                .stdout(predicate::str::starts_with("Square roots up to 4:\n1 "));
        }
    }

    #[test]
    fn test_iota() {
        if let Some(assert) = with_library(&["iota", "4"]) {
            assert.success().stdout("0 1 2 3\n");
        }
    }

    #[test]
    fn test_iota_zero_prints_empty_line() {
        if let Some(assert) = with_library(&["iota", "0"]) {
            assert.success().stdout("\n");
        }
    }

    #[test]
    fn test_describe_json_lists_catalog() {
        let Some(assert) = with_library(&["describe", "--json"]) else {
            return;
        };
        let output = assert.success().get_output().stdout.clone();
        let entries: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let entries = entries.as_array().unwrap();
        assert_eq!(entries.len(), 18);
        assert_eq!(entries[0]["name"], "add");
        assert_eq!(entries[0]["display"], "(i64,i64)->i64");
    }

    #[test]
    fn test_log_flag_overrides_environment() {
        let Some(lib) = native_library() else {
            return;
        };
        let home = TempDir::new().unwrap();
        snopher_cmd(&home)
            .env("SNOPHER_LOG", "error")
            .arg("--lib")
            .arg(&lib)
            .args(["--log", "debug", "add", "1", "2"])
            .assert()
            .success()
            .stdout("3\n")
            .stderr(predicate::str::contains("native bindings resolved"));
    }

    #[test]
    fn test_verbose_logs_to_stderr() {
        if let Some(assert) = with_library(&["-v", "add", "1", "2"]) {
            assert
                .success()
                .stdout("3\n")
                .stderr(predicate::str::contains("native bindings resolved"));
        }
    }
}
