//! Integration tests for the command-line interface
//!
//! Drives the built binary through apply, status and verify.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const UNMIGRATED: &str = "router.get('/:id', async (req: any, res: Response) => {
    try {
        const client = await MongoClient.connect(MONGODB_URI)
        const db = client.db()
        const user = await db.collection('users').findOne({ _id: req.params.id })
        await client.close()
        res.json({ user })
    } catch (error) {
        res.status(500).json({ message: 'Failed' })
    }
})
";

const MIGRATED: &str = "router.get('/:id', async (req: any, res: Response) => {
    try {
        const db = await getDatabase()
        const user = await db.collection('users').findOne({ _id: req.params.id })
res.json({ user })
    } catch (error) {
        res.status(500).json({ message: 'Failed' })
    }
})
";

/// Helper to create a workspace holding one route module
fn setup_route(contents: &str) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src/routes")).unwrap();
    fs::write(dir.path().join("src/routes/users.ts"), contents).unwrap();
    dir
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_conn-rewriter"))
        .args(args)
        .current_dir(cwd)
        .env("NO_COLOR", "1")
        .output()
        .unwrap()
}

#[test]
fn test_apply_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_conn-rewriter"))
        .args(["apply", "--help"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Rewrite the target file in place"));
}

#[test]
fn test_apply_default_target() {
    let workspace = setup_route(UNMIGRATED);

    let output = run(&["apply"], workspace.path());

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Migrated src/routes/users.ts to getDatabase() helper"));

    let content = fs::read_to_string(workspace.path().join("src/routes/users.ts")).unwrap();
    assert_eq!(content, MIGRATED);
}

#[test]
fn test_apply_explicit_path() {
    let workspace = setup_route("");
    let other = workspace.path().join("chat.ts");
    fs::write(&other, UNMIGRATED).unwrap();

    let output = run(&["apply", other.to_str().unwrap()], workspace.path());

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(&other).unwrap(), MIGRATED);
}

#[test]
fn test_apply_idempotent() {
    let workspace = setup_route(UNMIGRATED);

    let first = run(&["apply"], workspace.path());
    assert!(first.status.success());

    let second = run(&["apply"], workspace.path());
    assert!(second.status.success());
    let stdout = String::from_utf8_lossy(&second.stdout);
    assert!(stdout.contains("already uses getDatabase() helper"));

    let content = fs::read_to_string(workspace.path().join("src/routes/users.ts")).unwrap();
    assert_eq!(content, MIGRATED);
}

#[test]
fn test_apply_dry_run_with_diff() {
    let workspace = setup_route(UNMIGRATED);

    let output = run(&["apply", "--dry-run", "--diff"], workspace.path());

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("collapse-client-connect x1, drop-client-close x1"));
    assert!(stdout.contains("@@ -1,9 +1,7 @@"));
    assert!(stdout.contains("-        const client = await MongoClient.connect(MONGODB_URI)"));
    assert!(stdout.contains("+        const db = await getDatabase()"));
    assert!(stdout.contains("Would migrate"));

    let content = fs::read_to_string(workspace.path().join("src/routes/users.ts")).unwrap();
    assert_eq!(content, UNMIGRATED);
}

#[test]
fn test_apply_json_report() {
    let workspace = setup_route(UNMIGRATED);

    let output = run(&["apply", "--json"], workspace.path());

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["outcome"]["status"], "rewritten");
    assert_eq!(report["rules"][1]["id"], "collapse-client-connect");
    assert_eq!(report["rules"][1]["replacements"], 1);
    assert_eq!(report["rules"][2]["replacements"], 1);
}

#[test]
fn test_apply_missing_file_fails() {
    let workspace = TempDir::new().unwrap();

    let output = run(&["apply"], workspace.path());

    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("users.ts"));
}

#[test]
fn test_status_counts_remaining() {
    let workspace = setup_route(UNMIGRATED);

    let output = run(&["status"], workspace.path());

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("collapse-client-connect: 1 remaining"));
    assert!(stdout.contains("drop-client-close: 1 remaining"));
    assert!(stdout.contains("NOT MIGRATED"));

    // status never writes
    let content = fs::read_to_string(workspace.path().join("src/routes/users.ts")).unwrap();
    assert_eq!(content, UNMIGRATED);
}

#[test]
fn test_verify_exit_codes() {
    let workspace = setup_route(UNMIGRATED);

    let before = run(&["verify"], workspace.path());
    assert_eq!(before.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&before.stderr);
    assert!(stderr.contains("MISMATCH"));

    assert!(run(&["apply"], workspace.path()).status.success());

    let after = run(&["verify"], workspace.path());
    assert!(after.status.success());
    let stdout = String::from_utf8_lossy(&after.stdout);
    assert!(stdout.contains("3 verified"));
}
