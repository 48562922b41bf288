//! End-to-end runs of the `tangle` binary against the fixture model and plan.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn tangle_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("tangle"));
    cmd.current_dir(dir);
    cmd.env("TANGLE_LOG", "error");
    cmd.env_remove("FORMAT");
    cmd
}

fn run_json(dir: &Path, args: &[&str]) -> Value {
    let output = tangle_cmd(dir)
        .args(args)
        .args(["--format", "json"])
        .output()
        .expect("tangle should not crash");
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON")
}

fn model() -> String {
    fixture("shop.toml").display().to_string()
}

#[test]
fn types_orders_referenced_types_first() {
    let dir = TempDir::new().expect("tempdir");
    let json = run_json(dir.path(), &["types", "-m", &model(), "-r", "Customer", "--extend-scope"]);

    let names: Vec<&str> = json["types"]
        .as_array()
        .expect("types array")
        .iter()
        .map(|t| t["name"].as_str().expect("name"))
        .collect();
    let at = |name: &str| names.iter().position(|n| *n == name).expect("present");
    assert!(at("Line") < at("Order"));
    assert!(at("Order") < at("Customer"));
    assert!(at("Party") < at("Customer"));

    let ids: Vec<u64> = json["types"]
        .as_array()
        .expect("types array")
        .iter()
        .map(|t| t["id"].as_u64().expect("id"))
        .collect();
    assert_eq!(ids, (1..=names.len() as u64).collect::<Vec<_>>());
}

#[test]
fn cycles_reports_ownership_loops() {
    let dir = TempDir::new().expect("tempdir");
    let json = run_json(dir.path(), &["cycles", "-m", &model(), "-r", "Customer"]);
    let cycles = json["cycles"].as_array().expect("cycles array");
    assert!(cycles.len() >= 2);
    assert!(cycles.iter().any(|c| c["path"].as_str().is_some_and(|p| p.contains("-[orders]->"))));
    assert!(cycles.iter().any(|c| c["path"].as_str().is_some_and(|p| p.contains("-[lines]->"))));
}

#[test]
fn export_writes_dot_to_stdout() {
    let dir = TempDir::new().expect("tempdir");
    tangle_cmd(dir.path())
        .args(["export", "-m", &model(), "-r", "Customer", "--format", "text"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("digraph tangle {"))
        .stdout(predicate::str::contains("label=\"Customer\""));
}

#[test]
fn export_graphml_to_file() {
    let dir = TempDir::new().expect("tempdir");
    let out = dir.path().join("shop.graphml");
    tangle_cmd(dir.path())
        .args(["export", "-m", &model(), "-r", "Customer", "--to", "graphml", "--sorted", "--out"])
        .arg(&out)
        .assert()
        .success();
    let document = std::fs::read_to_string(&out).expect("graphml written");
    assert!(document.contains("<graphml"));
}

#[test]
fn path_walks_inherited_and_collection_properties() {
    let dir = TempDir::new().expect("tempdir");
    let json = run_json(dir.path(), &["path", "-m", &model(), "-r", "Customer", "orders.lines.product"]);
    assert_eq!(json["reachable"], true);

    let json = run_json(dir.path(), &["path", "-m", &model(), "-r", "Customer", "orders.nope"]);
    assert_eq!(json["reachable"], false);
}

#[test]
fn malformed_path_fails_with_code() {
    let dir = TempDir::new().expect("tempdir");
    tangle_cmd(dir.path())
        .args(["path", "-m", &model(), "-r", "Customer", "orders..product", "--format", "json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E2007"));
}

#[test]
fn sample_creation_mirrors_deletion() {
    let dir = TempDir::new().expect("tempdir");
    let json = run_json(dir.path(), &["sample", "-m", &model(), "-r", "Customer", "--depth", "2"]);
    let creation: Vec<&str> = json["creation"]
        .as_array()
        .expect("creation")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    let mut deletion: Vec<&str> = json["deletion"]
        .as_array()
        .expect("deletion")
        .iter()
        .filter_map(Value::as_str)
        .collect();
    deletion.reverse();
    assert!(!creation.is_empty());
    assert_eq!(creation, deletion);
    assert!(json["objects"].as_u64().expect("objects") >= creation.len() as u64);
}

#[test]
fn plan_lists_insert_and_update_passes() {
    let dir = TempDir::new().expect("tempdir");
    let plan = fixture("load/plan.toml").display().to_string();
    let json = run_json(dir.path(), &["plan", "--plan", &plan]);
    assert_eq!(json["insert_order"], serde_json::json!(["customer", "orders"]));
    assert_eq!(json["update_tables"], serde_json::json!(["customer"]));
    assert_eq!(json["settings"]["batch_size"], 2);
}

#[test]
fn load_fills_sqlite_in_dependency_order() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("shop.db");
    let plan = fixture("load/plan.toml").display().to_string();
    let db_arg = db.display().to_string();
    let json = run_json(dir.path(), &["load", "--plan", &plan, "--db", &db_arg, "--create-tables"]);

    assert_eq!(json["tables"]["customer"]["inserted"], 3);
    assert_eq!(json["tables"]["customer"]["updated"], 1);
    assert_eq!(json["tables"]["customer"]["unresolved"], 2);
    assert_eq!(json["tables"]["orders"]["inserted"], 3);

    let conn = rusqlite::Connection::open(&db).expect("open db");
    let referrer: Option<i64> = conn
        .query_row("SELECT referrer_id FROM customer WHERE email = 'bob@x.io'", [], |r| r.get(0))
        .expect("bob");
    assert_eq!(referrer, Some(1));
    let orphans: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM orders o LEFT JOIN customer c ON c.id = o.customer_id WHERE c.id IS NULL",
            [],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(orphans, 0);
}

#[test]
fn sharded_load_matches_single_worker() {
    let dir = TempDir::new().expect("tempdir");
    let db = dir.path().join("sharded.db");
    let plan = fixture("load/plan.toml").display().to_string();
    let db_arg = db.display().to_string();
    let json = run_json(
        dir.path(),
        &["load", "--plan", &plan, "--db", &db_arg, "--create-tables", "--shards", "2"],
    );
    assert_eq!(json["tables"]["orders"]["inserted"], 3);

    let conn = rusqlite::Connection::open(&db).expect("open db");
    let customers: i64 = conn
        .query_row("SELECT COUNT(*) FROM customer", [], |r| r.get(0))
        .expect("count");
    assert_eq!(customers, 3);
}

#[test]
fn plan_without_natural_key_reports_code_and_hint() {
    let dir = TempDir::new().expect("tempdir");
    let plan = dir.path().join("plan.toml");
    std::fs::write(
        &plan,
        r#"
[[table]]
name = "node"
columns = [{ name = "id" }]
foreign_keys = [{ column = "parent_id", target = "node", nullable = true }]
"#,
    )
    .expect("write plan");

    tangle_cmd(dir.path())
        .args(["plan", "--plan"])
        .arg(&plan)
        .args(["--format", "json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error_code\": \"E3003\""))
        .stderr(predicate::str::contains("suggestion"));
}

#[test]
fn format_env_selects_text_output() {
    let dir = TempDir::new().expect("tempdir");
    let plan = fixture("load/plan.toml").display().to_string();
    tangle_cmd(dir.path())
        .env("FORMAT", "text")
        .args(["plan", "--plan", &plan])
        .assert()
        .success()
        .stdout("insert\tcustomer\ninsert\torders\nupdate\tcustomer\n");
}
