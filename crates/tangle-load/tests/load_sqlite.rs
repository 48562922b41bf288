use std::path::Path;

use tangle_load::{
    ColumnSpec, ForeignKey, GeneratorOverlay, GeneratorSpec, LoadError, LoadPlan, Loader, LoaderSettings, MemorySource,
    MemoryStore, Row, SqliteStore, TableLoad, TableSpec, Value, row,
};

fn sequence() -> GeneratorSpec {
    GeneratorSpec::Sequence { start: 1, step: 1 }
}

/// T1 needs T3, T2 needs T1, T3 optionally points at T2.
fn triangle() -> Vec<TableLoad> {
    vec![
        TableLoad::new(
            TableSpec::new("t1")
                .column(ColumnSpec::new("id").generated(sequence()))
                .column(ColumnSpec::new("code").required())
                .foreign_key(ForeignKey::new("t3_id", "t3").by("t3_code", "code")),
        )
        .with_source(MemorySource::new(vec![
            row([("code", "a1"), ("t3_code", "c1")]),
            row([("code", "a2"), ("t3_code", "c2")]),
        ])),
        TableLoad::new(
            TableSpec::new("t2")
                .column(ColumnSpec::new("id").generated(sequence()))
                .column(ColumnSpec::new("code").required())
                .foreign_key(ForeignKey::new("t1_id", "t1").by("t1_code", "code")),
        )
        .with_source(MemorySource::new(vec![row([("code", "b1"), ("t1_code", "a2")])])),
        TableLoad::new(
            TableSpec::new("t3")
                .column(ColumnSpec::new("id").generated(sequence()))
                .column(ColumnSpec::new("code").required())
                .foreign_key(ForeignKey::new("t2_id", "t2").by("t2_code", "code").nullable())
                .key(["code"]),
        )
        .with_source(MemorySource::new(vec![
            row([("code", "c1"), ("t2_code", "b1")]),
            row([("code", "c2"), ("t2_code", "nope")]),
        ])),
    ]
}

fn create_tables(path: &Path, plan: &LoadPlan) {
    let store = SqliteStore::open(path).expect("open");
    for table in plan.order() {
        store.ensure_table(table.name(), &table.spec.all_columns()).expect("create table");
    }
}

fn query_pairs(store: &SqliteStore, sql: &str) -> Vec<(String, Option<i64>)> {
    let mut stmt = store.connection().prepare(sql).expect("prepare");
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .expect("query")
        .collect::<Result<_, _>>()
        .expect("rows")
}

#[test]
fn triangle_loads_with_deferred_nullable_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("load.db");
    let plan = LoadPlan::build(triangle(), false).expect("plan");
    assert_eq!(plan.table_names(), vec!["t3", "t1", "t2"]);
    create_tables(&path, &plan);

    let mut store = SqliteStore::open(&path).expect("open");
    let report = Loader::new(&plan, LoaderSettings::default())
        .run(&mut store)
        .expect("load");

    assert_eq!(report.tables["t1"].inserted, 2);
    assert_eq!(report.tables["t2"].inserted, 1);
    assert_eq!(report.tables["t3"].inserted, 2);
    assert_eq!(report.tables["t3"].updated, 1);
    assert_eq!(report.tables["t3"].unresolved, 1);

    let t3 = query_pairs(&store, "SELECT code, t2_id FROM t3 ORDER BY code");
    assert_eq!(t3, vec![("c1".to_string(), Some(1)), ("c2".to_string(), None)]);
    let t1 = query_pairs(&store, "SELECT code, t3_id FROM t1 ORDER BY code");
    assert_eq!(t1, vec![("a1".to_string(), Some(1)), ("a2".to_string(), Some(2))]);
    let t2 = query_pairs(&store, "SELECT code, t1_id FROM t2");
    assert_eq!(t2, vec![("b1".to_string(), Some(2))]);
}

#[test]
fn missing_required_key_reports_the_lookup() {
    let tables = vec![
        TableLoad::new(TableSpec::new("customer").column(ColumnSpec::new("id")).column(ColumnSpec::new("email")))
            .with_source(MemorySource::new(vec![row([("id", Value::Integer(1)), ("email", "a@x.io".into())])])),
        TableLoad::new(
            TableSpec::new("orders")
                .column(ColumnSpec::new("number"))
                .foreign_key(ForeignKey::new("customer_id", "customer").by("email", "email")),
        )
        .with_source(MemorySource::new(vec![
            row([("number", "1"), ("email", "a@x.io")]),
            row([("number", "2"), ("email", "ghost@x.io")]),
        ])),
    ];
    let plan = LoadPlan::build(tables, false).expect("plan");
    let mut store = MemoryStore::new();
    let err = Loader::new(&plan, LoaderSettings::default())
        .run(&mut store)
        .expect_err("unresolved");

    match err {
        LoadError::UnresolvedForeignKey {
            table,
            row: index,
            attempted,
            ..
        } => {
            assert_eq!(table, "orders");
            assert_eq!(index, 1);
            assert_eq!(attempted, "email=ghost@x.io");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.rows("orders").len(), 1);
}

#[test]
fn required_columns_are_generated_or_rejected() {
    let spec = TableSpec::new("item")
        .column(ColumnSpec::new("sku").required().generated(GeneratorSpec::Template {
            template: "sku-{seq}".into(),
        }))
        .column(ColumnSpec::new("name").required());
    let tables = vec![TableLoad::new(spec).with_source(MemorySource::new(vec![
        row([("name", "bolt")]),
        row([("sku", "given"), ("name", "nut")]),
    ]))];
    let plan = LoadPlan::build(tables, false).expect("plan");
    let mut store = MemoryStore::new();
    Loader::new(&plan, LoaderSettings::default())
        .run(&mut store)
        .expect("load");
    let skus: Vec<Value> = store.rows("item").into_iter().map(|r| r["sku"].clone()).collect();
    assert_eq!(skus, vec![Value::from("sku-0"), Value::from("given")]);

    let tables = vec![
        TableLoad::new(TableSpec::new("item").column(ColumnSpec::new("name").required()))
            .with_source(MemorySource::new(vec![row([("other", "x")])])),
    ];
    let plan = LoadPlan::build(tables, false).expect("plan");
    let err = Loader::new(&plan, LoaderSettings::default())
        .run(&mut MemoryStore::new())
        .expect_err("missing");
    assert!(matches!(err, LoadError::MissingValue { ref column, .. } if column == "name"));
}

#[test]
fn overlay_replaces_declared_generator() {
    let tables = vec![
        TableLoad::new(TableSpec::new("t").column(ColumnSpec::new("id").generated(sequence())))
            .with_source(MemorySource::new(vec![Row::new(), Row::new()])),
    ];
    let plan = LoadPlan::build(tables, false).expect("plan");
    let store = MemoryStore::new();
    Loader::new(&plan, LoaderSettings::default())
        .with_overlay(GeneratorOverlay::new().with("t", "id", GeneratorSpec::Sequence { start: 100, step: 10 }))
        .run(&mut store.clone())
        .expect("load");
    let ids: Vec<Value> = store.rows("t").into_iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![Value::Integer(100), Value::Integer(110)]);
}

#[test]
fn batches_commit_on_row_count_and_table_end() {
    let rows = (0..5).map(|i| row([("n", Value::Integer(i))])).collect();
    let tables = vec![
        TableLoad::new(TableSpec::new("t").column(ColumnSpec::new("n"))).with_source(MemorySource::new(rows)),
    ];
    let plan = LoadPlan::build(tables, false).expect("plan");
    let store = MemoryStore::new();
    let settings = LoaderSettings {
        batch_size: 2,
        ..LoaderSettings::default()
    };
    let report = Loader::new(&plan, settings).run(&mut store.clone()).expect("load");
    // 2 + 2 + trailing 1.
    assert_eq!(report.commits, 3);
    assert_eq!(store.flushes(), 3);
}
