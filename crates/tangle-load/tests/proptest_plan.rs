use proptest::prelude::*;
use tangle_load::{ColumnSpec, ForeignKey, LoadPass, LoadPlan, TableLoad, TableSpec};

/// Tables `t0..tn`. Each `(a, b, nullable)` link with `a > b` gives `ta` a
/// foreign key to `tb`, so required keys never form a cycle.
fn arb_tables() -> impl Strategy<Value = (usize, Vec<(usize, usize, bool)>)> {
    (2usize..8).prop_flat_map(|n| (Just(n), prop::collection::vec((0..n, 0..n, any::<bool>()), 0..16)))
}

fn tables(n: usize, links: &[(usize, usize, bool)]) -> Vec<TableLoad> {
    (0..n)
        .map(|i| {
            let mut spec = TableSpec::new(format!("t{i}")).column(ColumnSpec::new("code")).key(["code"]);
            for (k, &(a, b, nullable)) in links.iter().enumerate() {
                let (from, to) = if a > b { (a, b) } else { (b, a) };
                if from != i || from == to {
                    continue;
                }
                let fk = ForeignKey::new(format!("fk{k}"), format!("t{to}"));
                spec = spec.foreign_key(if nullable { fk.nullable() } else { fk });
            }
            TableLoad::new(spec)
        })
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    // Every required key's target is inserted before the table holding it.
    #[test]
    fn required_targets_come_first((n, links) in arb_tables()) {
        let plan = LoadPlan::build(tables(n, &links), false).expect("acyclic plan");
        let names = plan.table_names();
        prop_assert_eq!(names.len(), n);
        let at = |name: &str| names.iter().position(|t| *t == name).expect("present");
        for table in plan.order() {
            for fk in table.spec.required_fks() {
                prop_assert!(at(&fk.target) < at(table.name()));
            }
        }
    }

    // Steps run every insert before any update, and updates keep insert order.
    #[test]
    fn inserts_precede_updates((n, links) in arb_tables()) {
        let plan = LoadPlan::build(tables(n, &links), false).expect("acyclic plan");
        let with_nullable = (0..n)
            .filter(|&i| links.iter().any(|&(a, b, nullable)| nullable && a != b && a.max(b) == i))
            .count();
        let steps = plan.steps();
        prop_assert_eq!(steps.len(), n + with_nullable);
        let first_update = steps.iter().position(|(pass, _)| *pass == LoadPass::Update).unwrap_or(steps.len());
        prop_assert!(steps[..first_update].iter().all(|(pass, _)| *pass == LoadPass::Insert));
        prop_assert!(steps[first_update..].iter().all(|(pass, _)| *pass == LoadPass::Update));

        let inserts = plan.table_names();
        let positions: Vec<usize> = steps[first_update..]
            .iter()
            .map(|(_, t)| inserts.iter().position(|name| *name == t.name()).expect("present"))
            .collect();
        prop_assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }
}
