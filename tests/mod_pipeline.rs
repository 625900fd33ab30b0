use bson::doc;
use reefql::adapter::{ExecutionAdapter, RunOutput};
use reefql::memory::MemoryAdapter;
use reefql::query::{
    Condition, Direction, Directive, Operand, Operator, Stage, assemble, compile,
};

fn seeded() -> MemoryAdapter {
    let adapter = MemoryAdapter::new();
    adapter.seed(
        "people",
        vec![
            doc! {"name": "alice", "age": 30, "city": "lyon"},
            doc! {"name": "bob", "age": 40, "city": "nice"},
            doc! {"name": "carol", "age": 30, "city": "lyon"},
            doc! {"name": "dave", "age": 25, "city": "nice"},
        ],
    );
    adapter
}

fn records(out: RunOutput) -> Vec<bson::Document> {
    match out {
        RunOutput::Records(rows) => rows.into_iter().map(|d| d.data).collect(),
        RunOutput::Grouped(g) => g.data.into_iter().map(|d| d.data).collect(),
        RunOutput::Scalar(v) => panic!("unexpected scalar {v}"),
    }
}

#[test]
fn directives_assemble_into_the_fixed_stage_order() {
    // declared deliberately out of order
    let directives = vec![
        Directive::Project(vec!["name".into()]),
        Directive::Limit(2),
        Directive::Order { column: "age".into(), direction: Direction::Asc, index: false },
        Directive::Skip(1),
    ];
    let filter = compile(&[Condition::new(
        "age",
        Operator::Gte,
        Operand::Value(25.into()),
    )])
    .unwrap();
    let pipeline = assemble(Some(filter), &directives, None).unwrap();

    let adapter = seeded();
    let rows = records(adapter.run("people", &pipeline).unwrap());
    // sorted by age [dave 25, alice 30, carol 30, bob 40], skip 1, limit 2,
    // then projected to the name field alone
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], doc! {"name": "alice"});
    assert_eq!(rows[1], doc! {"name": "carol"});
}

#[test]
fn multiple_order_directives_compose_as_a_stable_multi_key_sort() {
    let directives = vec![
        Directive::Order { column: "age".into(), direction: Direction::Asc, index: false },
        Directive::Order { column: "name".into(), direction: Direction::Desc, index: false },
    ];
    let pipeline = assemble(None, &directives, None).unwrap();
    assert!(matches!(&pipeline.stages[0], Stage::OrderBy(keys) if keys.len() == 2));

    let adapter = seeded();
    let rows = records(adapter.run("people", &pipeline).unwrap());
    let names: Vec<&str> = rows.iter().map(|d| d.get_str("name").unwrap()).collect();
    assert_eq!(names, vec!["dave", "carol", "alice", "bob"]);
}

#[test]
fn group_by_keeps_the_first_record_per_group_in_input_order() {
    let adapter = MemoryAdapter::new();
    adapter.seed("t", vec![doc! {"g": 1, "v": 10}, doc! {"g": 1, "v": 20}, doc! {"g": 2, "v": 5}]);
    let pipeline =
        assemble(None, &[Directive::Group { column: "g".into() }], None).unwrap();
    let out = adapter.run("t", &pipeline).unwrap();
    // grouped output is the tagged wrapper
    assert!(matches!(out, RunOutput::Grouped(_)));
    let rows = records(out);
    assert_eq!(rows, vec![doc! {"g": 1, "v": 10}, doc! {"g": 2, "v": 5}]);
}

#[test]
fn distinct_whole_records_and_by_index_field() {
    let adapter = MemoryAdapter::new();
    adapter.seed("t", vec![doc! {"a": 1}, doc! {"a": 1}, doc! {"a": 2}]);
    let pipeline = assemble(None, &[Directive::Distinct { index: None }], None).unwrap();
    let rows = records(adapter.run("t", &pipeline).unwrap());
    assert_eq!(rows, vec![doc! {"a": 1}, doc! {"a": 2}]);

    let adapter = seeded();
    let pipeline =
        assemble(None, &[Directive::Distinct { index: Some("city".into()) }], None).unwrap();
    let rows = records(adapter.run("people", &pipeline).unwrap());
    let cities: Vec<&str> = rows.iter().map(|d| d.get_str("city").unwrap()).collect();
    assert_eq!(cities, vec!["lyon", "nice"]);
}

#[test]
fn index_flagged_order_keys_carry_the_hint() {
    let directives =
        vec![Directive::Order { column: "age".into(), direction: Direction::Desc, index: true }];
    let pipeline = assemble(None, &directives, None).unwrap();
    let Stage::OrderBy(keys) = &pipeline.stages[0] else { panic!("expected order stage") };
    assert!(keys[0].index);

    // the reference adapter still sorts correctly without an index
    let adapter = seeded();
    let rows = records(adapter.run("people", &pipeline).unwrap());
    assert_eq!(rows[0].get_str("name").unwrap(), "bob");
}

#[test]
fn skip_past_the_end_yields_no_records() {
    let adapter = seeded();
    let pipeline = assemble(None, &[Directive::Skip(10)], None).unwrap();
    assert!(records(adapter.run("people", &pipeline).unwrap()).is_empty());
}

#[test]
fn later_skip_and_limit_directives_override_earlier_ones() {
    let directives = vec![
        Directive::Skip(3),
        Directive::Limit(1),
        Directive::Skip(0),
        Directive::Limit(2),
    ];
    let pipeline = assemble(None, &directives, None).unwrap();
    let adapter = seeded();
    assert_eq!(records(adapter.run("people", &pipeline).unwrap()).len(), 2);
}
