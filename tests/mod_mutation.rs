use bson::{Bson, doc};
use reefql::query::Transform;

#[test]
fn push_unique_is_idempotent_for_present_elements() {
    let mut d = doc! {"tags": ["x", "y"]};
    let t = Transform::Push { column: "tags".into(), value: "x".into(), unique: true };
    let changed = t.apply(&mut d).unwrap();
    assert!(!changed);
    assert_eq!(d, doc! {"tags": ["x", "y"]});

    let mut d = doc! {"tags": ["y"]};
    let changed = t.apply(&mut d).unwrap();
    assert!(changed);
    assert_eq!(d, doc! {"tags": ["y", "x"]});
}

#[test]
fn push_defaults_a_missing_field_to_an_empty_array() {
    let mut d = doc! {"name": "alice"};
    let t = Transform::Push { column: "tags".into(), value: "x".into(), unique: false };
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"name": "alice", "tags": ["x"]});
}

#[test]
fn push_sequence_appends_all_elements() {
    let mut d = doc! {"tags": ["a"]};
    let value = Bson::Array(vec!["b".into(), "a".into()]);
    let t = Transform::Push { column: "tags".into(), value: value.clone(), unique: false };
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"tags": ["a", "b", "a"]});

    // unique first subtracts the already-present elements
    let mut d = doc! {"tags": ["a", "c"]};
    let t = Transform::Push { column: "tags".into(), value, unique: true };
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"tags": ["c", "b", "a"]});
}

#[test]
fn push_keyed_mapping_merges_or_appends() {
    // unique=true merges key-wise into the target mapping
    let mut d = doc! {"meta": {"a": 1}};
    let t = Transform::Push {
        column: "meta".into(),
        value: Bson::Document(doc! {"b": 2}),
        unique: true,
    };
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"meta": {"a": 1, "b": 2}});

    // unique=false appends the mapping as one array element
    let mut d = doc! {"events": [{"k": 1}]};
    let t = Transform::Push {
        column: "events".into(),
        value: Bson::Document(doc! {"k": 2}),
        unique: false,
    };
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"events": [{"k": 1}, {"k": 2}]});
}

#[test]
fn push_onto_a_scalar_field_is_a_soft_row_error() {
    let mut d = doc! {"tags": "not-an-array"};
    let t = Transform::Push { column: "tags".into(), value: "x".into(), unique: false };
    assert!(t.apply(&mut d).is_err());
    // record untouched
    assert_eq!(d, doc! {"tags": "not-an-array"});
}

#[test]
fn pull_removes_every_occurrence() {
    let mut d = doc! {"tags": ["x", "y", "x"]};
    let t = Transform::pull("tags", "x".into());
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"tags": ["y"]});

    // pulling an absent value changes nothing
    let mut d = doc! {"tags": ["y"]};
    assert!(!t.apply(&mut d).unwrap());
}

#[test]
fn pull_accepts_a_sequence_of_values() {
    let mut d = doc! {"tags": ["x", "y", "z"]};
    let t = Transform::pull("tags", Bson::Array(vec!["x".into(), "z".into()]));
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"tags": ["y"]});
}

#[test]
fn pull_from_a_missing_field_is_a_soft_row_error() {
    let mut d = doc! {"name": "alice"};
    let t = Transform::pull("tags", "x".into());
    assert!(t.apply(&mut d).is_err());
}

#[test]
fn without_removes_fields_entirely() {
    let mut d = doc! {"a": 1, "b": 2, "info": {"city": "lyon", "zip": "69000"}};
    let t = Transform::Without(vec!["b".into(), "info.zip".into()]);
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"a": 1, "info": {"city": "lyon"}});
    assert!(d.get("b").is_none());

    // removing an absent field reports no change
    let t = Transform::Without(vec!["missing".into()]);
    assert!(!t.apply(&mut d).unwrap());
}

#[test]
fn merge_sets_nested_paths() {
    let mut d = doc! {"info": {"city": "lyon"}};
    let t = Transform::Merge(doc! {"info.zip": "69000", "age": 30});
    assert!(t.apply(&mut d).unwrap());
    assert_eq!(d, doc! {"info": {"city": "lyon", "zip": "69000"}, "age": 30});
}
