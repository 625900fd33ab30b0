use bson::{Bson, doc};
use proptest::prelude::*;
use reefql::query::{Condition, Join, Operand, Operator, compile};

proptest! {
    #[test]
    fn prop_compiling_twice_is_deterministic(values in proptest::collection::vec((any::<i64>(), any::<i64>()), 0..40)) {
        let conds = vec![
            Condition::new("a", Operator::Between, Operand::Pair(Bson::Int64(-100), Bson::Int64(100))),
            Condition::new("b", Operator::Gt, Operand::Value(Bson::Int64(0))).with_join(Join::Or),
        ];
        let p1 = compile(&conds).unwrap();
        let p2 = compile(&conds).unwrap();
        for (a, b) in &values {
            let d = doc! {"a": *a, "b": *b};
            prop_assert_eq!(p1.matches(&d), p2.matches(&d));
        }
    }

    #[test]
    fn prop_empty_in_matches_nothing_and_empty_not_in_everything(v in any::<i64>()) {
        let d = doc! {"x": v};
        let never = compile(&[Condition::new("x", Operator::In, Operand::Set(vec![]))]).unwrap();
        prop_assert!(!never.matches(&d));
        let always = compile(&[Condition::new("x", Operator::NotIn, Operand::Set(vec![]))]).unwrap();
        prop_assert!(always.matches(&d));
    }

    #[test]
    fn prop_between_agrees_with_inclusive_bounds(
        v in -1_000_000_000i64..1_000_000_000,
        lo in -1_000_000_000i64..1_000_000_000,
        hi in -1_000_000_000i64..1_000_000_000,
    ) {
        let p = compile(&[Condition::new(
            "x",
            Operator::Between,
            Operand::Pair(Bson::Int64(lo), Bson::Int64(hi)),
        )]).unwrap();
        let d = doc! {"x": v};
        prop_assert_eq!(p.matches(&d), lo <= v && v <= hi);
        // a record missing the column never falls inside the range
        let missing = doc! {"y": v};
        prop_assert!(!p.matches(&missing));
    }

    #[test]
    fn prop_not_in_is_the_complement_of_in(v in any::<i64>(), set in proptest::collection::vec(any::<i64>(), 0..20)) {
        let operand: Vec<Bson> = set.iter().map(|x| Bson::Int64(*x)).collect();
        let inside = compile(&[Condition::new("x", Operator::In, Operand::Set(operand.clone()))]).unwrap();
        let outside = compile(&[Condition::new("x", Operator::NotIn, Operand::Set(operand))]).unwrap();
        let d = doc! {"x": v};
        prop_assert_ne!(inside.matches(&d), outside.matches(&d));
    }
}
