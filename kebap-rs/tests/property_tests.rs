use proptest::prelude::*;
use kebap::script::list::List;
use kebap::script::{Interpreter, Value};

fn eval(src: &str) -> Value {
    let mut interp = Interpreter::new();
    interp.capture_output();
    interp
        .eval(src)
        .unwrap_or_else(|e| panic!("{src:?} failed: {e}"))
}

fn list_literal(items: &[i64]) -> String {
    let parts: Vec<String> = items.iter().map(|n| format!("({n})")).collect();
    format!("{{{}}}", parts.join(","))
}

fn longs(v: &Value) -> Vec<i64> {
    match v {
        Value::List(list) => list
            .values()
            .iter()
            .map(|x| match x {
                Value::Long(n) => *n,
                other => panic!("expected int element, got {other:?}"),
            })
            .collect(),
        other => panic!("expected list, got {other:?}"),
    }
}

proptest! {
    /// Integer arithmetic agrees with Rust's for values that cannot overflow.
    #[test]
    fn integer_arithmetic_matches(a in -10_000i64..10_000, b in -10_000i64..10_000) {
        prop_assert_eq!(eval(&format!("({a}) + ({b});")), Value::Long(a + b));
        prop_assert_eq!(eval(&format!("({a}) - ({b});")), Value::Long(a - b));
        prop_assert_eq!(eval(&format!("({a}) * ({b});")), Value::Long(a * b));
        prop_assert_eq!(eval(&format!("({a}) < ({b});")), Value::Bool(a < b));
    }

    #[test]
    fn precedence_matches(a in 0i64..100, b in 0i64..100, c in 0i64..100) {
        prop_assert_eq!(eval(&format!("{a} + {b} * {c};")), Value::Long(a + b * c));
        prop_assert_eq!(eval(&format!("({a} + {b}) * {c};")), Value::Long((a + b) * c));
        prop_assert_eq!(eval(&format!("{a} - {b} - {c};")), Value::Long(a - b - c));
    }

    /// Broadcasting keeps the list length and applies the operator per element.
    #[test]
    fn scalar_broadcast(items in prop::collection::vec(-1000i64..1000, 0..20), k in -1000i64..1000) {
        let got = eval(&format!("({}) + ({k});", list_literal(&items)));
        let want: Vec<i64> = items.iter().map(|n| n + k).collect();
        prop_assert_eq!(longs(&got), want);
    }

    #[test]
    fn pairwise_broadcast(pairs in prop::collection::vec((-1000i64..1000, -1000i64..1000), 1..20)) {
        let (xs, ys): (Vec<i64>, Vec<i64>) = pairs.into_iter().unzip();
        let got = eval(&format!("({}) * ({});", list_literal(&xs), list_literal(&ys)));
        let want: Vec<i64> = xs.iter().zip(&ys).map(|(x, y)| x * y).collect();
        prop_assert_eq!(longs(&got), want);
    }

    /// `[first:last:step]` visits every step from `first` up to `last`.
    #[test]
    fn range_length(first in -50i64..50, span in 0i64..100, step in 1i64..10) {
        let last = first + span;
        let got = longs(&eval(&format!("[({first}):({last}):{step}];")));
        prop_assert_eq!(got.len() as i64, span / step + 1);
        prop_assert_eq!(got.first().copied(), Some(first));
        prop_assert!(got.iter().all(|n| *n <= last));
    }

    #[test]
    fn host_globals_round_trip(items in prop::collection::vec(-1000i64..1000, 0..10)) {
        let mut interp = Interpreter::new();
        let list = List::from_values(items.iter().map(|n| Value::Long(*n)));
        interp.set_global("data", Value::List(list)).unwrap();
        let total = interp.eval("var t = 0; foreach (var v; data) t += v; t;").unwrap();
        prop_assert_eq!(total, Value::Long(items.iter().sum()));
    }
}
