/// End-to-end language tests through the public `Interpreter` API.
///
/// Each test feeds a complete program to a fresh interpreter and checks the
/// echoed console output, the final value, or the error it stops with.
use std::cell::Cell;
use std::rc::Rc;

use kebap::script::{
    Assoc, Console, ErrorKind, Interpreter, ObjectPrototype, Rank, ScriptError, ScriptResult, Value,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn interp() -> Interpreter {
    let mut i = Interpreter::new();
    i.capture_output();
    i
}

/// Run `src` and return everything it echoed.
fn output(src: &str) -> String {
    let mut i = interp();
    if let Err(e) = i.run_source("test", src) {
        panic!("{src:?} failed: {e}");
    }
    i.take_output()
}

fn value(src: &str) -> Value {
    match interp().eval(src) {
        Ok(v) => v,
        Err(e) => panic!("{src:?} failed: {e}"),
    }
}

fn error(src: &str) -> ScriptError {
    match interp().run_source("test", src) {
        Ok(()) => panic!("{src:?} should have failed"),
        Err(e) => e,
    }
}

// ── Basic programs ────────────────────────────────────────────────────────────

#[test]
fn arithmetic_precedence() {
    assert_eq!(output("2+3*4;"), "14\n");
    assert_eq!(output("(1+2)*(3+4);"), "21\n");
}

#[test]
fn loop_accumulates() {
    let src = "int s = 0;\nfor (int i = 1; i <= 5; i++) s = s + i;\ns;";
    assert_eq!(output(src), "15\n");
}

#[test]
fn list_broadcast_echo() {
    assert_eq!(output("{1,2,3} + 10;"), "{11,12,13}\n");
    assert_eq!(output("{1,2} + {3,4};"), "{4,6}\n");
}

#[test]
fn recursive_function() {
    let src = "int fib(int n) { if (n < 2) return n; return fib(n-1) + fib(n-2); }\nfib(10);";
    assert_eq!(output(src), "55\n");
}

#[test]
fn division_by_zero() {
    let e = error("1/0;");
    assert_eq!(e.kind(), ErrorKind::Arithmetic);
    assert!(e.message().contains("division by zero"), "{e}");
}

#[test]
fn error_carries_line() {
    let e = error("int a = 1;\n\na / 0;");
    assert_eq!(e.line(), Some(3));
    assert!(e.to_string().starts_with("line 3: "), "{e}");
}

// ── Operators ─────────────────────────────────────────────────────────────────

#[test]
fn unary_minus_binds_looser_than_power() {
    assert_eq!(value("-1**2;"), Value::Long(-1));
    assert_eq!(value("2**3**2;"), Value::Long(512));
}

#[test]
fn assignment_is_right_associative() {
    assert_eq!(value("int a, b; a = b = 5; a + b;"), Value::Long(10));
    assert_eq!(value("int n = 4; n += 3; n *= 2; n;"), Value::Long(14));
}

#[test]
fn conditional_and_logic() {
    assert_eq!(output("1 < 2 ? \"yes\" : \"no\";"), "yes\n");
    assert_eq!(value("0 || 3 > 2;"), Value::Bool(true));
    assert_eq!(value("1 && 0;"), Value::Bool(false));
}

#[test]
fn broadcast_length_mismatch() {
    let e = error("{1,2} + {3,4,5};");
    assert_eq!(e.kind(), ErrorKind::Structural);
    assert!(e.message().contains("length mismatch"), "{e}");
}

#[test]
fn casts_convert() {
    assert_eq!(value("(int)3.7;"), Value::Long(3));
    assert_eq!(value("(double)7 / 2;"), Value::Double(3.5));
    assert_eq!(value("typeof 1.5;"), Value::from("double"));
}

#[test]
fn ranges() {
    assert_eq!(output("[1:5];"), "{1,2,3,4,5}\n");
    assert_eq!(output("[0:1:0.5];"), "{0,0.5,1}\n");
    assert_eq!(output("[5:1];"), "{5,4,3,2,1}\n");
    assert_eq!(error("[1:5:0];").kind(), ErrorKind::Arithmetic);
}

#[test]
fn custom_operator() {
    let mut i = interp();
    i.register_custom_operator("<>", "differs", Rank::Relative("==".into(), 0), Assoc::Left, |a, b| {
        Ok(Value::Bool(a != b))
    })
    .unwrap();
    assert_eq!(i.eval("1 <> 2;").unwrap(), Value::Bool(true));
    assert_eq!(i.eval("3 <> 3;").unwrap(), Value::Bool(false));
}

// ── Scoping ───────────────────────────────────────────────────────────────────

#[test]
fn block_locals_shadow_and_vanish() {
    assert_eq!(output("int x = 1; int y; { int x = 2; y = x; } y; x;"), "2\n1\n");
    assert_eq!(error("{ int inner = 3; } inner;").kind(), ErrorKind::UnknownName);
}

#[test]
fn functions_see_globals_not_caller_locals() {
    let src = "int g = 1; void bump() { g = g + 1; } { int hidden = 5; bump(); } g;";
    assert_eq!(output(src), "2\n");

    let e = error("int peek() { return hidden; } { int hidden = 5; peek(); }");
    assert_eq!(e.kind(), ErrorKind::UnknownName);
}

#[test]
fn forward_declaration_is_ignored() {
    let src = "int twice(int n);\nint twice(int n) { return 2 * n; }\ntwice(21);";
    assert_eq!(output(src), "42\n");
}

// ── Statements ────────────────────────────────────────────────────────────────

#[test]
fn while_with_break_and_continue() {
    let src = "int i = 0; int n = 0;
               while (1) { i++; if (i > 10) break; if (i % 2) continue; n += i; }
               n;";
    assert_eq!(output(src), "30\n");
}

#[test]
fn foreach_values_and_keys() {
    assert_eq!(output("var total = 0; foreach (var v; {1,2,3}) total += v; total;"), "6\n");
    let src = "var m = {\"a\"=>1, \"b\"=>2}; string ks = \"\"; var sum = 0;
               foreach (var v, string k; m) { ks = ks + k; sum += v; }
               ks; sum;";
    assert_eq!(output(src), "ab\n3\n");
}

#[test]
fn duplicate_keys_overwrite() {
    let src = "var l = {\"a\"=>1, \"b\"=>3, \"a\"=>2}; sizeof l; l;";
    assert_eq!(output(src), "2\n{\"a\"=>2,\"b\"=>3}\n");
    assert_eq!(output("var m = {\"a\"=>1, \"a\"=>2}; sizeof m; m;"), "1\n{\"a\"=>2}\n");
}

#[test]
fn try_catch() {
    let src = "string msg; try throw \"bad\"; catch (string e) msg = e; msg;";
    assert_eq!(output(src), "bad\n");

    let caught = value("string msg; try 1/0; catch (e) msg = e; msg;");
    assert!(caught.to_string().contains("division by zero"), "{caught}");

    // Handled errors do not stop the program.
    assert_eq!(output("try { 1/0; } catch; 7;"), "7\n");
}

#[test]
fn uncaught_throw() {
    let e = error("throw \"gave up\";");
    assert_eq!(e.message(), "gave up");
}

#[test]
fn exit_surfaces_as_error() {
    let mut i = interp();
    let e = i.run_source("test", "1; exit 3; 2;").unwrap_err();
    assert!(e.is_exit());
    assert_eq!(e.exit_code(), 3);
    assert_eq!(i.take_output(), "1\n");
}

// ── Pointers and arrays ───────────────────────────────────────────────────────

#[test]
fn pointers_write_through() {
    assert_eq!(output("int x = 5; var p = &x; *p = 7; x;"), "7\n");
    assert_eq!(output("var q = new int(3); *q + 1;"), "4\n");
}

#[test]
fn fixed_arrays() {
    assert_eq!(output("int a[3] = {1,2,3}; a[1] = 9; a;"), "{1,9,3}\n");
    assert_eq!(error("int a[3]; a[5];").kind(), ErrorKind::Structural);
}

// ── Library ───────────────────────────────────────────────────────────────────

#[test]
fn builtin_functions() {
    assert_eq!(value("strlen(\"hello\");"), Value::Long(5));
    assert_eq!(value("toupper(\"ab\");"), Value::from("AB"));
    assert_eq!(value("sum({1,{2,3}});"), Value::Long(6));
    assert_eq!(value("max({4,9,2});"), Value::Long(9));
}

#[test]
fn regex_objects() {
    assert_eq!(value("Regex r(\"a+\"); r.match(\"caaat\");"), Value::Bool(true));
    assert_eq!(error("Regex bad(\"(\");").kind(), ErrorKind::Syntax);
}

#[test]
fn returning_objects_by_value_is_rejected() {
    let e = error("Regex make() { Regex r(\"a\"); return r; }\nmake();");
    assert_eq!(e.kind(), ErrorKind::Structural);
}

#[test]
fn include_from_environment_directory() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("lib.kb"), "int triple(int n) { return 3 * n; }\n").unwrap();
    std::env::set_var("KEBAP_SCENARIO_INCLUDE", format!("/nonexistent:{}", dir.path().display()));

    assert_eq!(output("include \"lib.kb\" from KEBAP_SCENARIO_INCLUDE;\ntriple(5);"), "15\n");
    assert_eq!(
        error("include \"missing.kb\" from KEBAP_SCENARIO_INCLUDE;").kind(),
        ErrorKind::UnknownName
    );
}

#[test]
fn include_from_search_path() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("consts.kb"), "double half = 0.5;\n").unwrap();
    let mut i = interp();
    i.set_include_path(vec![dir.path().to_path_buf()]);
    i.run_source("test", "include consts.kb;\nhalf * 4;").unwrap();
    assert_eq!(i.take_output(), "2\n");
}

// ── Host objects ──────────────────────────────────────────────────────────────

/// Counts how often instances are destructed.
struct Tracker {
    destructed: Rc<Cell<usize>>,
}

impl ObjectPrototype for Tracker {
    fn type_name(&self) -> &str {
        "Tracker"
    }

    fn clone_object(&self) -> Box<dyn ObjectPrototype> {
        Box::new(Tracker {
            destructed: Rc::clone(&self.destructed),
        })
    }

    fn destruct(&mut self) {
        self.destructed.set(self.destructed.get() + 1);
    }

    fn method_names(&self) -> &[&'static str] {
        &["ping"]
    }

    fn invoke(&mut self, _method: usize, _args: &[Value], _console: &mut Console) -> ScriptResult<Value> {
        Ok(Value::from("pong"))
    }
}

fn tracked() -> (Interpreter, Rc<Cell<usize>>) {
    let count = Rc::new(Cell::new(0));
    let mut i = interp();
    i.register_object(Box::new(Tracker {
        destructed: Rc::clone(&count),
    }));
    (i, count)
}

#[test]
fn objects_destruct_once_when_last_reference_goes() {
    let (mut i, count) = tracked();
    i.run_source("test", "Tracker t; var l = {t}; delete t;").unwrap();
    assert_eq!(count.get(), 0);
    i.run_source("test", "l = 0;").unwrap();
    assert_eq!(count.get(), 1);
    drop(i);
    assert_eq!(count.get(), 1);
}

#[test]
fn block_exit_destructs_locals() {
    let (mut i, count) = tracked();
    i.run_source("test", "{ Tracker a; Tracker b; a.ping(); }").unwrap();
    assert_eq!(count.get(), 2);
}

#[test]
fn globals_destruct_with_interpreter() {
    let (mut i, count) = tracked();
    i.run_source("test", "Tracker keep; Tracker arr[2];").unwrap();
    assert_eq!(count.get(), 0);
    drop(i);
    assert_eq!(count.get(), 3);
}

#[test]
fn host_globals() {
    let mut i = interp();
    i.set_global("limit", Value::Long(10)).unwrap();
    i.run_source("test", "limit = limit * 2; var fresh = limit + 1;").unwrap();
    assert_eq!(i.get_global("limit"), Some(Value::Long(20)));
    assert_eq!(i.get_global("fresh"), Some(Value::Long(21)));
    assert_eq!(i.get_global("absent"), None);
}
