//! End-to-end exception semantics: guard dispatch, finally duplication,
//! rethrow, and uncaught faults.

use marten_compiler::{GlobalNames, compile};
use marten_syntax::{SourceId, parse};
use marten_vm::{Value, Vm, VmError};

fn run_in(vm: &mut Vm, source: &str) -> Result<Value, VmError> {
    let program = parse(source, SourceId(0)).expect("parse");
    let globals: GlobalNames = vm.global_names().collect();
    let module = compile(&program, &globals, "test.mtn").expect("compile");
    vm.run(&module)
}

fn vm_with(globals: &[&str]) -> Vm {
    let mut vm = Vm::new();
    for name in globals {
        vm.set_global(*name, Value::Null);
    }
    vm
}

#[test]
fn test_catch_receives_thrown_value() {
    let mut vm = vm_with(&["result"]);
    run_in(&mut vm, r#"try { throw "boom"; } catch (e) { result = e; }"#).unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::string("boom")));
}

#[test]
fn test_try_catch_finally_all_run_in_order() {
    let mut vm = Vm::new();
    vm.set_global("log", Value::string(""));
    run_in(
        &mut vm,
        r#"
        try {
            log = log + "t";
            throw 1;
        } catch (e) {
            log = log + "c";
        } finally {
            log = log + "f";
        }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("log"), Some(&Value::string("tcf")));
}

#[test]
fn test_inner_guard_wins() {
    let mut vm = vm_with(&["result"]);
    run_in(
        &mut vm,
        r#"
        try {
            try { throw "x"; } catch (inner) { result = "inner"; }
        } catch (outer) {
            result = "outer";
        }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::string("inner")));
}

#[test]
fn test_rethrow_reaches_outer_catch() {
    let mut vm = vm_with(&["result"]);
    run_in(
        &mut vm,
        r#"
        try {
            try { throw "x"; } catch (inner) { throw "y"; }
        } catch (outer) {
            result = outer;
        }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::string("y")));
}

#[test]
fn test_uncaught_exception_carries_trace() {
    let mut vm = Vm::new();
    let err = run_in(&mut vm, r#"fn f() { throw "kaboom"; } f();"#).unwrap_err();
    let VmError::Uncaught(uncaught) = &err else {
        panic!("expected uncaught, got {err:?}");
    };
    assert_eq!(uncaught.message, "kaboom");
    assert_eq!(uncaught.frames[0].function_name, "f");
    assert_eq!(uncaught.frames[1].function_name, "<script>");
    assert!(err.to_string().contains("Uncaught exception: kaboom"));
}

#[test]
fn test_return_in_try_still_runs_finally() {
    let mut vm = vm_with(&["result", "marker"]);
    run_in(
        &mut vm,
        r#"
        fn f() { try { return 1; } finally { marker = 2; } }
        result = f();
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::Int(1)));
    assert_eq!(vm.get_global("marker"), Some(&Value::Int(2)));
}

#[test]
fn test_return_in_finally_overrides() {
    let mut vm = vm_with(&["result"]);
    run_in(
        &mut vm,
        r#"
        fn f() { try { return 1; } finally { return 2; } }
        result = f();
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::Int(2)));
}

#[test]
fn test_catch_inside_finally_on_return_path() {
    // While the finally copy runs for a pending return, a try/catch inside
    // it must dispatch and resume without disturbing the returned value.
    let mut vm = vm_with(&["result", "caught"]);
    run_in(
        &mut vm,
        r#"
        fn f() {
            try { return 1; } finally {
                try { throw 2; } catch (e) { caught = e; }
            }
        }
        result = f();
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::Int(1)));
    assert_eq!(vm.get_global("caught"), Some(&Value::Int(2)));
}

#[test]
fn test_finally_runs_while_exception_propagates() {
    let mut vm = vm_with(&["result", "marker"]);
    run_in(
        &mut vm,
        r#"
        fn f() { try { throw "x"; } finally { marker = 1; } }
        try { f(); } catch (e) { result = e; }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("marker"), Some(&Value::Int(1)));
    assert_eq!(vm.get_global("result"), Some(&Value::string("x")));
}

#[test]
fn test_runtime_fault_is_catchable() {
    let mut vm = vm_with(&["result"]);
    run_in(&mut vm, "try { result = 1 / 0; } catch (e) { result = e; }").unwrap();
    assert_eq!(
        vm.get_global("result"),
        Some(&Value::string("division by zero"))
    );
}

#[test]
fn test_break_runs_finally() {
    let mut vm = Vm::new();
    vm.set_global("count", Value::Int(0));
    run_in(
        &mut vm,
        "while true { try { break; } finally { count = count + 1; } }",
    )
    .unwrap();
    assert_eq!(vm.get_global("count"), Some(&Value::Int(1)));
}

#[test]
fn test_continue_runs_finally_each_iteration() {
    let mut vm = Vm::new();
    vm.set_global("i", Value::Int(0));
    vm.set_global("total", Value::Int(0));
    run_in(
        &mut vm,
        r#"
        while i < 3 {
            i = i + 1;
            try { continue; } finally { total = total + 10; }
        }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("total"), Some(&Value::Int(30)));
}

#[test]
fn test_arity_mismatch_is_catchable() {
    let mut vm = vm_with(&["result"]);
    run_in(
        &mut vm,
        r#"
        fn f(a) { return a; }
        try { f(); } catch (e) { result = e; }
        "#,
    )
    .unwrap();
    let Some(Value::Str(msg)) = vm.get_global("result") else {
        panic!("expected string result");
    };
    assert!(msg.contains("expects 1 arguments, got 0"));
}

#[test]
fn test_native_error_raises() {
    let mut vm = vm_with(&["result"]);
    vm.register_native("fail", |_| Err("native boom".to_string()));
    run_in(&mut vm, "try { fail(); } catch (e) { result = e; }").unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::string("native boom")));
}

#[test]
fn test_deep_recursion_overflows() {
    let mut vm = Vm::new();
    let err = run_in(&mut vm, "fn f() { return f(); } f();").unwrap_err();
    assert!(matches!(err, VmError::StackOverflow));
}

#[test]
fn test_sibling_catches_are_independent() {
    let mut vm = vm_with(&["a", "b"]);
    run_in(
        &mut vm,
        r#"
        try { throw 1; } catch (e) { a = e; }
        try { throw 2; } catch (e) { b = e; }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("a"), Some(&Value::Int(1)));
    assert_eq!(vm.get_global("b"), Some(&Value::Int(2)));
}

#[test]
fn test_catch_discards_partial_operands() {
    // The faulting expression had operands on the stack; the handler
    // resumes with a clean statement boundary.
    let mut vm = vm_with(&["result"]);
    run_in(
        &mut vm,
        r#"
        fn boom() { throw "mid"; }
        try { result = 1 + boom(); } catch (e) { result = e; }
        "#,
    )
    .unwrap();
    assert_eq!(vm.get_global("result"), Some(&Value::string("mid")));
}
