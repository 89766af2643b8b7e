//! End-to-end execution: calls, control flow, operators, natives.

use marten_compiler::{GlobalNames, compile};
use marten_syntax::{SourceId, fold_constants, parse};
use marten_vm::{Value, Vm};

fn run_in(vm: &mut Vm, source: &str) -> Value {
    let program = parse(source, SourceId(0)).expect("parse");
    let program = fold_constants(program);
    let globals: GlobalNames = vm.global_names().collect();
    let module = compile(&program, &globals, "test.mtn").expect("compile");
    vm.run(&module).expect("run")
}

fn eval(source: &str) -> Value {
    let mut vm = Vm::new();
    vm.set_global("result", Value::Null);
    run_in(&mut vm, source);
    vm.get_global("result").cloned().expect("result global")
}

#[test]
fn test_script_completes_with_null() {
    let mut vm = Vm::new();
    assert_eq!(run_in(&mut vm, "let x = 1;"), Value::Null);
}

#[test]
fn test_recursive_calls() {
    let value = eval(
        r#"
        fn fib(n) {
            if n < 2 { return n; }
            return fib(n - 1) + fib(n - 2);
        }
        result = fib(10);
        "#,
    );
    assert_eq!(value, Value::Int(55));
}

#[test]
fn test_while_accumulates() {
    let value = eval(
        r#"
        let i = 0;
        let total = 0;
        while i < 5 {
            i = i + 1;
            total = total + i;
        }
        result = total;
        "#,
    );
    assert_eq!(value, Value::Int(15));
}

#[test]
fn test_else_if_chain() {
    let value = eval(
        r#"
        fn grade(n) {
            if n >= 90 { return "a"; }
            else if n >= 80 { return "b"; }
            else { return "c"; }
        }
        result = grade(85);
        "#,
    );
    assert_eq!(value, Value::string("b"));
}

#[test]
fn test_class_methods() {
    let value = eval(
        r#"
        class Math {
            fn double(x) { return x + x; }
            fn quadruple(x) { return double(double(x)); }
        }
        result = Math.quadruple(5);
        "#,
    );
    assert_eq!(value, Value::Int(20));
}

#[test]
fn test_short_circuit_skips_rhs() {
    let value = eval(
        r#"
        fn boom() { throw "evaluated"; }
        let a = false && boom();
        let b = true || boom();
        result = a == false && b == true;
        "#,
    );
    assert_eq!(value, Value::Bool(true));
}

#[test]
fn test_string_concat_and_compare() {
    let value = eval(r#"result = "foo" + "bar" < "foz";"#);
    assert_eq!(value, Value::Bool(true));
}

#[test]
fn test_mixed_numeric_promotion() {
    let value = eval("result = 1 + 0.5;");
    assert_eq!(value, Value::Float(1.5));
}

#[test]
fn test_block_scoping_shadows() {
    let value = eval(
        r#"
        let x = 1;
        {
            let x = 2;
            result = x;
        }
        result = result + x;
        "#,
    );
    assert_eq!(value, Value::Int(3));
}

#[test]
fn test_native_round_trip() {
    let mut vm = Vm::new();
    vm.set_global("result", Value::Null);
    vm.register_native("add_all", |args| {
        let mut total = 0i64;
        for arg in args {
            match arg {
                Value::Int(n) => total += n,
                other => return Err(format!("expected int, got {}", other.type_name())),
            }
        }
        Ok(Value::Int(total))
    });
    run_in(&mut vm, "result = add_all(1, 2, 3);");
    assert_eq!(vm.get_global("result"), Some(&Value::Int(6)));
}

#[test]
fn test_function_without_return_yields_null() {
    let value = eval("fn noop() { } result = noop();");
    assert_eq!(value, Value::Null);
}

#[test]
fn test_not_and_negation() {
    let value = eval("result = !(1 > 2) && -(3) == 0 - 3;");
    assert_eq!(value, Value::Bool(true));
}
