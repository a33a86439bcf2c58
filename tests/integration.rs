// Runs every bundled `.blg` fixture end to end through the same path
// `blerg --test` uses, plus a handful of negative-path and
// property-style checks from the testable-properties list.

use std::path::Path;

use blerg::error::ErrorKind;
use blerg::value::Thing;
use blerg::vm::Runtime;

fn run(source: &str) -> Result<Thing, String> {
    let module = blerg::compile::compile(source, None).map_err(|e| e.to_string())?;
    let mut rt = Runtime::new(None);
    let global = rt.execute_module(module).map_err(|e| e.render_trace())?;
    let fields = match global {
        Thing::Module(fields) => fields,
        _ => return Err("global scope is not an object".to_string()),
    };
    let main = fields.get("main").cloned().ok_or_else(|| "function not found".to_string())?;
    rt.call_function(&main, &[Thing::None]).map_err(|e| e.render_trace())
}

fn run_fixture(name: &str) -> Result<Thing, String> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name);
    let source = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {}", path.display(), e));
    run(&source)
}

#[test]
fn return_and_arithmetic_fixture_passes() {
    run_fixture("return_and_arithmetic.blg").unwrap();
}

#[test]
fn strings_and_greeting_fixture_passes() {
    run_fixture("strings_and_greeting.blg").unwrap();
}

#[test]
fn recursive_factorial_fixture_passes() {
    run_fixture("recursive_factorial.blg").unwrap();
}

#[test]
fn iterative_factorial_fixture_passes() {
    run_fixture("iterative_factorial.blg").unwrap();
}

#[test]
fn tuple_destructure_fixture_passes() {
    run_fixture("tuple_destructure.blg").unwrap();
}

#[test]
fn object_and_symbol_dispatch_fixture_passes() {
    run_fixture("object_and_symbol_dispatch.blg").unwrap();
}

#[test]
fn list_head_and_tail_fixture_passes() {
    run_fixture("list_head_and_tail.blg").unwrap();
}

#[test]
fn trycatch_division_error_fixture_passes() {
    run_fixture("trycatch_division_error.blg").unwrap();
}

#[test]
fn destructuring_a_too_long_tuple_is_a_tuple_size_error() {
    let source = "\
        (a, b) = (1, 2, 3); \
        def main x do \
            <- none; \
        end; \
    ";
    let err = run(source).unwrap_err();
    assert!(err.contains("tuple is not the correct size"));
}

#[test]
fn destructuring_a_too_short_tuple_is_a_tuple_size_error() {
    let source = "\
        (a, b, c) = (1, 2); \
        def main x do \
            <- none; \
        end; \
    ";
    let err = run(source).unwrap_err();
    assert!(err.contains("tuple is not the correct size"));
}

#[test]
fn calling_an_undefined_name_reports_it_by_name() {
    let source = "def main x do <- this_is_not_bound; end;";
    let err = run(source).unwrap_err();
    assert!(err.contains("this_is_not_bound"));
}

#[test]
fn calling_a_function_with_the_wrong_arity_is_an_error() {
    let source = "\
        def f a b do <- a + b; end; \
        def main x do <- f(1); end; \
    ";
    let err = run(source).unwrap_err();
    assert!(err.contains("arguments"));
}

#[test]
fn missing_main_is_reported_without_a_trace() {
    let source = "x = 1;";
    let err = run(source).unwrap_err();
    assert_eq!(err, "function not found");
}

#[test]
fn closures_capture_their_defining_scope_by_sharing_it() {
    let source = "\
        make_counter = def start do \
            n = start; \
            inc = def step do \
                n = n + step; \
                <- n; \
            end; \
            <- inc; \
        end; \
        def main x do \
            counter = make_counter(10); \
            assert(counter(1) == 11); \
            assert(counter(1) == 12); \
            <- none; \
        end; \
    ";
    run(source).unwrap();
}

#[test]
fn every_symbol_invocation_respects_its_fixed_arity() {
    let source = "\
        pair = createSymbol(2); \
        def main x do \
            <- pair 1 2 3; \
        end; \
    ";
    let err = run(source).unwrap_err();
    assert!(err.contains("arguments"));
}
