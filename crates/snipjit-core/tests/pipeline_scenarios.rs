//! End-to-end tests: source text through the driver and into a JIT session

use std::sync::Arc;

use snipjit_core::driver::FailureKind;
use snipjit_core::jit::{LinkError, SessionConfig, SessionError, SymbolResolution};
use snipjit_core::testutil::{call_c, compile_c, load_c};
use snipjit_core::{
    CompileOptions, EmissionKind, FrontEndDriver, JitSession, NativeSymbolEnvironment, Pipeline,
    PipelineError, Severity, SourceUnit, SymbolBinding,
};

extern "C" fn host_sin(x: f64) -> f64 {
    x.sin()
}

extern "C" fn twice(x: i32) -> i32 {
    x * 2
}

extern "C" fn thrice(x: i32) -> i32 {
    x * 3
}

fn environment(bindings: impl IntoIterator<Item = SymbolBinding>) -> Arc<NativeSymbolEnvironment> {
    Arc::new(NativeSymbolEnvironment::build(bindings).unwrap())
}

#[test]
fn test_add_resolves_under_the_default_language() {
    let pipeline = Pipeline::default();
    let program = pipeline
        .load(pipeline.source("int add(int a,int b){return a+b;}"))
        .unwrap();
    let add = program.lookup("add").expect("add is exported");
    assert_eq!(add.invoke::<_, i32>((1_i32, 3_i32)).unwrap(), 4);
    assert!(program.lookup("_Z3addii").is_none());
}

#[test]
fn test_cxx_add_is_exported_under_its_mangled_name() {
    let program = Pipeline::default()
        .load(SourceUnit::cxx("int add(int a,int b){return a+b;}"))
        .unwrap();
    assert!(program.lookup("add").is_none());
    assert_eq!(program.call::<_, i32>("_Z3addii", (1_i32, 3_i32)).unwrap(), 4);
}

#[test]
fn test_extern_c_add_resolves_in_cxx() {
    let program = Pipeline::default()
        .load(SourceUnit::cxx(
            "extern \"C\" int add(int a, int b) { return a + b; }\n",
        ))
        .unwrap();
    let add = program.lookup("add").expect("add is exported");
    assert_eq!(add.invoke::<_, i32>((1_i32, 3_i32)).unwrap(), 4);
}

#[test]
fn test_sin_is_bound_to_the_host_function() {
    let sin_only = environment([SymbolBinding::new(
        "sin",
        host_sin as extern "C" fn(f64) -> f64,
    )]);
    let result: f64 = Pipeline::default()
        .with_environment(sin_only)
        .run(
            SourceUnit::cxx(
                "#include <cmath>\nextern \"C\" double doSin(double x) { return sin(x); }\n",
            ),
            "doSin",
            (0.5_f64,),
        )
        .unwrap();
    assert_eq!(result, 0.5_f64.sin());
}

#[test]
fn test_math_preset_matches_std() {
    let source = "#include <math.h>\n\
                  double hyp(double a, double b) { return sqrt(pow(a, 2) + pow(b, 2)); }\n";
    let result: f64 = call_c(source, "hyp", (3.0_f64, 4.0_f64)).unwrap();
    assert_eq!(result, 5.0);
}

#[test]
fn test_missing_symbol_fails_at_ingest() {
    let module = compile_c(
        "int missing(void);\nint use_missing(void) { return missing(); }\n",
        EmissionKind::InMemory,
    )
    .unwrap();

    let mut session = JitSession::create().unwrap();
    Arc::new(NativeSymbolEnvironment::math())
        .install_into(&mut session)
        .unwrap();
    let error = session.ingest(module).unwrap_err();
    assert_eq!(
        error,
        SessionError::Link(LinkError::UnresolvedSymbol {
            names: vec!["missing".to_string()],
        })
    );
    assert!(session.lookup("missing").is_none());
    assert!(session.lookup("use_missing").is_none());
}

#[test]
fn test_missing_symbol_through_the_pipeline() {
    let error = load_c("double mystery(double);\ndouble f(double x) { return mystery(x); }\n")
        .unwrap_err();
    assert!(error.contains("unresolved external symbol(s): mystery"), "{error}");
}

#[test]
fn test_syntax_error_is_a_front_end_failure() {
    let failure = FrontEndDriver::default()
        .compile(SourceUnit::cxx("int broken(int a { return a; }\n"))
        .unwrap_err();
    assert_eq!(failure.kind, FailureKind::DiagnosticErrors);
    assert!(failure
        .diagnostics
        .iter()
        .any(|entry| entry.severity >= Severity::Error));
}

#[test]
fn test_deep_nesting_is_reported_not_fatal() {
    let depth = 5_000;
    let source = format!(
        "int deep(void) {{ return {}7{}; }}\n",
        "(".repeat(depth),
        ")".repeat(depth)
    );
    match Pipeline::default().load(SourceUnit::c(source)) {
        Err(PipelineError::FrontEnd(failure)) => {
            assert_eq!(failure.diagnostics.max_severity(), Some(Severity::Fatal));
            assert!(failure.transcript().contains("nesting too deep"));
        }
        other => panic!("expected a front-end failure, got {other:?}"),
    }

    let shallow: i32 = call_c(
        &format!("int deep(void) {{ return {}7{}; }}\n", "(".repeat(100), ")".repeat(100)),
        "deep",
        (),
    )
    .unwrap();
    assert_eq!(shallow, 7);
}

#[test]
fn test_unknown_target_leaves_engine_unavailable() {
    let config = SessionConfig {
        target: Some("mips-unknown-linux-gnu".to_string()),
        ..SessionConfig::default()
    };
    let error = JitSession::create_with(config).unwrap_err();
    assert!(matches!(error, SessionError::EngineUnavailable(_)), "{error}");
}

#[test]
fn test_foreign_target_cannot_execute_here() {
    let host = JitSession::create().unwrap().triple();
    let foreign = if host.starts_with("aarch64") {
        "x86_64-unknown-linux-gnu"
    } else {
        "aarch64-unknown-linux-gnu"
    };
    let config = SessionConfig {
        target: Some(foreign.to_string()),
        ..SessionConfig::default()
    };
    assert!(matches!(
        JitSession::create_with(config),
        Err(SessionError::EngineUnavailable(_))
    ));
}

#[test]
fn test_lookup_is_idempotent() {
    let program = load_c("int one(void) { return 1; }\n").unwrap();
    let first = program.lookup("one").unwrap().address();
    let second = program.lookup("one").unwrap().address();
    assert_eq!(first, second);
    assert!(program.lookup("two").is_none());
}

#[test]
fn test_static_functions_are_not_exported() {
    let program = load_c(
        "static int helper(int x) { return x + 1; }\nint outer(int x) { return helper(x) * 2; }\n",
    )
    .unwrap();
    assert!(program.lookup("helper").is_none());
    assert_eq!(program.call::<_, i32>("outer", (4_i32,)).unwrap(), 10);
}

#[test]
fn test_emission_kinds_agree_on_results() {
    let source = "int collatz(int n) {\n\
                      int steps = 0;\n\
                      while (n != 1) { n = n % 2 ? 3 * n + 1 : n / 2; steps++; }\n\
                      return steps;\n\
                  }\n\
                  double mix(int a, float b) { return a / 2 + b * 1.5; }\n";
    let mut results = Vec::new();
    for emission in [EmissionKind::InMemory, EmissionKind::IrText, EmissionKind::IrBinary] {
        let program = Pipeline::new(CompileOptions::default().with_emission(emission))
            .load(SourceUnit::c(source))
            .unwrap();
        let steps: i32 = program.call("collatz", (27_i32,)).unwrap();
        let mixed: f64 = program.call("mix", (7_i32, 2.0_f32)).unwrap();
        results.push((steps, mixed));
    }
    assert_eq!(results[0], (111, 6.0));
    assert!(results.iter().all(|r| *r == results[0]));
}

#[test]
fn test_clean_compilation_always_yields_a_module() {
    let sources = [
        "int zero(void) { return 0; }\n",
        "void nothing(void) { }\n",
        "#include <math.h>\ndouble half(double x) { return floor(x / 2); }\n",
        "int main(void) { }\n",
    ];
    for source in sources {
        let compilation = FrontEndDriver::default()
            .compile(SourceUnit::c(source))
            .unwrap();
        assert!(!compilation.diagnostics.has_error());
        let module = compilation.into_module().unwrap();
        assert!(!module.is_empty(), "{source}");
    }
}

#[test]
fn test_narrow_integer_arguments() {
    let source = "signed char neg(signed char x) { return -x; }\n\
                  unsigned char wrap(unsigned char x) { return x + 1; }\n\
                  _Bool is_odd(int x) { return x & 1; }\n";
    let program = load_c(source).unwrap();
    assert_eq!(program.call::<_, i8>("neg", (5_i8,)).unwrap(), -5);
    assert_eq!(program.call::<_, u8>("wrap", (255_u8,)).unwrap(), 0);
    assert_eq!(program.call::<_, i8>("is_odd", (7_i32,)).unwrap(), 1);
}

#[test]
fn test_recursion() {
    let fib: i64 = call_c(
        "long long fib(int n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }\n",
        "fib",
        (20_i32,),
    )
    .unwrap();
    assert_eq!(fib, 6765);
}

#[test]
fn test_first_installed_environment_wins() {
    let module = compile_c(
        "int scale(int);\nint apply(int x) { return scale(x); }\n",
        EmissionKind::InMemory,
    )
    .unwrap();
    let mut session = JitSession::create().unwrap();
    environment([SymbolBinding::new("scale", twice as extern "C" fn(i32) -> i32)])
        .install_into(&mut session)
        .unwrap();
    environment([SymbolBinding::new("scale", thrice as extern "C" fn(i32) -> i32)])
        .install_into(&mut session)
        .unwrap();
    session.ingest(module).unwrap();
    let apply = session.lookup("apply").unwrap();
    assert_eq!(apply.invoke::<_, i32>((5_i32,)).unwrap(), 10);
}

#[cfg(unix)]
#[test]
fn test_process_symbols_resolve_when_enabled() {
    let source = SourceUnit::c("#include <stdlib.h>\nint magnitude(int x) { return abs(x); }\n");
    let empty = Arc::new(NativeSymbolEnvironment::empty());

    let strict = Pipeline::default().with_environment(Arc::clone(&empty));
    assert!(matches!(
        strict.load(source.clone()),
        Err(PipelineError::Session(SessionError::Link(
            LinkError::UnresolvedSymbol { .. }
        )))
    ));

    let permissive = Pipeline::default()
        .with_environment(empty)
        .with_session_config(SessionConfig {
            resolution: SymbolResolution::EnvironmentThenProcess,
            ..SessionConfig::default()
        });
    let result: i32 = permissive.run(source, "magnitude", (-9_i32,)).unwrap();
    assert_eq!(result, 9);
}

#[test]
fn test_pipelines_on_separate_threads() {
    let pipeline = Pipeline::default();
    let handles: Vec<_> = (0..4_i32)
        .map(|i| {
            let pipeline = pipeline.clone();
            std::thread::spawn(move || {
                let source = format!("int value(void) {{ return {i} * 10; }}\n");
                pipeline
                    .run::<_, i32>(SourceUnit::c(source), "value", ())
                    .unwrap()
            })
        })
        .collect();
    let values: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(values, [0, 10, 20, 30]);
}
