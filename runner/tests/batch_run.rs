//! Batch runs over case directories on disk.

use runner::batch::{BatchRunner, CaseKind, CaseOutcome, CaseSet};
use runner::core::device_id::DeviceId;
use runner::exit_codes;
use runner::harness::HarnessOptions;
use runner::io::host::RunnerHost;
use runner::test_support::{
    CaseDir, ScriptedCompiler, ScriptedFactory, ScriptedFrame, verdict_frame,
};

fn fixture() -> CaseDir {
    let dir = CaseDir::new().expect("dir");
    dir.write("compiler-tests/b.ts", b"ok()").expect("write");
    dir.write("compiler-tests/a.ts", b"syntax error").expect("write");
    dir.write("run-tests/pass.ts", b"assert(true)").expect("write");
    dir
}

#[tokio::test(start_paused = true)]
async fn failing_cases_do_not_stop_the_batch() {
    let dir = fixture();
    let host = RunnerHost::new(dir.path().join("built"), dir.path().join("specs.json"));
    let compiler = ScriptedCompiler::new();
    let factory = ScriptedFactory::new(vec![ScriptedFrame::after(
        10,
        verdict_frame(&DeviceId::default(), 0),
    )]);
    let cases = CaseSet::discover(
        &[dir.path().join("compiler-tests")],
        &[dir.path().join("run-tests")],
    )
    .expect("discover");
    let runner = BatchRunner::new(&compiler, &host, &factory, HarnessOptions::default());

    let mut out = Vec::new();
    let report = runner.run(&cases, &mut out).await.expect("batch");

    assert_eq!(report.cases.len(), 3);
    assert_eq!(compiler.test_calls(), 2);
    assert_eq!(report.cases[0].kind, CaseKind::CompileOnly);
    assert!(matches!(report.cases[0].outcome, CaseOutcome::Errored { .. }));
    assert_eq!(report.cases[1].outcome, CaseOutcome::Passed);
    assert_eq!(report.cases[2].outcome, CaseOutcome::Passed);
    assert_eq!(report.exit_code(), exit_codes::FAILED);

    let out = String::from_utf8(out).expect("utf8");
    let lines: Vec<_> = out.lines().collect();
    assert!(lines[0].starts_with("*** test ") && lines[0].ends_with("a.ts"));
    assert!(lines[1].starts_with("error: compilation failed"));
    assert!(lines[2].ends_with("b.ts"));
    assert!(lines[3].starts_with("*** run ") && lines[3].ends_with("pass.ts"));
    assert_eq!(lines[4], "test OK");
    assert_eq!(lines[5], "3 cases, 2 passed, 1 failed");
}

#[tokio::test(start_paused = true)]
async fn timeouts_are_reported_distinctly() {
    let dir = CaseDir::new().expect("dir");
    dir.write("run-tests/hang.ts", b"while(true){}").expect("write");
    let host = RunnerHost::new(dir.path().join("built"), dir.path().join("specs.json"));
    let compiler = ScriptedCompiler::new();
    let factory = ScriptedFactory::new(Vec::new());
    let cases = CaseSet {
        compile_only: Vec::new(),
        run: vec![dir.path().join("run-tests/hang.ts")],
    };
    let runner = BatchRunner::new(&compiler, &host, &factory, HarnessOptions::default());

    let mut out = Vec::new();
    let report = runner.run(&cases, &mut out).await.expect("batch");
    assert_eq!(report.cases[0].outcome, CaseOutcome::TimedOut);
    assert!(String::from_utf8(out).expect("utf8").contains("\ntimeout\n"));
}

#[tokio::test(start_paused = true)]
async fn all_passing_batch_exits_ok() {
    let dir = CaseDir::new().expect("dir");
    dir.write("samples/blink.ts", b"led.on()").expect("write");
    let host = RunnerHost::new(dir.path().join("built"), dir.path().join("specs.json"));
    let compiler = ScriptedCompiler::new();
    let factory = ScriptedFactory::new(Vec::new());
    let cases = CaseSet::discover(&[dir.path().join("samples")], &[]).expect("discover");
    let runner = BatchRunner::new(&compiler, &host, &factory, HarnessOptions::default());

    let report = runner.run(&cases, &mut Vec::new()).await.expect("batch");
    assert!(report.passed());
    assert_eq!(report.exit_code(), exit_codes::OK);
    assert_eq!(factory.instances(), 0);
}
