//! Log replay through a compiler backend that understands device logs.

use std::path::PathBuf;

use runner::logparse::{ReplayMode, ReplayRequest, replay_log};
use runner::test_support::{CaseDir, ScriptedCompiler, ScriptedLog};

fn compiler() -> ScriptedCompiler {
    ScriptedCompiler::new().with_log(ScriptedLog {
        generations: vec![
            vec!["boot".to_string()],
            vec!["boot".to_string(), "reset".to_string()],
            vec!["boot".to_string(), "panic 3".to_string()],
        ],
    })
}

fn replay(args: &[&str]) -> String {
    let dir = CaseDir::new().expect("dir");
    let path = dir.write("device.log", b"LOG1 rest of log").expect("write");
    let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    let request = ReplayRequest::from_args(path, &args);
    let mut out = Vec::new();
    replay_log(&compiler(), &request, &mut out).expect("replay");
    String::from_utf8(out).expect("utf8")
}

#[test]
fn overview_only_without_generation() {
    assert_eq!(replay(&[]), "log LOG1 generations=3\n");
    assert_eq!(replay(&["0", "stats"]), "log LOG1 generations=3\n");
}

#[test]
fn events_of_the_selected_generation() {
    assert_eq!(replay(&["2"]), "log LOG1 generations=3\nboot\npanic 3\n");
}

#[test]
fn stats_of_the_selected_generation() {
    assert_eq!(
        replay(&["1", "stats"]),
        "log LOG1 generations=3\n{\n  \"events\": 2\n}\n"
    );
}

#[test]
fn request_parsing() {
    let request = ReplayRequest::from_args(PathBuf::from("x.log"), &["4".into(), "stats".into()]);
    assert_eq!(request.generation, Some(4));
    assert_eq!(request.mode, ReplayMode::Stats);
    let request = ReplayRequest::from_args(PathBuf::from("x.log"), &["latest".into()]);
    assert_eq!(request.generation, None);
}

#[test]
fn backend_without_log_support_fails() {
    let dir = CaseDir::new().expect("dir");
    let path = dir.write("device.log", b"LOG1").expect("write");
    let request = ReplayRequest::from_args(path, &[]);
    let err = replay_log(&ScriptedCompiler::new(), &request, &mut Vec::new()).unwrap_err();
    assert!(format!("{err:#}").contains("no scripted log"));
}
