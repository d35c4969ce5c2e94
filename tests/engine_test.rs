//! UCI client against a scripted fake engine.
#![cfg(unix)]

mod common;

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use common::temp_path;
use repertoire::{EvaluatorFactory, PositionEvaluator, RepertoireError, StockfishEvaluator, StockfishSettings};
use shakmaty::uci::UciMove;
use shakmaty::{Chess, Position};

const FAKE_ENGINE: &str = r#"#!/bin/sh
while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) echo "info depth 12 score cp 35 nodes 1000 pv e2e4"; echo "bestmove e2e4" ;;
    quit) exit 0 ;;
  esac
done
"#;

const CRASHING_ENGINE: &str = r#"#!/bin/sh
while read -r line; do
  case "$line" in
    uci) echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) exit 1 ;;
  esac
done
"#;

fn write_script(name: &str, body: &str) -> PathBuf {
    let path = temp_path(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn cleanup(path: &Path) {
    let _ = fs::remove_file(path);
}

// One test so the scripts are never exec'd while another thread writes a file
#[test]
fn test_uci_session_with_fake_engine() {
    let script = write_script("fakefish.sh", FAKE_ENGINE);

    let mut evaluator = StockfishEvaluator::new(&script, 12);
    evaluator.start().unwrap();
    assert!(evaluator.is_started());

    let start = Chess::default();
    let eval = evaluator.evaluate(&start).unwrap();
    assert_eq!(eval.score_cp, 35);
    assert_eq!(eval.depth, 12);
    assert_eq!(eval.mate_in, None);
    assert_eq!(eval.best_move, Some("e2e4".parse::<UciMove>().unwrap()));

    // Engine reports side-to-move scores; Black to move flips the sign
    let mut after_e4 = start.clone();
    let e4 = "e2e4".parse::<UciMove>().unwrap().to_move(&start).unwrap();
    after_e4.play_unchecked(e4);
    assert_eq!(evaluator.evaluate(&after_e4).unwrap().score_cp, -35);

    evaluator.stop();
    evaluator.stop();
    assert!(!evaluator.is_started());
    assert!(matches!(evaluator.evaluate(&start), Err(RepertoireError::EngineNotStarted)));

    let settings = StockfishSettings { path: script.clone(), depth: 8 };
    let mut started = settings.start().unwrap();
    assert_eq!(started.evaluate(&start).unwrap().score_cp, 35);
    started.stop();
    cleanup(&script);

    let crashing = write_script("crashfish.sh", CRASHING_ENGINE);
    let mut evaluator = StockfishEvaluator::new(&crashing, 12);
    evaluator.start().unwrap();
    assert!(matches!(evaluator.evaluate(&start), Err(RepertoireError::Engine(_))));
    evaluator.stop();
    cleanup(&crashing);
}
