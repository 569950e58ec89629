//! Saving, loading and resuming policies against the shared fixtures.

use seqrec_core::{
    parse_records, HistoryInitializer, ModelError, PersistenceError, Recommender, State,
};
use seqrec_solver::{persist, MdpSolver, SolverConfig};
use std::path::{Path, PathBuf};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/fixtures");

fn sample_initializer(window: usize) -> HistoryInitializer {
    let text = std::fs::read_to_string(Path::new(FIXTURES).join("histories/sample.ok.jsonl"))
        .expect("Failed to read history fixture");
    let records = parse_records(&text).expect("fixture should parse");
    HistoryInitializer::from_records(records, window, 1.0).expect("valid hyperparameters")
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("seqrec_it_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn config(save_dir: PathBuf) -> SolverConfig {
    SolverConfig {
        discount_factor: 0.9,
        verbose: false,
        save_dir,
        ..SolverConfig::default()
    }
}

#[test]
fn fixture_policy_loads_with_padding_state() {
    let policy = persist::load(&Path::new(FIXTURES).join("policy"), 1).expect("fixture loads");
    assert_eq!(policy.len(), 6);
    assert_eq!(policy.get(&State::cold_start(1)), Some(1));
    assert_eq!(policy.get(&State::from_history(&[4], 1)), Some(5));
}

#[test]
fn fixture_policy_matches_fixture_histories() {
    let init = sample_initializer(1);
    let mut solver = MdpSolver::from_initializer(&init, config(Path::new(FIXTURES).join("policy")))
        .expect("solver builds");
    solver.load_policy().expect("fixture policy fits the state space");
    assert_eq!(solver.recommend(&[1, 2]).expect("known state"), 3);

    let outcome = solver.evaluate_policy().expect("evaluation runs");
    assert!(outcome.converged);
    // Every user who continues from 1 goes on to 2, the fixture's choice.
    assert!(solver.values().get(&State::from_history(&[1], 1)) > 0.0);
}

#[test]
fn trained_policy_round_trips_through_disk() {
    let dir = temp_dir("roundtrip");
    let init = sample_initializer(2);
    let mut solver =
        MdpSolver::from_initializer(&init, config(dir.clone())).expect("solver builds");
    let outcome = solver.policy_iteration(200, false, true).expect("training runs");
    assert!(outcome.converged);
    assert!(solver.model_path().ends_with("mdp-model_k=2.json"));

    let loaded = persist::load(&dir, 2).expect("saved policy loads");
    assert_eq!(&loaded, solver.policy());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn resume_starts_from_saved_policy() {
    let dir = temp_dir("resume");
    let init = sample_initializer(2);
    let mut trained =
        MdpSolver::from_initializer(&init, config(dir.clone())).expect("solver builds");
    let _ = trained.train().expect("training runs");

    let mut fresh =
        MdpSolver::from_initializer(&init, config(dir.clone())).expect("solver builds");
    assert_ne!(fresh.policy(), trained.policy());
    let outcome = fresh.policy_iteration(0, true, false).expect("resume works");
    assert_eq!(outcome.iterations, 0);
    assert_eq!(fresh.policy(), trained.policy());
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn resume_without_saved_policy_starts_fresh() {
    let dir = temp_dir("resume_missing");
    let init = sample_initializer(2);
    let mut solver =
        MdpSolver::from_initializer(&init, config(dir.clone())).expect("solver builds");
    let initial = solver.policy().clone();
    let _ = solver.policy_iteration(0, true, false).expect("missing file is tolerated");
    assert_eq!(solver.policy(), &initial);
    assert!(!dir.exists());
}

#[test]
fn corrupt_policy_is_surfaced_and_leaves_policy_untouched() {
    let dir = temp_dir("corrupt");
    std::fs::create_dir_all(&dir).expect("temp dir");
    std::fs::write(persist::model_path(&dir, 2), "{\"window\": 2, \"entries\": [").expect("write");

    let init = sample_initializer(2);
    let mut solver =
        MdpSolver::from_initializer(&init, config(dir.clone())).expect("solver builds");
    let initial = solver.policy().clone();

    let err = solver.policy_iteration(10, true, false).unwrap_err();
    assert!(matches!(
        err,
        ModelError::Persistence(PersistenceError::Corrupt { .. })
    ));
    assert_eq!(solver.policy(), &initial);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn policy_for_another_state_space_is_rejected() {
    let dir = temp_dir("foreign");
    let init = sample_initializer(1);
    let mut solver =
        MdpSolver::from_initializer(&init, config(dir.clone())).expect("solver builds");
    let mut foreign = solver.policy().clone();
    foreign.insert(State::from_history(&[99], 1), 1);
    persist::save(&dir, 1, &foreign).expect("save");

    let initial = solver.policy().clone();
    let err = solver.load_policy().unwrap_err();
    assert!(err.to_string().contains("does not match the state space"));
    assert_eq!(solver.policy(), &initial);
    let _ = std::fs::remove_dir_all(&dir);
}
