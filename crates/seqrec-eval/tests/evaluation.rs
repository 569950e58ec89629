//! Scoring trained and untrained policies on the shared fixtures.

use seqrec_core::{parse_records, HistoryInitializer, InteractionRecord, ItemId, ModelError};
use seqrec_eval::{compare_baselines, evaluate_window, MetricParams, PolicySource};
use seqrec_solver::{MdpSolver, SolverConfig};
use std::path::{Path, PathBuf};

const FIXTURES: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../tests/fixtures");

fn sample(window: usize) -> HistoryInitializer {
    let text = std::fs::read_to_string(Path::new(FIXTURES).join("histories/sample.ok.jsonl"))
        .expect("Failed to read history fixture");
    let records = parse_records(&text).expect("fixture should parse");
    HistoryInitializer::from_records(records, window, 1.0).expect("valid hyperparameters")
}

/// p: 2, 3, 5 / q: 2, 3, 5 / r: 2, 4, 1 with `alpha = 3`.
///
/// After 2, taking 3 or 4 is the only choice with a reward; 3 is the more
/// frequent continuation, 4 leads on to another reward.
fn branching() -> HistoryInitializer {
    let histories: [(&str, &[ItemId]); 3] =
        [("p", &[2, 3, 5]), ("q", &[2, 3, 5]), ("r", &[2, 4, 1])];
    let records = histories.iter().flat_map(|(user, items)| {
        items.iter().map(|item| InteractionRecord {
            user: (*user).to_string(),
            item: *item,
            title: None,
        })
    });
    HistoryInitializer::from_records(records, 1, 3.0).expect("valid hyperparameters")
}

fn config(name: &str) -> SolverConfig {
    let save_dir: PathBuf =
        std::env::temp_dir().join(format!("seqrec_eval_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&save_dir);
    SolverConfig {
        discount_factor: 0.9,
        verbose: false,
        save_dir,
        ..SolverConfig::default()
    }
}

#[test]
fn trained_policy_is_scored_from_disk() {
    let init = sample(2);
    let config = config("trained");
    let mut solver = MdpSolver::from_initializer(&init, config.clone()).expect("solver builds");
    let _ = solver.train().expect("training runs");

    let params = MetricParams::default();
    let report = evaluate_window(&init, config.clone(), PolicySource::Trained, params)
        .expect("saved policy scores");
    assert_eq!(report.window, 2);
    assert_eq!(report.policy, PolicySource::Trained);
    assert!(report.evaluation.expect("trained values are evaluated").converged);
    // u5 has a single interaction; the other four replay 3 + 2 + 3 + 2 positions.
    assert_eq!(report.decay.users, 4);
    assert_eq!(report.decay.positions, 10);
    assert_eq!(report.hit_rate.users, 4);
    // Five actions, cut-off ten: every held-out item is a hit.
    assert!((report.hit_rate.value - 100.0).abs() < 1e-9);
    assert!(report.decay.value > 0.0 && report.decay.value <= 100.0);
    let _ = std::fs::remove_dir_all(&config.save_dir);
}

#[test]
fn trained_scores_match_hand_ranked_histories() {
    let init = branching();
    let config = config("branching_trained");
    let mut solver = MdpSolver::from_initializer(&init, config.clone()).expect("solver builds");
    assert!(solver.train().expect("training runs").converged);

    let params = MetricParams { alpha: 2.0, m: 1 };
    let report =
        evaluate_window(&init, config.clone(), PolicySource::Trained, params).expect("scores");
    // Ranking after 2 is [3, 4, 1, 2, 5]; after 3 and after 4 the only
    // continuation (5, resp. 1) comes first. Only r's 4 sits at rank 2.
    // decay: p 100, q 100, r (0.5 + 1) / 2 = 75. hit@1: 100, 100, 50.
    assert_eq!(report.decay.users, 3);
    assert_eq!(report.decay.positions, 6);
    assert!((report.decay.value - 275.0 / 3.0).abs() < 1e-9);
    assert!((report.hit_rate.value - 250.0 / 3.0).abs() < 1e-9);
    let _ = std::fs::remove_dir_all(&config.save_dir);
}

#[test]
fn untrained_sources_rank_with_initial_values() {
    let init = branching();
    let params = MetricParams { alpha: 2.0, m: 1 };

    // All-zero values: after 2, 3 (reward with probability 6/7) beats 4 (3/5).
    let initial = evaluate_window(&init, config("initial_zero"), PolicySource::Initial, params)
        .expect("scores");
    assert_eq!(initial.evaluation, None);
    assert!((initial.hit_rate.value - 250.0 / 3.0).abs() < 1e-9);
    assert!((initial.decay.value - 275.0 / 3.0).abs() < 1e-9);

    // Zero values make the ranking independent of the policy.
    let random = evaluate_window(
        &init,
        config("random_zero"),
        PolicySource::Random { seed: 11 },
        params,
    )
    .expect("scores");
    assert_eq!(random.evaluation, None);
    assert_eq!(random.hit_rate, initial.hit_rate);
    assert_eq!(random.decay, initial.decay);

    // Evaluating the initial policy (always 1) credits 4 with the reward
    // for 1 that follows it, which moves 4 ahead of 3 after 2.
    let evaluated = evaluate_window(
        &init,
        config("initial_evaluated"),
        PolicySource::InitialEvaluated,
        params,
    )
    .expect("scores");
    assert!(evaluated.evaluation.expect("values are evaluated").converged);
    assert!((evaluated.hit_rate.value - 200.0 / 3.0).abs() < 1e-9);
    assert!((evaluated.decay.value - 250.0 / 3.0).abs() < 1e-9);
}

#[test]
fn revisits_settle_under_default_settings() {
    let records = [1, 2, 1, 2, 1].into_iter().map(|item| InteractionRecord {
        user: "a".into(),
        item,
        title: None,
    });
    let init = HistoryInitializer::from_records(records, 1, 1.0).expect("valid hyperparameters");
    // Default discount, tolerance and sweep budget.
    let config = SolverConfig {
        verbose: false,
        save_dir: config("revisits").save_dir,
        ..SolverConfig::default()
    };
    let report = evaluate_window(
        &init,
        config,
        PolicySource::RandomEvaluated { seed: 1 },
        MetricParams::default(),
    )
    .expect("scores");
    assert!(report.evaluation.expect("values are evaluated").converged);
}

#[test]
fn trained_without_saved_policy_is_not_found() {
    let err = evaluate_window(
        &sample(1),
        config("unsaved"),
        PolicySource::Trained,
        MetricParams::default(),
    )
    .unwrap_err();
    match err {
        ModelError::Persistence(e) => assert!(e.is_not_found()),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn random_baseline_is_reproducible() {
    let init = sample(1);
    let params = MetricParams { alpha: 2.0, m: 1 };
    let source = PolicySource::Random { seed: 42 };
    let a = evaluate_window(&init, config("random_a"), source, params).expect("scores");
    let b = evaluate_window(&init, config("random_b"), source, params).expect("scores");
    assert_eq!(a.decay, b.decay);
    assert_eq!(a.hit_rate, b.hit_rate);
}

#[test]
fn initial_policy_can_be_scored() {
    let report = evaluate_window(
        &sample(3),
        config("initial"),
        PolicySource::Initial,
        MetricParams::default(),
    )
    .expect("scores");
    assert_eq!(report.policy, PolicySource::Initial);
    assert_eq!(report.decay.users, 4);
}

#[test]
fn invalid_params_fail_before_any_work() {
    let err = evaluate_window(
        &sample(1),
        config("invalid"),
        PolicySource::Initial,
        MetricParams { alpha: 1.0, m: 10 },
    )
    .unwrap_err();
    assert!(matches!(err, ModelError::InvalidParameter(_)));
}

#[test]
fn baselines_cover_every_window() {
    let base = sample(1);
    let config = config("baselines");
    let comparisons = compare_baselines(3, &config, MetricParams::default(), 7, |k| {
        base.with_window(k)
    })
    .expect("every window trains and scores");
    let windows: Vec<usize> = comparisons.iter().map(|c| c.window).collect();
    assert_eq!(windows, vec![1, 2, 3]);
    for c in &comparisons {
        assert!(c.training.converged, "window {}", c.window);
        assert!(c.training.iterations >= 1);
        assert_eq!(c.random.evaluation, None);
        assert_eq!(c.trained.window, c.window);
        assert_eq!(c.random.policy, PolicySource::Random { seed: 7 });
        assert_eq!(c.trained.decay.users, c.random.decay.users);
        assert!(config.save_dir.join(format!("mdp-model_k={}.json", c.window)).exists());
    }
    let _ = std::fs::remove_dir_all(&config.save_dir);
}
