#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Offline evaluation of recommendation policies.
//!
//! Both metrics replay each user's history position by position: the first
//! `i` items are shown to the recommender, and the rank of the item the user
//! actually picked next is looked up in the ranked candidate list. Users
//! with a single interaction have nothing to predict and are left out.

use seqrec_core::{
    progress, ItemId, ModelError, ModelInitializer, Policy, RankedItem, Recommender, Result,
    UserId,
};
use seqrec_solver::{MdpSolver, SolverConfig, TrainingOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Default decay parameter of the rank-decay score.
pub const DEFAULT_DECAY_ALPHA: f64 = 10.0;
/// Default cut-off `m` of hit-rate@m.
pub const DEFAULT_HIT_CUTOFF: usize = 10;

/// Per-position scores are scaled to percent.
const SCORE_SCALE: f64 = 100.0;

/// Format version of [`EvaluationReport`].
const REPORT_VERSION: &str = "0.1.0";

/// Fallback timestamp when formatting fails
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Parameters of the two metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricParams {
    /// Rank-decay `alpha`; must be greater than 1.
    pub alpha: f64,
    /// Hit-rate cut-off `m`; must be at least 1.
    pub m: usize,
}

impl Default for MetricParams {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_DECAY_ALPHA,
            m: DEFAULT_HIT_CUTOFF,
        }
    }
}

impl MetricParams {
    pub fn validate(&self) -> Result<()> {
        check_alpha(self.alpha)?;
        check_cutoff(self.m)
    }
}

/// An aggregated metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Mean per-user score, in percent. 0 when no user qualified.
    pub value: f64,
    /// Users with at least two interactions.
    pub users: usize,
    /// Replayed positions over all counted users.
    pub positions: usize,
}

/// Ranks observed while replaying one user's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserReplay {
    pub user: UserId,
    /// 1-based rank of each held-out item, `None` if it was not ranked.
    pub ranks: Vec<Option<usize>>,
}

/// 1-based position of `item` in `ranked`.
#[must_use]
pub fn rank_of(ranked: &[RankedItem], item: ItemId) -> Option<usize> {
    ranked.iter().position(|r| r.item == item).map(|idx| idx + 1)
}

/// Leave-one-out replay of every user with at least two interactions.
pub fn replay<R: Recommender + ?Sized>(
    recommender: &R,
    histories: &BTreeMap<UserId, Vec<ItemId>>,
) -> Result<Vec<UserReplay>> {
    histories
        .iter()
        .filter(|(_, history)| history.len() > 1)
        .map(|(user, history)| {
            let ranks = (1..history.len())
                .map(|i| {
                    let ranked = recommender.rank(&history[..i])?;
                    Ok(rank_of(&ranked, history[i]))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(UserReplay {
                user: user.clone(),
                ranks,
            })
        })
        .collect()
}

/// Mean of `2^((1 - m_i) / (alpha - 1))` per user, scaled to percent,
/// averaged over users. An unranked item scores 0.
#[allow(clippy::cast_precision_loss)]
pub fn decay_score<R: Recommender + ?Sized>(
    recommender: &R,
    histories: &BTreeMap<UserId, Vec<ItemId>>,
    alpha: f64,
) -> Result<Score> {
    check_alpha(alpha)?;
    let replays = replay(recommender, histories)?;
    Ok(aggregate(&replays, |rank| match rank {
        Some(m) => ((1.0 - m as f64) / (alpha - 1.0)).exp2(),
        None => 0.0,
    }))
}

/// Percentage of held-out items ranked within the top `m`, per user,
/// averaged over users.
pub fn hit_rate_score<R: Recommender + ?Sized>(
    recommender: &R,
    histories: &BTreeMap<UserId, Vec<ItemId>>,
    m: usize,
) -> Result<Score> {
    check_cutoff(m)?;
    let replays = replay(recommender, histories)?;
    Ok(aggregate(&replays, |rank| match rank {
        Some(rank) if rank <= m => 1.0,
        _ => 0.0,
    }))
}

#[allow(clippy::cast_precision_loss)]
fn aggregate(replays: &[UserReplay], score: impl Fn(Option<usize>) -> f64) -> Score {
    let positions = replays.iter().map(|r| r.ranks.len()).sum();
    if replays.is_empty() {
        return Score {
            value: 0.0,
            users: 0,
            positions,
        };
    }
    let total: f64 = replays
        .iter()
        .map(|r| {
            let sum: f64 = r.ranks.iter().copied().map(&score).sum();
            SCORE_SCALE * sum / r.ranks.len() as f64
        })
        .sum();
    Score {
        value: total / replays.len() as f64,
        users: replays.len(),
        positions,
    }
}

fn check_alpha(alpha: f64) -> Result<()> {
    if alpha.is_finite() && alpha > 1.0 {
        Ok(())
    } else {
        Err(ModelError::InvalidParameter(format!(
            "decay alpha must be greater than 1, got {alpha}"
        )))
    }
}

fn check_cutoff(m: usize) -> Result<()> {
    if m == 0 {
        Err(ModelError::InvalidParameter(
            "hit-rate cut-off must be at least 1".into(),
        ))
    } else {
        Ok(())
    }
}

/// Which policy an evaluation scores, and with which value function.
///
/// Ranked mode orders actions by their one-step lookahead values, so the
/// value function matters as much as the policy. Untrained sources rank
/// with the initializer's values as they are. The `*Evaluated` variants
/// first evaluate the untrained policy to its fixed point, which is already
/// half a step of policy iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicySource {
    /// The policy saved under the solver's `save_dir` for this window,
    /// with its values re-evaluated.
    Trained,
    /// The initializer's policy and values.
    Initial,
    /// A seeded uniformly random policy with the initializer's values.
    Random { seed: u64 },
    /// The initializer's policy with evaluated values.
    InitialEvaluated,
    /// A seeded uniformly random policy with evaluated values.
    RandomEvaluated { seed: u64 },
}

impl PolicySource {
    /// Whether the value function is evaluated before ranking.
    #[must_use]
    pub fn evaluates_values(self) -> bool {
        matches!(
            self,
            Self::Trained | Self::InitialEvaluated | Self::RandomEvaluated { .. }
        )
    }
}

/// Both metrics for one window length and one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Report format version
    pub version: String,
    /// Timestamp when the report was generated
    pub ts: String,
    pub window: usize,
    pub policy: PolicySource,
    pub params: MetricParams,
    pub decay: Score,
    pub hit_rate: Score,
    /// Sweeps spent evaluating the scored policy before ranking and
    /// whether its values settled. `None` when the source ranks with the
    /// initializer's values.
    pub evaluation: Option<TrainingOutcome>,
}

/// Builds the model for `init`, installs the requested policy, evaluates
/// its value function if the source asks for it and scores it against the
/// initializer's histories.
///
/// A [`PolicySource::Trained`] policy that was never saved fails with a
/// not-found persistence error.
pub fn evaluate_window<I: ModelInitializer + ?Sized>(
    init: &I,
    config: SolverConfig,
    source: PolicySource,
    params: MetricParams,
) -> Result<EvaluationReport> {
    params.validate()?;
    let verbose = config.verbose;
    let mut solver = MdpSolver::from_initializer(init, config)?;
    match source {
        PolicySource::Trained => solver.load_policy()?,
        PolicySource::Initial | PolicySource::InitialEvaluated => {}
        PolicySource::Random { seed } | PolicySource::RandomEvaluated { seed } => {
            let mdp = Arc::clone(solver.mdp());
            solver.set_policy(Policy::random(mdp.states(), mdp.actions(), seed))?;
        }
    }
    let evaluation = if source.evaluates_values() {
        Some(solver.evaluate_policy()?)
    } else {
        None
    };

    let window = solver.mdp().window();
    progress!(verbose, "Scoring {source:?} policy for window {window}");
    let histories = init.user_histories();
    Ok(EvaluationReport {
        version: REPORT_VERSION.to_string(),
        ts: iso8601_now(),
        window,
        policy: source,
        params,
        decay: decay_score(&solver, histories, params.alpha)?,
        hit_rate: hit_rate_score(&solver, histories, params.m)?,
        evaluation,
    })
}

/// Trained and random-baseline reports for one window length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub window: usize,
    /// How policy iteration ended for the trained policy.
    pub training: TrainingOutcome,
    pub trained: EvaluationReport,
    pub random: EvaluationReport,
}

/// For each window `1..=max_window`: trains and saves a policy, then
/// scores it next to an untrained random policy drawn with `seed`.
pub fn compare_baselines<I, F>(
    max_window: usize,
    config: &SolverConfig,
    params: MetricParams,
    seed: u64,
    mut initializer_for: F,
) -> Result<Vec<BaselineComparison>>
where
    I: ModelInitializer,
    F: FnMut(usize) -> Result<I>,
{
    params.validate()?;
    (1..=max_window)
        .map(|window| {
            let init = initializer_for(window)?;
            let mut solver = MdpSolver::from_initializer(&init, config.clone())?;
            let training = solver.train()?;
            Ok(BaselineComparison {
                window,
                training,
                trained: evaluate_window(&init, config.clone(), PolicySource::Trained, params)?,
                random: evaluate_window(
                    &init,
                    config.clone(),
                    PolicySource::Random { seed },
                    params,
                )?,
            })
        })
        .collect()
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}
