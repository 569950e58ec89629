#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Policy iteration over the k-gram recommendation MDP.
//!
//! [`MdpSolver`] owns only the mutable parts of the problem, the value
//! function and the policy. States, actions and transitions live in a shared,
//! read-only [`MdpDefinition`], so several solvers (one per window length)
//! can coexist without hidden shared state.
//!
//! Each training iteration is one synchronous evaluation sweep of the
//! current policy followed by one greedy improvement sweep (modified policy
//! iteration). Every `check_interval` iterations the policy is compared with
//! the previous snapshot; training stops early when they agree.

mod config;
pub mod engine;
pub mod persist;
mod sweep;
mod values;

use seqrec_core::{
    progress, warning, InitialStateSpace, ItemId, MdpDefinition, ModelError, ModelInitializer,
    PersistenceError, Policy, RankedItem, Recommender, Result, State,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use config::SolverConfig;
pub use engine::RecommendationEngine;
pub use values::ValueFunction;

/// Action values of one state, in action-set order.
pub type ActionValues = Vec<(ItemId, f64)>;

/// How a training (or evaluation) loop ended.
///
/// `converged == false` means the sweep budget ran out before the policy
/// (or value function) settled; results are usable but not a fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[must_use]
pub struct TrainingOutcome {
    pub iterations: usize,
    pub converged: bool,
}

#[derive(Debug, Clone)]
pub struct MdpSolver {
    mdp: Arc<MdpDefinition>,
    config: SolverConfig,
    values: ValueFunction,
    policy: Policy,
}

impl MdpSolver {
    /// Creates a solver starting from the initializer's values and policy.
    pub fn new(
        mdp: Arc<MdpDefinition>,
        initial: InitialStateSpace,
        config: SolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        mdp.validate_policy(&initial.policy)?;
        Ok(Self {
            mdp,
            config,
            values: ValueFunction::from(initial.values),
            policy: initial.policy,
        })
    }

    pub fn from_initializer<I: ModelInitializer + ?Sized>(
        init: &I,
        config: SolverConfig,
    ) -> Result<Self> {
        config.validate()?;
        let (mdp, initial) = MdpDefinition::from_initializer(init, config.verbose)?;
        Self::new(Arc::new(mdp), initial, config)
    }

    #[must_use]
    pub fn mdp(&self) -> &Arc<MdpDefinition> {
        &self.mdp
    }

    #[must_use]
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    #[must_use]
    pub fn values(&self) -> &ValueFunction {
        &self.values
    }

    /// Replaces the policy wholesale, e.g. with a random baseline.
    pub fn set_policy(&mut self, policy: Policy) -> Result<()> {
        self.mdp.validate_policy(&policy)?;
        self.policy = policy;
        Ok(())
    }

    /// Expected return of taking `action` in `state` and valuing the
    /// successor with the current value function.
    fn action_value(&self, state: &State, action: ItemId) -> Result<f64> {
        let df = self.config.discount_factor;
        Ok(self
            .mdp
            .row(state, action)?
            .map(|row| {
                row.iter()
                    .map(|(next, o)| o.probability * (o.reward + df * self.values.get(next)))
                    .sum()
            })
            .unwrap_or(0.0))
    }

    /// One-ply expectation for every action, in action-set order.
    pub fn one_step_lookahead(&self, state: &State) -> Result<ActionValues> {
        self.mdp
            .actions()
            .iter()
            .map(|action| Ok((action, self.action_value(state, action)?)))
            .collect()
    }

    /// Greedy improvement over every enumerated state. The new policy is
    /// built completely before it replaces the old one. Returns the number
    /// of states whose action changed.
    pub fn update_policy(&mut self) -> Result<usize> {
        let chosen = sweep::try_map(self.mdp.states(), |state| {
            let values = self.one_step_lookahead(state)?;
            let best = greedy(&values).unwrap_or_else(|| self.mdp.actions().first());
            Ok((state.clone(), best))
        })?;

        let changed = chosen
            .iter()
            .filter(|(state, action)| self.policy.get(state) != Some(*action))
            .count();
        self.policy = chosen.into_iter().collect();

        let mdp = Arc::clone(&self.mdp);
        for state in mdp.states() {
            self.values.materialize(mdp.transitions().next_states(state));
        }
        Ok(changed)
    }

    /// One synchronous evaluation sweep of the current policy: each state
    /// gets the value of its assigned action only. Next-states referenced
    /// by the evaluated rows are present (at 0 when unknown) in the result.
    pub fn policy_eval(&self) -> Result<ValueFunction> {
        let assigned: Vec<(&State, ItemId)> = self.policy.iter().collect();
        let evaluated = sweep::try_map(&assigned, |(state, action)| {
            Ok(((*state).clone(), self.action_value(state, *action)?))
        })?;

        let mut values: ValueFunction = evaluated.into_iter().collect();
        for (state, action) in &assigned {
            if let Some(row) = self.mdp.transitions().row(state, *action) {
                values.materialize(row.keys());
            }
        }
        Ok(values)
    }

    /// True if the current policy assigns the same action as `previous` to
    /// every state of `previous`.
    #[must_use]
    pub fn compare_policy(&self, previous: &Policy) -> bool {
        self.policy.agrees_with(previous)
    }

    /// Alternates `policy_eval` and `update_policy` up to `max_iteration`
    /// times.
    ///
    /// The policy is snapshotted after the first iteration and then every
    /// `check_interval` iterations; if a snapshot equals the previous one
    /// training stops and the outcome is marked converged. The first
    /// snapshot is compared against the starting policy.
    ///
    /// With `resume`, a previously saved policy is the starting point. A
    /// missing file falls back to the current policy; a corrupt file is an
    /// error. With `persist`, the final policy is saved.
    pub fn policy_iteration(
        &mut self,
        max_iteration: usize,
        resume: bool,
        persist: bool,
    ) -> Result<TrainingOutcome> {
        if resume {
            match self.load_policy() {
                Ok(()) => {}
                Err(ModelError::Persistence(e)) if e.is_not_found() => {
                    warning!("{e}; starting from the initial policy");
                }
                Err(e) => return Err(e),
            }
        }

        let verbose = self.config.verbose;
        let interval = self.config.check_interval;
        let mut snapshot = self.policy.clone();
        let mut outcome = TrainingOutcome {
            iterations: 0,
            converged: false,
        };

        for i in 0..max_iteration {
            progress!(verbose, "Iteration {i}:");
            self.values = self.policy_eval()?;
            self.update_policy()?;
            outcome.iterations = i + 1;

            if i % interval == 0 {
                if self.compare_policy(&snapshot) {
                    progress!(verbose, "Policy converged at iteration {}", i + 1);
                    outcome.converged = true;
                    break;
                }
                snapshot = self.policy.clone();
            }
        }

        if !outcome.converged {
            warning!(
                "policy for window {} did not converge within {max_iteration} iterations",
                self.mdp.window()
            );
        }
        if persist {
            self.save_policy()?;
        }
        Ok(outcome)
    }

    /// [`MdpSolver::policy_iteration`] with the configured budget, saving
    /// the result.
    pub fn train(&mut self) -> Result<TrainingOutcome> {
        self.policy_iteration(self.config.max_iteration, false, true)
    }

    /// Repeats the evaluation sweep for the fixed current policy until no
    /// value moves by more than `value_tolerance` times the largest absolute
    /// value (or times 1, for small values). Used to recover values for a
    /// loaded policy, since only the policy is persisted.
    ///
    /// The sweep budget is [`SolverConfig::eval_sweep_budget`].
    pub fn evaluate_policy(&mut self) -> Result<TrainingOutcome> {
        let budget = self.config.eval_sweep_budget();
        for sweep in 1..=budget {
            let next = self.policy_eval()?;
            let delta = next.max_abs_diff(&self.values);
            let scale = next.max_abs().max(1.0);
            self.values = next;
            if delta <= self.config.value_tolerance * scale {
                return Ok(TrainingOutcome {
                    iterations: sweep,
                    converged: true,
                });
            }
        }
        warning!(
            "policy evaluation for window {} did not settle within {budget} sweeps",
            self.mdp.window()
        );
        Ok(TrainingOutcome {
            iterations: budget,
            converged: false,
        })
    }

    #[must_use]
    pub fn model_path(&self) -> PathBuf {
        persist::model_path(&self.config.save_dir, self.mdp.window())
    }

    pub fn save_policy(&self) -> Result<PathBuf> {
        progress!(
            self.config.verbose,
            "Saving model to {}",
            self.model_path().display()
        );
        Ok(persist::save(
            &self.config.save_dir,
            self.mdp.window(),
            &self.policy,
        )?)
    }

    /// Replaces the policy with the saved one. On any error the current
    /// policy is left untouched.
    pub fn load_policy(&mut self) -> Result<()> {
        let path = self.model_path();
        progress!(self.config.verbose, "Loading model from {}", path.display());
        let loaded = persist::load(&self.config.save_dir, self.mdp.window())?;
        self.mdp
            .validate_policy(&loaded)
            .map_err(|e| PersistenceError::Corrupt {
                path,
                reason: format!("does not match the state space: {e}"),
            })?;
        self.policy = loaded;
        Ok(())
    }
}

impl Recommender for MdpSolver {
    fn window(&self) -> usize {
        self.mdp.window()
    }

    fn recommend_state(&self, state: &State) -> Result<ItemId> {
        self.policy.action(state)
    }

    fn rank_state(&self, state: &State) -> Result<Vec<RankedItem>> {
        let mut ranked: Vec<RankedItem> = self
            .one_step_lookahead(state)?
            .into_iter()
            .map(|(item, value)| RankedItem { item, value })
            .collect();
        // Stable: equal values keep action-set order.
        ranked.sort_by(|a, b| b.value.total_cmp(&a.value));
        Ok(ranked)
    }
}

/// First action with the maximal value; later actions must be strictly
/// better to win.
fn greedy(values: &[(ItemId, f64)]) -> Option<ItemId> {
    let mut best: Option<(ItemId, f64)> = None;
    for &(action, value) in values {
        match best {
            Some((_, top)) if value <= top => {}
            _ => best = Some((action, value)),
        }
    }
    best.map(|(action, _)| action)
}
