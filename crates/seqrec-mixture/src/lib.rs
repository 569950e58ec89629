#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Majority-vote ensemble over solvers trained with window lengths `1..=K`.
//!
//! Every sub-model sees the same interaction data; only the number of
//! items per state differs. A prediction collects the top-1 item of each
//! sub-model and ranks the candidates by vote count. Equal vote counts are
//! ordered by ascending item id.

use seqrec_core::{progress, ItemId, ModelError, ModelInitializer, Recommendation, Result};
use seqrec_solver::{RecommendationEngine, SolverConfig, TrainingOutcome};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureConfig {
    /// Largest window length `K`; sub-models use `1..=K`.
    pub max_window: usize,
    /// Shared by every sub-model. `max_iteration` is the training budget.
    pub solver: SolverConfig,
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            max_window: 3,
            solver: SolverConfig {
                save_dir: PathBuf::from("mixture-models"),
                ..SolverConfig::default()
            },
        }
    }
}

impl MixtureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_window == 0 {
            return Err(ModelError::InvalidParameter(
                "mixture needs at least one window length".into(),
            ));
        }
        self.solver.validate()
    }
}

/// A candidate item and the number of sub-models recommending it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub item: ItemId,
    pub votes: usize,
}

#[derive(Debug, Clone)]
pub struct MixtureModel {
    config: MixtureConfig,
    engines: Vec<RecommendationEngine>,
}

impl MixtureModel {
    /// An ensemble without trained sub-models.
    pub fn new(config: MixtureConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            engines: Vec::new(),
        })
    }

    /// Trains and saves one sub-model per window length, in order.
    ///
    /// `initializer_for(k)` must build the model for window `k` from the
    /// same underlying data. The ensemble's sub-models are replaced only if
    /// every window trains successfully.
    pub fn generate_model<I, F>(
        &mut self,
        mut initializer_for: F,
    ) -> Result<Vec<TrainingOutcome>>
    where
        I: ModelInitializer,
        F: FnMut(usize) -> Result<I>,
    {
        let budget = self.config.solver.max_iteration;
        let mut engines = Vec::with_capacity(self.config.max_window);
        let mut outcomes = Vec::with_capacity(self.config.max_window);
        for window in 1..=self.config.max_window {
            progress!(self.config.solver.verbose, "Training sub-model k={window}");
            let init = initializer_for(window)?;
            let mut engine =
                RecommendationEngine::from_initializer(&init, self.config.solver.clone())?;
            outcomes.push(engine.solver_mut().policy_iteration(budget, false, true)?);
            engines.push(engine);
        }
        self.engines = engines;
        Ok(outcomes)
    }

    /// Rebuilds the ensemble from policies saved by
    /// [`MixtureModel::generate_model`]. Any missing or corrupt file fails
    /// the whole load.
    pub fn load<I, F>(config: MixtureConfig, mut initializer_for: F) -> Result<Self>
    where
        I: ModelInitializer,
        F: FnMut(usize) -> Result<I>,
    {
        config.validate()?;
        let mut engines = Vec::with_capacity(config.max_window);
        for window in 1..=config.max_window {
            let init = initializer_for(window)?;
            let mut engine = RecommendationEngine::from_initializer(&init, config.solver.clone())?;
            engine.solver_mut().load_policy()?;
            engines.push(engine);
        }
        Ok(Self { config, engines })
    }

    #[must_use]
    pub fn config(&self) -> &MixtureConfig {
        &self.config
    }

    #[must_use]
    pub fn engines(&self) -> &[RecommendationEngine] {
        &self.engines
    }

    /// Every candidate recommended by at least one sub-model, most votes
    /// first, ties by ascending item id.
    pub fn predict(&self, user: &str) -> Result<Vec<Vote>> {
        if self.engines.is_empty() {
            return Err(ModelError::InvalidModel(
                "mixture has no trained sub-models".into(),
            ));
        }
        let mut counts: BTreeMap<ItemId, usize> = BTreeMap::new();
        for engine in &self.engines {
            let rec = engine.recommend(user)?;
            *counts.entry(rec.item).or_insert(0) += 1;
        }
        Ok(rank_votes(counts))
    }

    /// The winning candidate with its title.
    pub fn predict_top(&self, user: &str) -> Result<Recommendation> {
        let votes = self.predict(user)?;
        let winner = votes
            .first()
            .ok_or_else(|| ModelError::InvalidModel("no sub-model voted".into()))?;
        let title = self
            .engines
            .first()
            .and_then(|engine| engine.catalog().title(winner.item))
            .map(str::to_owned);
        Ok(Recommendation {
            item: winner.item,
            title,
        })
    }
}

fn rank_votes(counts: BTreeMap<ItemId, usize>) -> Vec<Vote> {
    let mut votes: Vec<Vote> = counts
        .into_iter()
        .map(|(item, votes)| Vote { item, votes })
        .collect();
    // Stable sort over ascending ids keeps the id order within a tie.
    votes.sort_by(|a, b| b.votes.cmp(&a.votes));
    votes
}
