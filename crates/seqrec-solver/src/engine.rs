//! User-facing recommendation on top of a solver.

use crate::{MdpSolver, SolverConfig};
use seqrec_core::{
    progress, Catalog, ModelInitializer, RankedItem, Recommendation, Recommender, Result,
};
use std::sync::Arc;

/// Looks up a user's history in the [`Catalog`] and asks the solver for
/// the next item, either as a single best guess or as a full ranking.
///
/// Inference only reads the solver; train first, then serve.
#[derive(Debug, Clone)]
pub struct RecommendationEngine {
    solver: MdpSolver,
    catalog: Arc<Catalog>,
}

impl RecommendationEngine {
    #[must_use]
    pub fn new(solver: MdpSolver, catalog: Arc<Catalog>) -> Self {
        Self { solver, catalog }
    }

    pub fn from_initializer<I: ModelInitializer + ?Sized>(
        init: &I,
        config: SolverConfig,
    ) -> Result<Self> {
        let solver = MdpSolver::from_initializer(init, config)?;
        Ok(Self::new(solver, Arc::new(init.catalog())))
    }

    #[must_use]
    pub fn solver(&self) -> &MdpSolver {
        &self.solver
    }

    pub fn solver_mut(&mut self) -> &mut MdpSolver {
        &mut self.solver
    }

    #[must_use]
    pub fn into_solver(self) -> MdpSolver {
        self.solver
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Top-1 mode: the policy's action for the user's current state.
    pub fn recommend(&self, user: &str) -> Result<Recommendation> {
        progress!(self.solver.config().verbose, "Recommending for {user}");
        let history = self.catalog.history(user)?;
        let item = self.solver.recommend(history)?;
        Ok(Recommendation {
            item,
            title: self.catalog.title(item).map(str::to_owned),
        })
    }

    /// Ranked mode: every action, best first.
    pub fn rank(&self, user: &str) -> Result<Vec<RankedItem>> {
        let history = self.catalog.history(user)?;
        self.solver.rank(history)
    }
}
