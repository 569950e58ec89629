use seqrec_core::{ModelError, PersistenceError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Tunables of a single policy-iteration solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Discount applied to next-state values, strictly between 0 and 1.
    pub discount_factor: f64,
    /// Default sweep budget for [`crate::MdpSolver::train`].
    pub max_iteration: usize,
    /// Number of sweeps between two policy snapshots in the convergence test.
    pub check_interval: usize,
    /// Directory holding persisted policies.
    pub save_dir: PathBuf,
    pub verbose: bool,
    /// Stop criterion of `evaluate_policy`, relative to the largest
    /// absolute value (at least 1).
    pub value_tolerance: f64,
    /// Sweep budget for `evaluate_policy`. `None` derives it from the
    /// discount factor and the tolerance, see
    /// [`SolverConfig::eval_sweep_budget`].
    pub max_eval_sweeps: Option<usize>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            discount_factor: 0.999,
            max_iteration: 1000,
            check_interval: 10,
            save_dir: PathBuf::from("saved-models"),
            verbose: true,
            value_tolerance: 1e-9,
            max_eval_sweeps: None,
        }
    }
}

impl SolverConfig {
    /// Reads a JSON config. A missing file yields the defaults; fields
    /// absent from the file keep their default values.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = File::open(path).map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            ModelError::InvalidParameter(format!("config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sweeps after which a change of at most 1 per sweep has shrunk below
    /// the tolerance: `ln(tol) / ln(df)`, rounded up.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn eval_sweep_budget(&self) -> usize {
        if let Some(budget) = self.max_eval_sweeps {
            return budget;
        }
        let sweeps = (self.value_tolerance.ln() / self.discount_factor.ln()).ceil();
        if sweeps.is_finite() && sweeps >= 1.0 {
            sweeps as usize
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.discount_factor > 0.0 && self.discount_factor < 1.0) {
            return Err(ModelError::InvalidParameter(format!(
                "discount factor must be in (0, 1), got {}",
                self.discount_factor
            )));
        }
        if self.check_interval == 0 {
            return Err(ModelError::InvalidParameter(
                "check interval must be at least 1".into(),
            ));
        }
        if !(self.value_tolerance.is_finite() && self.value_tolerance > 0.0) {
            return Err(ModelError::InvalidParameter(format!(
                "value tolerance must be positive, got {}",
                self.value_tolerance
            )));
        }
        if self.max_eval_sweeps == Some(0) {
            return Err(ModelError::InvalidParameter(
                "evaluation sweep budget must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
