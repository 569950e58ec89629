#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Core types and traits shared by the seqrec crates.
//!
//! A user's recent interactions are folded into a fixed-length [`State`]
//! (a k-gram of item ids). Policies map states to the item that should be
//! recommended next. The solver, ensemble and evaluation crates all speak
//! in terms of the types defined here.

pub mod error;
pub mod history;
pub mod mdp;
#[doc(hidden)]
pub mod telemetry;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use error::{ModelError, PersistenceError, Result};
pub use history::{parse_records, Catalog, HistoryInitializer, InteractionRecord};
pub use mdp::{
    ActionSet, InitialStateSpace, MdpDefinition, ModelInitializer, Outcome, TransitionTable,
};

/// Opaque identifier of a recommendable item.
pub type ItemId = u64;

/// Identifier of a user whose interaction history is replayed.
pub type UserId = String;

/// The most recent `k` interactions of a user, oldest first.
///
/// Slots holding `None` pad the history of users with fewer than `k`
/// recorded interactions. Serialized as a JSON array where the padding
/// slot is `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(Vec<Option<ItemId>>);

impl State {
    pub fn new(slots: Vec<Option<ItemId>>) -> Self {
        Self(slots)
    }

    /// A state with no history at all.
    #[must_use]
    pub fn cold_start(window: usize) -> Self {
        Self(vec![None; window])
    }

    /// Derives the lookup state from a chronological history: the last
    /// `window` items, left-padded with `None` when the history is shorter.
    #[must_use]
    pub fn from_history(history: &[ItemId], window: usize) -> Self {
        let start = history.len().saturating_sub(window);
        let recent = &history[start..];
        let mut slots = vec![None; window - recent.len()];
        slots.extend(recent.iter().copied().map(Some));
        Self(slots)
    }

    /// The state reached after `next` is consumed: oldest slot dropped,
    /// `next` appended.
    #[must_use]
    pub fn shift(&self, next: ItemId) -> Self {
        let mut slots: Vec<Option<ItemId>> = self.0.iter().skip(1).copied().collect();
        slots.push(Some(next));
        Self(slots)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn slots(&self) -> &[Option<ItemId>] {
        &self.0
    }

    #[must_use]
    pub fn is_cold_start(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (idx, slot) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            match slot {
                Some(item) => write!(f, "{item}")?,
                None => f.write_str("-")?,
            }
        }
        f.write_str(")")
    }
}

/// Mapping from state to the action currently judged best for it.
///
/// Backed by an ordered map so snapshots compare and serialize
/// independently of hash order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    actions: BTreeMap<State, ItemId>,
}

impl Policy {
    /// Assigns the same action to every state.
    #[must_use]
    pub fn uniform<'a>(states: impl IntoIterator<Item = &'a State>, action: ItemId) -> Self {
        states
            .into_iter()
            .map(|state| (state.clone(), action))
            .collect()
    }

    /// Untrained baseline: each state gets an action drawn uniformly from
    /// `actions`. The same seed always yields the same policy.
    #[must_use]
    pub fn random<'a>(
        states: impl IntoIterator<Item = &'a State>,
        actions: &ActionSet,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        states
            .into_iter()
            .filter_map(|state| {
                actions
                    .as_slice()
                    .choose(&mut rng)
                    .map(|action| (state.clone(), *action))
            })
            .collect()
    }

    #[must_use]
    pub fn get(&self, state: &State) -> Option<ItemId> {
        self.actions.get(state).copied()
    }

    /// Like [`Policy::get`], but a state outside the domain is an error.
    pub fn action(&self, state: &State) -> Result<ItemId> {
        self.get(state)
            .ok_or_else(|| ModelError::UnknownState(state.clone()))
    }

    pub fn insert(&mut self, state: State, action: ItemId) -> Option<ItemId> {
        self.actions.insert(state, action)
    }

    #[must_use]
    pub fn contains(&self, state: &State) -> bool {
        self.actions.contains_key(state)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&State, ItemId)> {
        self.actions.iter().map(|(state, action)| (state, *action))
    }

    pub fn states(&self) -> impl Iterator<Item = &State> {
        self.actions.keys()
    }

    /// True if every state of `previous` maps to the same action here.
    /// States missing from `self` count as a mismatch.
    #[must_use]
    pub fn agrees_with(&self, previous: &Policy) -> bool {
        previous
            .iter()
            .all(|(state, action)| self.get(state) == Some(action))
    }
}

impl FromIterator<(State, ItemId)> for Policy {
    fn from_iter<T: IntoIterator<Item = (State, ItemId)>>(iter: T) -> Self {
        Self {
            actions: iter.into_iter().collect(),
        }
    }
}

/// One entry of a ranked recommendation list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub item: ItemId,
    /// One-step lookahead action value under the current value function.
    pub value: f64,
}

/// A top-1 recommendation with its human readable title, if known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub item: ItemId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Something that can recommend the next item for a k-gram state.
///
/// Implementors provide the state-level operations; the history-level
/// methods derive the lookup state via [`State::from_history`].
pub trait Recommender {
    /// Number of items in each state (`k`).
    fn window(&self) -> usize;

    /// The single best action for `state`.
    fn recommend_state(&self, state: &State) -> Result<ItemId>;

    /// The full action set ordered by descending action value. Ties keep
    /// the ascending item id order of the action set.
    fn rank_state(&self, state: &State) -> Result<Vec<RankedItem>>;

    fn recommend(&self, history: &[ItemId]) -> Result<ItemId> {
        self.recommend_state(&State::from_history(history, self.window()))
    }

    fn rank(&self, history: &[ItemId]) -> Result<Vec<RankedItem>> {
        self.rank_state(&State::from_history(history, self.window()))
    }
}
