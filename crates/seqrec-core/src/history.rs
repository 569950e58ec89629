//! User interaction histories and the in-memory model initializer built
//! from them.

use crate::mdp::{ActionSet, InitialStateSpace, ModelInitializer, TransitionTable};
use crate::{ItemId, ModelError, Policy, Result, State, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Reward of a transition in which the user took the recommended item.
const ACCEPTED_REWARD: f64 = 1.0;
/// Reward of a transition in which the user went elsewhere.
const IGNORED_REWARD: f64 = 0.0;

/// One interaction as it arrives from the data-preparation pipeline,
/// typically one JSON object per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub user: UserId,
    pub item: ItemId,
    /// Human readable item title; the first title seen for an item wins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Parses interaction records, one JSON object per line. Blank lines are
/// skipped; the first malformed line fails the whole batch.
pub fn parse_records(text: &str) -> Result<Vec<InteractionRecord>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .map_err(|e| ModelError::InvalidModel(format!("record on line {}: {e}", idx + 1)))
        })
        .collect()
}

/// Item titles and chronological per-user histories.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    titles: HashMap<ItemId, String>,
    histories: BTreeMap<UserId, Vec<ItemId>>,
}

impl Catalog {
    #[must_use]
    pub fn new(titles: HashMap<ItemId, String>, histories: BTreeMap<UserId, Vec<ItemId>>) -> Self {
        Self { titles, histories }
    }

    /// Groups records by user, keeping input order as chronological order.
    pub fn from_records(records: impl IntoIterator<Item = InteractionRecord>) -> Self {
        let mut catalog = Self::default();
        for record in records {
            if let Some(title) = record.title {
                catalog.titles.entry(record.item).or_insert(title);
            }
            catalog
                .histories
                .entry(record.user)
                .or_default()
                .push(record.item);
        }
        catalog
    }

    #[must_use]
    pub fn title(&self, item: ItemId) -> Option<&str> {
        self.titles.get(&item).map(String::as_str)
    }

    pub fn history(&self, user: &str) -> Result<&[ItemId]> {
        self.histories
            .get(user)
            .map(Vec::as_slice)
            .ok_or_else(|| ModelError::UnknownUser(user.to_string()))
    }

    #[must_use]
    pub fn titles(&self) -> &HashMap<ItemId, String> {
        &self.titles
    }

    #[must_use]
    pub fn histories(&self) -> &BTreeMap<UserId, Vec<ItemId>> {
        &self.histories
    }

    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.histories.keys().map(String::as_str)
    }
}

/// Builds the k-gram model directly from a [`Catalog`].
///
/// * actions: every item seen in a history or the title table;
/// * states: the k-gram after each prefix of each history, plus the
///   all-padding cold-start state;
/// * transitions: for state `s` with observed continuation counts `c(s, x)`,
///   taking action `a` leads to `s.shift(x)` with probability proportional
///   to `c(s, x)`, scaled by `alpha` when `x == a`. The reward is 1 when the
///   user took the recommended item and 0 otherwise.
#[derive(Debug, Clone)]
pub struct HistoryInitializer {
    catalog: Catalog,
    window: usize,
    alpha: f64,
}

impl HistoryInitializer {
    pub const DEFAULT_WINDOW: usize = 3;
    pub const DEFAULT_ALPHA: f64 = 1.0;

    pub fn new(catalog: Catalog, window: usize, alpha: f64) -> Result<Self> {
        if window == 0 {
            return Err(ModelError::InvalidParameter(
                "window length must be at least 1".into(),
            ));
        }
        if !alpha.is_finite() || alpha <= 0.0 {
            return Err(ModelError::InvalidParameter(format!(
                "proportionality constant must be positive, got {alpha}"
            )));
        }
        Ok(Self {
            catalog,
            window,
            alpha,
        })
    }

    pub fn from_records(
        records: impl IntoIterator<Item = InteractionRecord>,
        window: usize,
        alpha: f64,
    ) -> Result<Self> {
        Self::new(Catalog::from_records(records), window, alpha)
    }

    /// Same data, different window length.
    pub fn with_window(&self, window: usize) -> Result<Self> {
        Self::new(self.catalog.clone(), window, self.alpha)
    }

    #[must_use]
    pub fn catalog_ref(&self) -> &Catalog {
        &self.catalog
    }

    fn enumerate_states(&self) -> Vec<State> {
        let mut states = BTreeSet::new();
        states.insert(State::cold_start(self.window));
        for history in self.catalog.histories.values() {
            for end in 1..=history.len() {
                states.insert(State::from_history(&history[..end], self.window));
            }
        }
        states.into_iter().collect()
    }

    fn continuations(&self) -> HashMap<State, BTreeMap<ItemId, usize>> {
        let mut counts: HashMap<State, BTreeMap<ItemId, usize>> = HashMap::new();
        for history in self.catalog.histories.values() {
            for (end, next) in history.iter().enumerate() {
                let state = State::from_history(&history[..end], self.window);
                *counts.entry(state).or_default().entry(*next).or_insert(0) += 1;
            }
        }
        counts
    }
}

impl ModelInitializer for HistoryInitializer {
    fn window_length(&self) -> usize {
        self.window
    }

    fn proportionality_constant(&self) -> f64 {
        self.alpha
    }

    fn actions(&self) -> Vec<ItemId> {
        let mut items: BTreeSet<ItemId> = self.catalog.titles.keys().copied().collect();
        for history in self.catalog.histories.values() {
            items.extend(history.iter().copied());
        }
        items.into_iter().collect()
    }

    fn initial_state_space(&self) -> InitialStateSpace {
        let states = self.enumerate_states();
        let values = states.iter().map(|state| (state.clone(), 0.0)).collect();
        let policy = match self.actions().first() {
            Some(first) => Policy::uniform(&states, *first),
            None => Policy::default(),
        };
        InitialStateSpace {
            states,
            values,
            policy,
        }
    }

    fn transition_table(&self, states: &[State], actions: &ActionSet) -> TransitionTable {
        let counts = self.continuations();
        let mut table = TransitionTable::new();
        for state in states {
            table.ensure_state(state.clone());
            let Some(observed) = counts.get(state) else {
                continue;
            };
            for action in actions.iter() {
                #[allow(clippy::cast_precision_loss)]
                let weight = |item: ItemId, count: usize| {
                    let count = count as f64;
                    if item == action {
                        count * self.alpha
                    } else {
                        count
                    }
                };
                let total: f64 = observed
                    .iter()
                    .map(|(item, count)| weight(*item, *count))
                    .sum();
                for (item, count) in observed {
                    let reward = if *item == action {
                        ACCEPTED_REWARD
                    } else {
                        IGNORED_REWARD
                    };
                    table.insert(
                        state.clone(),
                        action,
                        state.shift(*item),
                        weight(*item, *count) / total,
                        reward,
                    );
                }
            }
        }
        table
    }

    fn item_titles(&self) -> &HashMap<ItemId, String> {
        &self.catalog.titles
    }

    fn user_histories(&self) -> &BTreeMap<UserId, Vec<ItemId>> {
        &self.catalog.histories
    }
}
