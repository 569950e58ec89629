//! The immutable MDP definition: action set, enumerated state space and
//! transition table, plus the contract of the component that builds them.

use crate::{Catalog, ItemId, ModelError, Policy, Result, State, UserId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Allowed deviation of a populated transition row's probability sum from 1.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Probability and reward of reaching one next-state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub probability: f64,
    pub reward: f64,
}

/// The fixed, finite set of actions shared by all states.
///
/// Kept sorted by ascending item id. This order is the tie-break order for
/// greedy policy improvement and for ranked recommendations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSet {
    items: Vec<ItemId>,
}

impl ActionSet {
    pub fn new(items: impl IntoIterator<Item = ItemId>) -> Result<Self> {
        let mut items: Vec<ItemId> = items.into_iter().collect();
        items.sort_unstable();
        items.dedup();
        if items.is_empty() {
            return Err(ModelError::InvalidModel("action set is empty".into()));
        }
        Ok(Self { items })
    }

    #[must_use]
    pub fn as_slice(&self) -> &[ItemId] {
        &self.items
    }

    pub fn iter(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.items.iter().copied()
    }

    #[must_use]
    pub fn contains(&self, item: ItemId) -> bool {
        self.items.binary_search(&item).is_ok()
    }

    #[must_use]
    pub fn first(&self) -> ItemId {
        // Non-empty by construction.
        self.items[0]
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

type Row = BTreeMap<State, Outcome>;

/// For each (state, action): next-state -> (probability, reward).
///
/// A pair without observed continuation has an empty (or absent) row and
/// contributes nothing to a Bellman backup.
#[derive(Debug, Clone, Default)]
pub struct TransitionTable {
    rows: HashMap<State, HashMap<ItemId, Row>>,
}

impl TransitionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `state` without any transitions.
    pub fn ensure_state(&mut self, state: State) {
        self.rows.entry(state).or_default();
    }

    pub fn insert(
        &mut self,
        state: State,
        action: ItemId,
        next: State,
        probability: f64,
        reward: f64,
    ) {
        self.rows
            .entry(state)
            .or_default()
            .entry(action)
            .or_default()
            .insert(
                next,
                Outcome {
                    probability,
                    reward,
                },
            );
    }

    #[must_use]
    pub fn has_state(&self, state: &State) -> bool {
        self.rows.contains_key(state)
    }

    /// The outcomes of taking `action` in `state`, ordered by next-state.
    pub fn row(&self, state: &State, action: ItemId) -> Option<&BTreeMap<State, Outcome>> {
        self.rows.get(state).and_then(|actions| actions.get(&action))
    }

    /// Every next-state reachable from `state` under any action.
    pub fn next_states<'a>(&'a self, state: &State) -> impl Iterator<Item = &'a State> + 'a {
        self.rows
            .get(state)
            .into_iter()
            .flat_map(|actions| actions.values())
            .flat_map(|row| row.keys())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// What a [`ModelInitializer`] hands over besides the transitions.
#[derive(Debug, Clone, Default)]
pub struct InitialStateSpace {
    pub states: Vec<State>,
    pub values: HashMap<State, f64>,
    pub policy: Policy,
}

/// Builds the discrete model from raw per-user interaction sequences.
pub trait ModelInitializer {
    /// Number of items per state (`k`).
    fn window_length(&self) -> usize;

    /// Weight given to the recommended item when forming transitions (`alpha`).
    fn proportionality_constant(&self) -> f64;

    fn actions(&self) -> Vec<ItemId>;

    fn initial_state_space(&self) -> InitialStateSpace;

    fn transition_table(&self, states: &[State], actions: &ActionSet) -> TransitionTable;

    fn item_titles(&self) -> &HashMap<ItemId, String>;

    fn user_histories(&self) -> &BTreeMap<UserId, Vec<ItemId>>;

    fn catalog(&self) -> Catalog {
        Catalog::new(self.item_titles().clone(), self.user_histories().clone())
    }
}

/// Validated, read-only model data. The solver never mutates it.
#[derive(Debug, Clone)]
pub struct MdpDefinition {
    window: usize,
    actions: ActionSet,
    states: Vec<State>,
    transitions: TransitionTable,
}

impl MdpDefinition {
    /// Checks the data shape and fails on the first violation: state arity,
    /// duplicate states, rows keyed by states outside the space, actions
    /// outside the action set, and probability rows that do not sum to 1.
    pub fn new(
        window: usize,
        actions: ActionSet,
        states: Vec<State>,
        transitions: TransitionTable,
    ) -> Result<Self> {
        if window == 0 {
            return Err(ModelError::InvalidModel("window length must be at least 1".into()));
        }

        let mut seen = HashSet::with_capacity(states.len());
        for state in &states {
            check_arity(state, window)?;
            if !seen.insert(state) {
                return Err(ModelError::InvalidModel(format!("duplicate state {state}")));
            }
            if !transitions.has_state(state) {
                return Err(ModelError::InvalidModel(format!(
                    "no transition entry for state {state}"
                )));
            }
        }

        for (state, rows) in &transitions.rows {
            if !seen.contains(state) {
                return Err(ModelError::InvalidModel(format!(
                    "transitions reference unenumerated state {state}"
                )));
            }
            for (action, row) in rows {
                if !actions.contains(*action) {
                    return Err(ModelError::InvalidModel(format!(
                        "transition for {state} uses unknown action {action}"
                    )));
                }
                check_row(state, *action, row, window)?;
            }
        }

        Ok(Self {
            window,
            actions,
            states,
            transitions,
        })
    }

    /// Pulls actions, states and transitions from `init` and validates them
    /// together with the initial policy.
    pub fn from_initializer<I: ModelInitializer + ?Sized>(
        init: &I,
        verbose: bool,
    ) -> Result<(Self, InitialStateSpace)> {
        crate::progress!(verbose, "Getting set of actions.");
        let actions = ActionSet::new(init.actions())?;
        crate::progress!(verbose, "Set of actions obtained.");

        crate::progress!(verbose, "Getting states, state-values, policy.");
        let space = init.initial_state_space();
        crate::progress!(verbose, "States, state-values, policy obtained.");

        crate::progress!(verbose, "Getting transition table.");
        let transitions = init.transition_table(&space.states, &actions);
        crate::progress!(verbose, "Transition table obtained.");

        let mdp = Self::new(
            init.window_length(),
            actions,
            space.states.clone(),
            transitions,
        )?;
        mdp.validate_policy(&space.policy)?;
        for (state, value) in &space.values {
            check_arity(state, mdp.window)?;
            if !value.is_finite() {
                return Err(ModelError::InvalidModel(format!(
                    "initial value of {state} is not finite"
                )));
            }
        }
        Ok((mdp, space))
    }

    /// A policy is acceptable when its domain is exactly the state space
    /// and every assigned action belongs to the action set.
    pub fn validate_policy(&self, policy: &Policy) -> Result<()> {
        for (state, action) in policy.iter() {
            if !self.transitions.has_state(state) {
                return Err(ModelError::UnknownState(state.clone()));
            }
            if !self.actions.contains(action) {
                return Err(ModelError::InvalidModel(format!(
                    "policy assigns unknown action {action} to {state}"
                )));
            }
        }
        if let Some(missing) = self.states.iter().find(|state| !policy.contains(state)) {
            return Err(ModelError::InvalidModel(format!(
                "policy does not cover state {missing}"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    #[must_use]
    pub fn actions(&self) -> &ActionSet {
        &self.actions
    }

    #[must_use]
    pub fn states(&self) -> &[State] {
        &self.states
    }

    #[must_use]
    pub fn transitions(&self) -> &TransitionTable {
        &self.transitions
    }

    #[must_use]
    pub fn contains(&self, state: &State) -> bool {
        self.transitions.has_state(state)
    }

    /// Row lookup that distinguishes an unenumerated state (error) from a
    /// pair without observed continuation (`None`).
    pub fn row(&self, state: &State, action: ItemId) -> Result<Option<&BTreeMap<State, Outcome>>> {
        if !self.contains(state) {
            return Err(ModelError::UnknownState(state.clone()));
        }
        Ok(self.transitions.row(state, action))
    }
}

fn check_arity(state: &State, window: usize) -> Result<()> {
    if state.len() != window {
        return Err(ModelError::InvalidModel(format!(
            "state {state} has {} items, expected {window}",
            state.len()
        )));
    }
    Ok(())
}

fn check_row(state: &State, action: ItemId, row: &Row, window: usize) -> Result<()> {
    let mut total = 0.0;
    for (next, outcome) in row {
        check_arity(next, window)?;
        if !outcome.probability.is_finite()
            || outcome.probability < 0.0
            || outcome.probability > 1.0 + PROBABILITY_TOLERANCE
        {
            return Err(ModelError::InvalidModel(format!(
                "probability {} for {state} --{action}--> {next} is out of range",
                outcome.probability
            )));
        }
        if !outcome.reward.is_finite() {
            return Err(ModelError::InvalidModel(format!(
                "reward for {state} --{action}--> {next} is not finite"
            )));
        }
        total += outcome.probability;
    }
    if !row.is_empty() && (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(ModelError::InvalidModel(format!(
            "probabilities for {state} under action {action} sum to {total}"
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn s(item: ItemId) -> State {
        State::new(vec![Some(item)])
    }

    fn two_state_table() -> TransitionTable {
        let mut table = TransitionTable::new();
        table.insert(s(0), 0, s(1), 1.0, 10.0);
        table.insert(s(0), 1, s(0), 1.0, 0.0);
        table.insert(s(1), 0, s(0), 1.0, 5.0);
        table.insert(s(1), 1, s(1), 1.0, 0.0);
        table
    }

    #[test]
    fn action_set_is_sorted_and_deduplicated() {
        let actions = ActionSet::new([5, 1, 3, 1]).unwrap();
        assert_eq!(actions.as_slice(), &[1, 3, 5]);
        assert_eq!(actions.first(), 1);
        assert!(actions.contains(3));
        assert!(!actions.contains(2));
        assert!(ActionSet::new([]).is_err());
    }

    #[test]
    fn accepts_well_formed_model() {
        let mdp = MdpDefinition::new(
            1,
            ActionSet::new([0, 1]).unwrap(),
            vec![s(0), s(1)],
            two_state_table(),
        )
        .unwrap();
        assert_eq!(mdp.states().len(), 2);
        assert!(mdp.row(&s(0), 0).unwrap().is_some());
        assert!(matches!(
            mdp.row(&s(9), 0),
            Err(ModelError::UnknownState(_))
        ));
    }

    #[test]
    fn rejects_probabilities_not_summing_to_one() {
        let mut table = two_state_table();
        table.insert(s(0), 0, s(0), 0.5, 0.0);
        let err = MdpDefinition::new(1, ActionSet::new([0, 1]).unwrap(), vec![s(0), s(1)], table)
            .unwrap_err();
        assert!(err.to_string().contains("sum to"));
    }

    #[test]
    fn rejects_state_arity_mismatch() {
        let mut table = two_state_table();
        table.ensure_state(State::new(vec![Some(1), Some(2)]));
        let err = MdpDefinition::new(
            1,
            ActionSet::new([0, 1]).unwrap(),
            vec![s(0), s(1), State::new(vec![Some(1), Some(2)])],
            table,
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected 1"));
    }

    #[test]
    fn rejects_rows_for_unenumerated_states() {
        let mut table = two_state_table();
        table.insert(s(7), 0, s(0), 1.0, 0.0);
        let err = MdpDefinition::new(1, ActionSet::new([0, 1]).unwrap(), vec![s(0), s(1)], table)
            .unwrap_err();
        assert!(err.to_string().contains("unenumerated"));
    }

    #[test]
    fn empty_rows_are_allowed() {
        let mut table = TransitionTable::new();
        table.ensure_state(s(0));
        let mdp =
            MdpDefinition::new(1, ActionSet::new([0]).unwrap(), vec![s(0)], table).unwrap();
        assert!(mdp.row(&s(0), 0).unwrap().is_none());
    }

    #[test]
    fn validate_policy_requires_total_domain() {
        let mdp = MdpDefinition::new(
            1,
            ActionSet::new([0, 1]).unwrap(),
            vec![s(0), s(1)],
            two_state_table(),
        )
        .unwrap();
        let partial: Policy = [(s(0), 0)].into_iter().collect();
        assert!(mdp.validate_policy(&partial).is_err());
        let foreign: Policy = [(s(0), 0), (s(1), 0), (s(5), 0)].into_iter().collect();
        assert!(matches!(
            mdp.validate_policy(&foreign),
            Err(ModelError::UnknownState(_))
        ));
        let bad_action: Policy = [(s(0), 0), (s(1), 4)].into_iter().collect();
        assert!(mdp.validate_policy(&bad_action).is_err());
        assert!(mdp.validate_policy(&Policy::uniform(mdp.states(), 1)).is_ok());
    }
}
