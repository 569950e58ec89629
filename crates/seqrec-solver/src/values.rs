use seqrec_core::State;
use std::collections::HashMap;

/// State values with default-zero lookup.
///
/// Reading a state that has no entry yields 0 and creates nothing. Entries
/// for next-states are created only at sweep boundaries through
/// [`ValueFunction::materialize`], so a sweep never writes into the map it
/// reads from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueFunction {
    values: HashMap<State, f64>,
}

impl ValueFunction {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, state: &State) -> f64 {
        self.values.get(state).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn contains(&self, state: &State) -> bool {
        self.values.contains_key(state)
    }

    pub fn insert(&mut self, state: State, value: f64) {
        self.values.insert(state, value);
    }

    /// Adds a zero entry for each state not yet present.
    pub fn materialize<'a>(&mut self, states: impl IntoIterator<Item = &'a State>) {
        for state in states {
            if !self.values.contains_key(state) {
                self.values.insert(state.clone(), 0.0);
            }
        }
    }

    /// Largest absolute difference over the union of both domains.
    #[must_use]
    pub fn max_abs_diff(&self, other: &ValueFunction) -> f64 {
        self.values
            .keys()
            .chain(other.values.keys())
            .map(|state| (self.get(state) - other.get(state)).abs())
            .fold(0.0, f64::max)
    }

    /// Largest absolute value, 0 when empty.
    #[must_use]
    pub fn max_abs(&self) -> f64 {
        self.values.values().map(|v| v.abs()).fold(0.0, f64::max)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&State, f64)> {
        self.values.iter().map(|(state, value)| (state, *value))
    }
}

impl From<HashMap<State, f64>> for ValueFunction {
    fn from(values: HashMap<State, f64>) -> Self {
        Self { values }
    }
}

impl FromIterator<(State, f64)> for ValueFunction {
    fn from_iter<T: IntoIterator<Item = (State, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_defaults_to_zero_without_growing() {
        let values = ValueFunction::new();
        let state = State::from_history(&[1], 2);
        assert!(values.get(&state).abs() < f64::EPSILON);
        assert!(values.is_empty());
    }

    #[test]
    fn materialize_keeps_existing_entries() {
        let a = State::from_history(&[1], 1);
        let b = State::from_history(&[2], 1);
        let mut values: ValueFunction = [(a.clone(), 3.0)].into_iter().collect();
        values.materialize([&a, &b]);
        assert_eq!(values.len(), 2);
        assert!((values.get(&a) - 3.0).abs() < f64::EPSILON);
        assert!(values.contains(&b));
    }

    #[test]
    fn max_abs_diff_covers_both_domains() {
        let a = State::from_history(&[1], 1);
        let b = State::from_history(&[2], 1);
        let left: ValueFunction = [(a.clone(), 1.0)].into_iter().collect();
        let right: ValueFunction = [(a, 1.5), (b, -4.0)].into_iter().collect();
        assert!((left.max_abs_diff(&right) - 4.0).abs() < f64::EPSILON);
    }

    #[test]
    fn max_abs_ignores_sign() {
        let a = State::from_history(&[1], 1);
        let b = State::from_history(&[2], 1);
        let values: ValueFunction = [(a, 2.0), (b, -7.5)].into_iter().collect();
        assert!((values.max_abs() - 7.5).abs() < f64::EPSILON);
        assert!(ValueFunction::new().max_abs().abs() < f64::EPSILON);
    }
}
