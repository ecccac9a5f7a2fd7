/// Position of an item in the catalog snapshot used for training.
///
/// This is not a feature of the item: the learned table only means something
/// for the exact snapshot order it was trained on.
pub type StateIndex = usize;

/// Index into the ordered list of discount levels.
pub type ActionIndex = usize;

/// The simulated environment always advances one catalog position; the last
/// item transitions to itself.
pub fn next_state(state: StateIndex, states: usize) -> StateIndex {
    (state + 1).min(states.saturating_sub(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_and_clamps_at_the_last_item() {
        assert_eq!(next_state(0, 3), 1);
        assert_eq!(next_state(1, 3), 2);
        assert_eq!(next_state(2, 3), 2);
        assert_eq!(next_state(0, 1), 0);
    }
}
