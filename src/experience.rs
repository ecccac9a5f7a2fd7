use crate::state::{ActionIndex, StateIndex};

/// One simulated step, consumed by a single Bellman update and then dropped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Experience {
    pub state: StateIndex,
    pub action: ActionIndex,
    pub reward: f64,
    pub next_state: StateIndex,
}
