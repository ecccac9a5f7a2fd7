use rand::Rng;

use crate::{
    error::Result,
    state::{ActionIndex, StateIndex},
    table::ValueTable,
};

/// An action picked by the epsilon-greedy rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    pub action: ActionIndex,
    /// True when the action was drawn at random rather than read off the table.
    pub explored: bool,
}

/// Epsilon-greedy selection over one row of `table`.
///
/// With probability `epsilon` a uniformly random action is returned,
/// otherwise the table's greedy action for `state`.
pub fn choose<R: Rng>(
    table: &ValueTable,
    state: StateIndex,
    epsilon: f64,
    rng: &mut R,
) -> Result<Choice> {
    if rng.random::<f64>() < epsilon {
        // Still reject a bad state on the explore branch.
        table.row(state)?;
        return Ok(Choice {
            action: rng.random_range(0..table.actions()),
            explored: true,
        });
    }
    Ok(Choice {
        action: table.best_action(state)?,
        explored: false,
    })
}

pub fn choose_action<R: Rng>(
    table: &ValueTable,
    state: StateIndex,
    epsilon: f64,
    rng: &mut R,
) -> Result<ActionIndex> {
    choose(table, state, epsilon, rng).map(|choice| choice.action)
}
