use rand::Rng;

use crate::{
    config::AgentConfig,
    error::Result,
    experience::Experience,
    exploration::{self, Choice},
    state::StateIndex,
    table::ValueTable,
};

/// Tabular one-step Q-learning agent.
pub struct QLearningAgent {
    table: ValueTable,
    alpha: f64,
    gamma: f64,
    epsilon: f64,
}

impl QLearningAgent {
    pub fn new(states: usize, config: &AgentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            table: ValueTable::new(states, config.actions())?,
            alpha: config.alpha,
            gamma: config.gamma,
            epsilon: config.epsilon,
        })
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    pub fn into_table(self) -> ValueTable {
        self.table
    }

    pub fn choose<R: Rng>(&self, state: StateIndex, rng: &mut R) -> Result<Choice> {
        exploration::choose(&self.table, state, self.epsilon, rng)
    }

    /// Off-policy Bellman update:
    /// `Q(s,a) += alpha * (r + gamma * max_a' Q(s',a') - Q(s,a))`.
    ///
    /// Returns the temporal-difference error before scaling by alpha.
    pub fn update(&mut self, experience: &Experience) -> Result<f64> {
        let Experience {
            state,
            action,
            reward,
            next_state,
        } = *experience;
        let current = self.table.get(state, action)?;
        let best_next = self.table.max_value(next_state)?;
        let td_error = reward + self.gamma * best_next - current;
        self.table
            .set(state, action, current + self.alpha * td_error)?;
        Ok(td_error)
    }
}
