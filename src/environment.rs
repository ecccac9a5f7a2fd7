use crate::{
    data::{Catalog, ItemAttributes},
    error::{PricingError, Result},
    state::{self, ActionIndex, StateIndex},
};

/// Shelf life, in days, at which an item carries no expiry penalty.
const EXPIRY_HORIZON_DAYS: f64 = 30.0;
const SALES_WEIGHT: f64 = 10.0;
const EXPIRY_WEIGHT: f64 = 5.0;

/// Outcome of applying a discount to one catalog item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub reward: f64,
    pub next_state: StateIndex,
    pub new_sales: f64,
    /// Stock left after the simulated day. Reported only; the reward ignores it.
    pub stock_left: f64,
}

/// Simulates the effect of discount `action` on `item`, which sits at
/// `state` in a catalog of `states` items.
///
/// `item.daily_sales` must be non-zero; the catalog loader guarantees it.
pub fn simulate(
    item: &ItemAttributes,
    state: StateIndex,
    states: usize,
    action: ActionIndex,
    discount_levels: &[f64],
) -> Result<Transition> {
    let discount = *discount_levels
        .get(action)
        .ok_or(PricingError::IndexOutOfRange {
            state,
            action,
            states,
            actions: discount_levels.len(),
        })?;

    let new_sales = item.daily_sales * (1.0 + discount / 100.0);
    let stock_left = item.stock_available - new_sales;
    let expiry_factor = 1.0 - item.days_to_expiry / EXPIRY_HORIZON_DAYS;
    let reward = (new_sales / item.daily_sales) * SALES_WEIGHT - expiry_factor * EXPIRY_WEIGHT;

    Ok(Transition {
        reward,
        next_state: state::next_state(state, states),
        new_sales,
        stock_left,
    })
}

/// The catalog replayed as a deterministic environment.
pub struct Environment<'a> {
    catalog: &'a Catalog,
    discount_levels: &'a [f64],
}

impl<'a> Environment<'a> {
    pub fn new(catalog: &'a Catalog, discount_levels: &'a [f64]) -> Self {
        Self {
            catalog,
            discount_levels,
        }
    }

    pub fn states(&self) -> usize {
        self.catalog.len()
    }

    pub fn step(&self, state: StateIndex, action: ActionIndex) -> Result<Transition> {
        let item = self
            .catalog
            .get(state)
            .ok_or(PricingError::IndexOutOfRange {
                state,
                action,
                states: self.catalog.len(),
                actions: self.discount_levels.len(),
            })?;
        simulate(item, state, self.catalog.len(), action, self.discount_levels)
    }
}
