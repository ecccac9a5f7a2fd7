use std::{
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};

use serde::Serialize;

use crate::{
    config::{AgentConfig, Config},
    data::Catalog,
    error::{PricingError, Result},
    state::StateIndex,
    table::ValueTable,
};

/// Greedy, read-only policy over a frozen value table.
#[derive(Debug, Clone)]
pub struct ServingPolicy {
    table: ValueTable,
    discount_levels: Vec<f64>,
}

impl ServingPolicy {
    pub fn new(table: ValueTable, config: &AgentConfig) -> Result<Self> {
        config.validate()?;
        if table.actions() != config.actions() {
            return Err(PricingError::ShapeMismatch {
                expected: (table.states(), config.actions()),
                found: table.shape(),
            });
        }
        Ok(Self {
            table,
            discount_levels: config.discount_levels.clone(),
        })
    }

    pub fn table(&self) -> &ValueTable {
        &self.table
    }

    /// Discount percentage of the best known action for `state`.
    pub fn decide(&self, state: StateIndex) -> Result<f64> {
        let action = self.table.best_action(state)?;
        Ok(self.discount_levels[action])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub product_id: String,
    pub state: StateIndex,
    pub discount: f64,
}

struct Model {
    catalog: Catalog,
    policy: ServingPolicy,
}

/// Resolves product ids against the catalog snapshot and answers with the
/// serving policy. The model is replaced wholesale on reload; lookups in
/// flight keep the model they started with.
pub struct DecisionService {
    model: RwLock<Arc<Model>>,
    agent: AgentConfig,
}

impl DecisionService {
    pub fn new(catalog: Catalog, policy: ServingPolicy, agent: AgentConfig) -> Result<Self> {
        if policy.table().states() != catalog.len() {
            return Err(PricingError::ShapeMismatch {
                expected: (catalog.len(), agent.actions()),
                found: policy.table().shape(),
            });
        }
        Ok(Self {
            model: RwLock::new(Arc::new(Model { catalog, policy })),
            agent,
        })
    }

    /// Loads the catalog snapshot and the persisted table named by `config`.
    /// Any mismatch between the two is fatal.
    pub fn open(config: &Config) -> Result<Self> {
        let catalog = Catalog::from_csv(&config.paths.catalog, config.data.zero_sales)?;
        let table = ValueTable::load_expected(
            &config.paths.model,
            catalog.len(),
            &config.agent.discount_levels,
        )?;
        tracing::info!(
            model = %config.paths.model.display(),
            states = table.states(),
            actions = table.actions(),
            "loaded value table for serving"
        );
        let policy = ServingPolicy::new(table, &config.agent)?;
        Self::new(catalog, policy, config.agent.clone())
    }

    fn current(&self) -> Arc<Model> {
        self.model
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn decide(&self, product_id: &str) -> Result<Decision> {
        let model = self.current();
        let state = model
            .catalog
            .state_of(product_id)
            .ok_or_else(|| PricingError::UnknownItem(product_id.to_string()))?;
        let discount = model.policy.decide(state)?;
        tracing::debug!(product_id, state, discount, "discount decision");
        Ok(Decision {
            product_id: product_id.to_string(),
            state,
            discount,
        })
    }

    /// Swaps in the table stored at `path`. The table must match the current
    /// catalog and discount levels; on any error the old model stays live.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let catalog = self.current().catalog.clone();
        let table = ValueTable::load_expected(path, catalog.len(), &self.agent.discount_levels)?;
        let policy = ServingPolicy::new(table, &self.agent)?;
        let next = Arc::new(Model { catalog, policy });

        *self.model.write().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::info!(path = %path.display(), "reloaded value table");
        Ok(())
    }
}
