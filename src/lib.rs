//! Discount recommendations from a tabular Q-learning agent.
//!
//! Training replays a catalog snapshot as a deterministic environment and
//! learns a value per (catalog position, discount level). Serving answers a
//! product id with the discount of the greedy action at that position.

pub mod agent;
pub mod config;
pub mod data;
pub mod device;
pub mod environment;
pub mod error;
pub mod experience;
pub mod exploration;
pub mod http;
pub mod logging;
pub mod serving;
pub mod state;
pub mod table;
pub mod training;

pub use config::{AgentConfig, Config, ZeroSalesPolicy};
pub use data::{Catalog, ItemAttributes};
pub use error::{PricingError, Result};
pub use serving::{Decision, DecisionService, ServingPolicy};
pub use table::ValueTable;
pub use training::{TrainingLoop, TrainingOutcome, TrainingReport, train_and_save};
