//! Plan tree construction and enrichment

pub mod instrument_updater;
pub mod plan_tree;
pub mod tree_builder;

pub use instrument_updater::{InstrumentUpdater, UpdateOutcome};
pub use plan_tree::{DEFAULT_MAX_PENDING_NODES, InsertOutcome, PlanTree};
pub use tree_builder::TreeBuilder;
