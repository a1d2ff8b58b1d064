//! Live query-plan tracer
//!
//! Rebuilds a traced query's execution-plan tree from the unordered stream of
//! probe events emitted by the tracing agents, and enriches it in place as
//! runtime instrumentation samples arrive.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      MessageRouter                          │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                 ProbeEvent::decode()                 │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │                           │                                 │
//! │           ┌───────────────┼───────────────┐                │
//! │           ▼               ▼               ▼                │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐        │
//! │  │   Parser    │  │    Tree     │  │   Models    │        │
//! │  │  ┌───────┐  │  │  ┌───────┐  │  │             │        │
//! │  │  │ Event │  │  │  │ Plan  │  │  │  PlanNode   │        │
//! │  │  │Parser │  │  │  │ Tree  │  │  │  Metrics    │        │
//! │  │  └───────┘  │  │  └───────┘  │  │  Snapshot   │        │
//! │  │  ┌───────┐  │  │  ┌───────┐  │  │  ...        │        │
//! │  │  │ Value │  │  │  │Instr. │  │  │             │        │
//! │  │  │Parser │  │  │  │Updater│  │  │             │        │
//! │  │  └───────┘  │  │  └───────┘  │  │             │        │
//! │  └─────────────┘  └─────────────┘  └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use plantap_collector::services::plan_tracer::replay_trace;
//!
//! let trace = std::fs::read_to_string("trace.log")?;
//! let replay = replay_trace(&trace, 96700);
//! println!("nodes: {}", replay.tree.node_count());
//! ```

pub mod models;
pub mod node_types;
pub mod parser;
pub mod tree;


pub use models::*;
pub use parser::{ParseError, ProbeEvent};
pub use tree::{InsertOutcome, InstrumentUpdater, PlanTree, TreeBuilder, UpdateOutcome};

/// Result of replaying a captured trace offline
#[derive(Debug, Default)]
pub struct TraceReplay {
    pub tree: PlanTree,
    /// Line and field errors, in input order
    pub errors: Vec<ParseError>,
    /// Metric samples whose target node was never declared
    pub missed_updates: usize,
}

/// Rebuild the plan tree of `pid` from a captured event log.
///
/// Only node and metric events are applied; lifecycle events are skipped and
/// lines for other pids are ignored. Undecodable lines are collected, not fatal.
pub fn replay_trace(trace: &str, pid: i32) -> TraceReplay {
    let mut replay = TraceReplay::default();

    for line in trace.lines().filter(|l| !l.trim().is_empty()) {
        let event = match ProbeEvent::decode(line) {
            Ok(event) if event.pid() == pid => event,
            Ok(_) => continue,
            Err(e) => {
                replay.errors.push(e);
                continue;
            },
        };

        match event {
            ProbeEvent::NodeDeclared { node, .. } => {
                replay.errors.extend(node.field_errors);
                replay.tree.insert(node.value);
            },
            ProbeEvent::MetricUpdate { update, .. } => {
                replay.errors.extend(update.field_errors);
                if InstrumentUpdater::apply(&mut replay.tree, &update.value)
                    == UpdateOutcome::TargetMissing
                {
                    replay.missed_updates += 1;
                }
            },
            _ => {},
        }
    }

    replay
}
