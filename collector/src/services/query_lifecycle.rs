//! Query lifecycle state machine
//!
//! Status only moves forward: submit < start < cancel < finish. A terminal
//! status removes the query right after its side effect has been triggered.

use crate::services::plan_tracer::models::QueryStatus;
use crate::services::query_registry::{QueryInfo, QueryRegistry};
use std::sync::Arc;
use tracing::{debug, info};

/// Effect of one status event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First status seen for this pid
    Created(QueryStatus),
    Advanced { from: QueryStatus, to: QueryStatus },
    /// Status was not newer than the current one; nothing changed
    Ignored { current: QueryStatus },
}

impl Transition {
    /// Status the query entered, if any
    pub fn entered(&self) -> Option<QueryStatus> {
        match self {
            Transition::Created(status) | Transition::Advanced { to: status, .. } => Some(*status),
            Transition::Ignored { .. } => None,
        }
    }

    /// True when this transition deleted the query
    pub fn removed(&self) -> bool {
        self.entered().is_some_and(|status| status.is_terminal())
    }
}

/// Side effects fired exactly once per actual status change
pub trait TransitionHooks: Send + Sync {
    /// The query entered Start
    fn on_start(&self, query: &Arc<QueryInfo>);

    /// The query entered Cancel
    fn on_cancel(&self, pid: i32);
}

/// Hooks that do nothing
pub struct NoopHooks;

impl TransitionHooks for NoopHooks {
    fn on_start(&self, _query: &Arc<QueryInfo>) {}

    fn on_cancel(&self, _pid: i32) {}
}

pub struct QueryLifecycle {
    registry: Arc<QueryRegistry>,
    hooks: Arc<dyn TransitionHooks>,
}

impl QueryLifecycle {
    pub fn new(registry: Arc<QueryRegistry>, hooks: Arc<dyn TransitionHooks>) -> Self {
        Self { registry, hooks }
    }

    pub fn apply(&self, pid: i32, status: QueryStatus) -> Transition {
        self.advance(pid, status).0
    }

    /// Like `apply`, also handing back the query the event was applied to.
    /// After a terminal transition the query is no longer in the registry.
    pub fn advance(&self, pid: i32, status: QueryStatus) -> (Transition, Arc<QueryInfo>) {
        let (query, transition) = self.registry.advance_status(pid, status);

        let Some(entered) = transition.entered() else {
            debug!(pid, status = %status, current = %query.status(), "Stale status event ignored");
            return (transition, query);
        };

        info!(pid, generation = query.generation, status = %entered, "Query status changed");

        match entered {
            QueryStatus::Start => self.hooks.on_start(&query),
            QueryStatus::Cancel => self.hooks.on_cancel(pid),
            QueryStatus::Submit | QueryStatus::Finish => {},
        }

        if entered.is_terminal() && self.registry.remove_generation(pid, query.generation).is_some() {
            debug!(pid, generation = query.generation, "Query removed");
        }

        (transition, query)
    }
}
