//! Message Router
//!
//! Entry point for every raw probe event: decodes it and dispatches it by pid
//! and kind to the lifecycle, the plan tree or the export path.

use crate::services::metadata_lookup::MetadataLookup;
use crate::services::plan_broadcaster::PlanBroadcaster;
use crate::services::plan_tracer::models::{MetricUpdate, PlanMessage, PlanNode, QueryStatus};
use crate::services::plan_tracer::parser::{Decoded, ParseError, ProbeEvent, ValueParser};
use crate::services::plan_tracer::tree::{InsertOutcome, InstrumentUpdater, UpdateOutcome};
use crate::services::query_lifecycle::{QueryLifecycle, Transition};
use crate::services::query_registry::{QueryInfo, QueryRegistry};
use crate::utils::TracerResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// What routing one event did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Lifecycle(Transition),
    Node(InsertOutcome),
    Metric(UpdateOutcome),
    /// Snapshot published to this many observers
    Exported { receivers: usize },
    /// Plan or export event for a pid that is not being traced
    UnknownQuery,
    /// Event name the collector does not handle
    Ignored,
}

#[derive(Debug, Clone)]
pub struct RouterOptions {
    pub lookup_timeout: Duration,
    /// Publish a final snapshot when a query finishes or is cancelled
    pub export_on_terminal: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self { lookup_timeout: Duration::from_millis(500), export_on_terminal: true }
    }
}

pub struct MessageRouter {
    registry: Arc<QueryRegistry>,
    lifecycle: QueryLifecycle,
    metadata: Arc<dyn MetadataLookup>,
    broadcaster: Arc<PlanBroadcaster>,
    options: RouterOptions,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<QueryRegistry>,
        lifecycle: QueryLifecycle,
        metadata: Arc<dyn MetadataLookup>,
        broadcaster: Arc<PlanBroadcaster>,
        options: RouterOptions,
    ) -> Self {
        Self { registry, lifecycle, metadata, broadcaster, options }
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Route one raw event. Undecodable events come back as
    /// `TracerError::WireDecode`; the caller logs them and moves on.
    pub async fn route(&self, raw: &[u8]) -> TracerResult<RouteOutcome> {
        let event = ProbeEvent::decode_bytes(raw)?;
        Ok(self.route_event(event).await)
    }

    pub async fn route_event(&self, event: ProbeEvent) -> RouteOutcome {
        match event {
            ProbeEvent::Lifecycle { pid, status } => self.handle_status(pid, status),
            ProbeEvent::NodeDeclared { pid, node, starts_query } => {
                if starts_query {
                    self.handle_status(pid, QueryStatus::Start);
                }
                self.handle_node(pid, node)
            },
            ProbeEvent::MetricUpdate { pid, update } => self.handle_metric(pid, update),
            ProbeEvent::EndOfTrace { pid } => self.handle_end_of_trace(pid),
            ProbeEvent::Unrecognized { pid, name } => {
                debug!(pid, event = %name, "Ignoring unrecognized event");
                RouteOutcome::Ignored
            },
        }
    }

    fn handle_status(&self, pid: i32, status: QueryStatus) -> RouteOutcome {
        let (transition, query) = self.lifecycle.advance(pid, status);

        if transition == Transition::Created(QueryStatus::Submit) {
            self.enrich(&query);
        }

        if transition.removed() && self.options.export_on_terminal {
            self.publish(&query);
        }

        RouteOutcome::Lifecycle(transition)
    }

    /// Fill in db/user/statement in the background; failures only cost the
    /// description
    fn enrich(&self, query: &Arc<QueryInfo>) {
        let metadata = self.metadata.clone();
        let query = query.clone();
        let timeout = self.options.lookup_timeout;
        tokio::spawn(async move {
            let pid = query.pid;
            match tokio::time::timeout(timeout, metadata.lookup(pid)).await {
                Ok(Ok(Some(metadata))) => {
                    debug!(pid, db = %metadata.db_name, user = %metadata.user_name, "Query metadata resolved");
                    query.apply_metadata(metadata);
                },
                Ok(Ok(None)) => debug!(pid, "No activity row for pid"),
                Ok(Err(e)) => warn!(pid, "Metadata lookup failed: {}", e),
                Err(_) => warn!(pid, timeout_ms = timeout.as_millis() as u64, "Metadata lookup timed out"),
            }
        });
    }

    fn handle_node(&self, pid: i32, node: Decoded<PlanNode>) -> RouteOutcome {
        log_field_errors(pid, "node-declared", &node.field_errors);
        let Some(query) = self.registry.get(pid) else {
            debug!(pid, "Node declared for untraced pid, ignoring");
            return RouteOutcome::UnknownQuery;
        };

        let address = node.value.plan_address;
        let outcome = query.write_plan(|tree| tree.insert(node.value));
        match outcome {
            InsertOutcome::Rejected => warn!(pid, "Node declared without a plan address"),
            InsertOutcome::Deferred => {
                debug!(pid, address = %ValueParser::format_address(address), "Node parked until its parent arrives")
            },
            _ => debug!(pid, address = %ValueParser::format_address(address), outcome = ?outcome, "Node inserted"),
        }
        RouteOutcome::Node(outcome)
    }

    fn handle_metric(&self, pid: i32, update: Decoded<MetricUpdate>) -> RouteOutcome {
        log_field_errors(pid, "metric-update", &update.field_errors);
        let Some(query) = self.registry.get(pid) else {
            debug!(pid, "Metric update for untraced pid, ignoring");
            return RouteOutcome::UnknownQuery;
        };

        let outcome = query.write_plan(|tree| InstrumentUpdater::apply(tree, &update.value));
        if outcome == UpdateOutcome::TargetMissing {
            debug!(
                pid,
                address = %ValueParser::format_address(update.value.plan_address),
                "Metric update for undeclared node dropped"
            );
        }
        RouteOutcome::Metric(outcome)
    }

    fn handle_end_of_trace(&self, pid: i32) -> RouteOutcome {
        match self.registry.get(pid) {
            Some(query) => RouteOutcome::Exported { receivers: self.publish(&query) },
            None => RouteOutcome::UnknownQuery,
        }
    }

    fn publish(&self, query: &QueryInfo) -> usize {
        let receivers = self.broadcaster.publish(PlanMessage::query(query.snapshot(true)));
        debug!(pid = query.pid, receivers, "Plan snapshot published");
        receivers
    }
}

fn log_field_errors(pid: i32, event: &str, errors: &[ParseError]) {
    for error in errors {
        warn!(pid, event, "Dropped payload field: {}", error);
    }
}
