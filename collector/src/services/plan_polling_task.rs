//! Plan Polling Task
//!
//! While a query is executing, periodically regenerates its sampling script
//! from the current plan tree and hands it to the agent.
//! Uses the ScheduledExecutor framework for periodic execution.

use crate::services::command_dispatcher::{AgentCommand, CommandDispatcher};
use crate::services::plan_tracer::models::QueryStatus;
use crate::services::query_lifecycle::TransitionHooks;
use crate::services::query_registry::{QueryInfo, QueryRegistry};
use crate::services::script_generator::ScriptGenerator;
use crate::utils::scheduled_executor::{ScheduledExecutor, ScheduledTask};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// Plan Polling Task
// ============================================================================

/// Polling loop for one query generation
///
/// Each tick:
/// 1. Stops if the query is gone, was re-created, or left Start
/// 2. Stops when the plan tree is empty or no node can be sampled
/// 3. Dispatches RUN; a failed dispatch stops the loop
pub struct PlanPollingTask {
    pid: i32,
    generation: u64,
    registry: Arc<QueryRegistry>,
    generator: Arc<dyn ScriptGenerator>,
    dispatcher: Arc<dyn CommandDispatcher>,
    /// Shutdown flag
    shutdown: Arc<AtomicBool>,
}

impl PlanPollingTask {
    pub fn new(
        pid: i32,
        generation: u64,
        registry: Arc<QueryRegistry>,
        generator: Arc<dyn ScriptGenerator>,
        dispatcher: Arc<dyn CommandDispatcher>,
    ) -> Self {
        Self {
            pid,
            generation,
            registry,
            generator,
            dispatcher,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Get shutdown handle
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn stop(&self, reason: &str) {
        debug!(pid = self.pid, generation = self.generation, reason, "Stopping plan polling");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    async fn execute(&self) -> Result<(), anyhow::Error> {
        let query = match self.registry.get(self.pid) {
            Some(query) if query.generation == self.generation => query,
            Some(_) => {
                self.stop("query was re-created");
                return Ok(());
            },
            None => {
                self.stop("query removed");
                return Ok(());
            },
        };

        if query.status() != QueryStatus::Start {
            self.stop("query no longer executing");
            return Ok(());
        }

        let instrumentation = query.details().instrumentation;
        let script = query.read_plan(|tree| {
            if tree.is_empty() {
                None
            } else {
                Some(self.generator.generate(self.pid, tree, &instrumentation))
            }
        });

        let script = match script {
            None => {
                self.stop("plan tree is empty");
                return Ok(());
            },
            Some(Err(e)) => {
                self.stop("script generation failed");
                return Err(e.into());
            },
            Some(Ok(None)) => {
                self.stop("no node left to sample");
                return Ok(());
            },
            Some(Ok(Some(script))) => script,
        };

        if let Err(e) = self.dispatcher.dispatch(&AgentCommand::run(self.pid, script)).await {
            self.stop("dispatch failed");
            return Err(e.into());
        }

        debug!(pid = self.pid, "RUN command dispatched");
        Ok(())
    }
}

impl ScheduledTask for PlanPollingTask {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.execute().await })
    }

    fn should_terminate(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// Create and start the polling loop for one query
///
/// The loop ends on its own when the query leaves Start or is removed; the
/// returned handle resolves to the number of ticks that ran.
pub fn start_plan_polling_task(
    task: PlanPollingTask,
    interval: Duration,
) -> (Arc<AtomicBool>, JoinHandle<u64>) {
    let pid = task.pid;
    let shutdown_handle = task.shutdown_handle();
    let executor = ScheduledExecutor::new(format!("plan-polling-{}", pid), interval);

    let handle = tokio::spawn(async move { executor.start(task).await });

    info!(pid, interval_secs = interval.as_secs(), "Plan polling started");

    (shutdown_handle, handle)
}

// ============================================================================
// Transition Hooks
// ============================================================================

/// Lifecycle side effects that talk to the agent: start polling on Start,
/// send STOP on Cancel
pub struct AgentHooks {
    registry: Arc<QueryRegistry>,
    generator: Arc<dyn ScriptGenerator>,
    dispatcher: Arc<dyn CommandDispatcher>,
    interval: Duration,
}

impl AgentHooks {
    pub fn new(
        registry: Arc<QueryRegistry>,
        generator: Arc<dyn ScriptGenerator>,
        dispatcher: Arc<dyn CommandDispatcher>,
        interval: Duration,
    ) -> Self {
        Self { registry, generator, dispatcher, interval }
    }
}

impl TransitionHooks for AgentHooks {
    fn on_start(&self, query: &Arc<QueryInfo>) {
        let task = PlanPollingTask::new(
            query.pid,
            query.generation,
            self.registry.clone(),
            self.generator.clone(),
            self.dispatcher.clone(),
        );
        start_plan_polling_task(task, self.interval);
    }

    fn on_cancel(&self, pid: i32) {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(&AgentCommand::stop(pid)).await {
                warn!(pid, "Failed to send STOP command: {}", e);
            }
        });
    }
}
