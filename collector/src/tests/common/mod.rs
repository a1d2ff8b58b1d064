// Common test utilities and helpers

use crate::services::command_dispatcher::{AgentCommand, CommandDispatcher};
use crate::services::metadata_lookup::{MetadataLookup, QueryMetadata};
use crate::services::message_router::{MessageRouter, RouteOutcome, RouterOptions};
use crate::services::plan_broadcaster::PlanBroadcaster;
use crate::services::query_lifecycle::{QueryLifecycle, TransitionHooks};
use crate::services::query_registry::{QueryDefaults, QueryInfo, QueryRegistry};
use crate::utils::{TracerError, TracerResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Load a raw event log from `tests/fixtures/traces`
pub fn load_trace(filename: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/fixtures/traces");
    path.push(filename);
    fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", path.display(), e))
}

/// Hook calls observed by `RecordingHooks`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookCall {
    Start { pid: i32, generation: u64 },
    Cancel { pid: i32 },
}

#[derive(Default)]
pub struct RecordingHooks {
    calls: Mutex<Vec<HookCall>>,
}

impl RecordingHooks {
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn starts_for(&self, pid: i32) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, HookCall::Start { pid: p, .. } if *p == pid))
            .count()
    }
}

impl TransitionHooks for RecordingHooks {
    fn on_start(&self, query: &Arc<QueryInfo>) {
        self.calls
            .lock()
            .unwrap()
            .push(HookCall::Start { pid: query.pid, generation: query.generation });
    }

    fn on_cancel(&self, pid: i32) {
        self.calls.lock().unwrap().push(HookCall::Cancel { pid });
    }
}

/// Records every command; fails every dispatch while `failing` is set
#[derive(Default)]
pub struct RecordingDispatcher {
    commands: Mutex<Vec<AgentCommand>>,
    failing: AtomicBool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        let dispatcher = Self::default();
        dispatcher.failing.store(true, Ordering::SeqCst);
        dispatcher
    }

    pub fn commands(&self) -> Vec<AgentCommand> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandDispatcher for RecordingDispatcher {
    async fn dispatch(&self, command: &AgentCommand) -> TracerResult<()> {
        self.commands.lock().unwrap().push(command.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(TracerError::transport("agent unreachable"));
        }
        Ok(())
    }
}

/// Answers lookups from a fixed table, optionally after a delay
#[derive(Default)]
pub struct StaticMetadataLookup {
    entries: HashMap<i32, QueryMetadata>,
    delay: Option<Duration>,
}

impl StaticMetadataLookup {
    pub fn with(pid: i32, db_name: &str, user_name: &str, query_text: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            pid,
            QueryMetadata {
                db_name: db_name.to_string(),
                user_name: user_name.to_string(),
                query_text: query_text.to_string(),
                backend_state: Some("active".to_string()),
            },
        );
        Self { entries, delay: None }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl MetadataLookup for StaticMetadataLookup {
    async fn lookup(&self, pid: i32) -> TracerResult<Option<QueryMetadata>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.entries.get(&pid).cloned())
    }
}

/// A router wired to recording collaborators
pub struct TestRouter {
    pub router: MessageRouter,
    pub registry: Arc<QueryRegistry>,
    pub broadcaster: Arc<PlanBroadcaster>,
    pub hooks: Arc<RecordingHooks>,
}

impl TestRouter {
    /// Route one line that must decode
    pub async fn line(&self, line: &str) -> RouteOutcome {
        self.router
            .route(line.as_bytes())
            .await
            .unwrap_or_else(|e| panic!("failed to route {:?}: {}", line, e))
    }

    /// Route every line of a trace, skipping undecodable ones
    pub async fn replay(&self, trace: &str) -> Vec<RouteOutcome> {
        let mut outcomes = Vec::new();
        for line in trace.lines() {
            if let Ok(outcome) = self.router.route(line.as_bytes()).await {
                outcomes.push(outcome);
            }
        }
        outcomes
    }
}

pub fn create_test_router() -> TestRouter {
    create_test_router_with(Arc::new(StaticMetadataLookup::default()), RouterOptions::default())
}

pub fn create_test_router_with(metadata: Arc<dyn MetadataLookup>, options: RouterOptions) -> TestRouter {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let broadcaster = Arc::new(PlanBroadcaster::new(16));
    let hooks = Arc::new(RecordingHooks::default());
    let lifecycle = QueryLifecycle::new(registry.clone(), hooks.clone());
    let router =
        MessageRouter::new(registry.clone(), lifecycle, metadata, broadcaster.clone(), options);
    TestRouter { router, registry, broadcaster, hooks }
}
