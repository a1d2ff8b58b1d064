use crate::services::command_dispatcher::{CommandDispatcher, CommandName};
use crate::services::message_router::{MessageRouter, RouterOptions};
use crate::services::plan_broadcaster::PlanBroadcaster;
use crate::services::plan_polling_task::{AgentHooks, PlanPollingTask, start_plan_polling_task};
use crate::services::plan_tracer::models::{PlanNode, QueryStatus};
use crate::services::query_lifecycle::{QueryLifecycle, TransitionHooks};
use crate::services::query_registry::{QueryDefaults, QueryInfo, QueryRegistry};
use crate::services::script_generator::{ScriptGenerator, StapScriptGenerator};
use crate::tests::common::{RecordingDispatcher, StaticMetadataLookup};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

const PID: i32 = 96700;
const TICK: Duration = Duration::from_millis(20);

fn generator() -> Arc<dyn ScriptGenerator> {
    Arc::new(StapScriptGenerator::builtin("postgres").unwrap())
}

fn executing_query(registry: &QueryRegistry, instrumented: bool) -> Arc<QueryInfo> {
    let (query, _) = registry.advance_status(PID, QueryStatus::Start);
    let mut join = PlanNode::new(124, 0x1aeb180).with_children(0x1aea8b8, 0);
    if instrumented {
        join.metrics.instrument_address = 0x1aec000;
    }
    query.write_plan(|tree| tree.insert(join));
    query
}

fn start_task(
    registry: &Arc<QueryRegistry>,
    query: &QueryInfo,
    dispatcher: &Arc<RecordingDispatcher>,
) -> JoinHandle<u64> {
    let task = PlanPollingTask::new(
        query.pid,
        query.generation,
        registry.clone(),
        generator(),
        dispatcher.clone(),
    );
    start_plan_polling_task(task, TICK).1
}

async fn finished(handle: JoinHandle<u64>) -> u64 {
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("polling loop did not stop")
        .unwrap()
}

#[tokio::test]
async fn test_running_query_gets_run_commands() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let query = executing_query(&registry, true);

    let handle = start_task(&registry, &query, &dispatcher);
    tokio::time::sleep(TICK * 5).await;
    registry.remove(PID);
    finished(handle).await;

    let commands = dispatcher.commands();
    assert!(!commands.is_empty(), "expected RUN commands");
    for command in &commands {
        assert_eq!(command.command_name, CommandName::Run);
        assert_eq!(command.pid, PID);
        assert!(command.script.contains("nodes[0x1aec000] = 0x1aeb180"));
    }
}

#[tokio::test]
async fn test_removed_query_stops_polling() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let query = executing_query(&registry, true);

    let handle = start_task(&registry, &query, &dispatcher);
    registry.remove(PID);

    assert_eq!(finished(handle).await, 1);
    assert!(dispatcher.commands().is_empty());
}

#[tokio::test]
async fn test_recreated_query_stops_old_loop() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let stale = executing_query(&registry, true);

    registry.remove(PID);
    registry.advance_status(PID, QueryStatus::Start);

    let handle = start_task(&registry, &stale, &dispatcher);
    assert_eq!(finished(handle).await, 1);
    assert!(dispatcher.commands().is_empty());
}

#[tokio::test]
async fn test_dispatch_failure_stops_polling() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::failing());
    let query = executing_query(&registry, true);

    let handle = start_task(&registry, &query, &dispatcher);

    assert_eq!(finished(handle).await, 1);
    assert_eq!(dispatcher.commands().len(), 1);
    assert!(registry.contains(PID), "Dispatch failure must not drop the query");
}

#[tokio::test]
async fn test_empty_tree_stops_polling() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let (query, _) = registry.advance_status(PID, QueryStatus::Start);

    let handle = start_task(&registry, &query, &dispatcher);

    assert_eq!(finished(handle).await, 1);
    assert!(dispatcher.commands().is_empty());
    assert!(registry.contains(PID));
}

#[tokio::test]
async fn test_start_after_finish_does_not_poll_forever() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let starts = Arc::new(CapturingHooks::new(registry.clone(), dispatcher.clone()));
    let lifecycle = QueryLifecycle::new(registry.clone(), starts.clone());
    let router = MessageRouter::new(
        registry.clone(),
        lifecycle,
        Arc::new(StaticMetadataLookup::default()),
        Arc::new(PlanBroadcaster::new(4)),
        RouterOptions::default(),
    );

    for line in ["7|submit-query", "7|executor-finish", "7|executor-start"] {
        router.route(line.as_bytes()).await.unwrap();
    }
    assert_eq!(registry.get(7).unwrap().status(), QueryStatus::Start);

    let handle = starts.take().expect("executor-start did not start polling");
    assert_eq!(finished(handle).await, 1);
    assert!(dispatcher.commands().is_empty());
}

#[tokio::test]
async fn test_nothing_to_sample_stops_polling() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let query = executing_query(&registry, false);

    let handle = start_task(&registry, &query, &dispatcher);

    assert_eq!(finished(handle).await, 1);
    assert!(dispatcher.commands().is_empty());
}

#[tokio::test]
async fn test_cancel_hook_sends_stop() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let hooks = AgentHooks::new(registry, generator(), dispatcher.clone(), TICK);

    hooks.on_cancel(PID);

    tokio::time::timeout(Duration::from_secs(2), async {
        while dispatcher.commands().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("STOP was not dispatched");

    let commands = dispatcher.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].command_name, CommandName::Stop);
    assert_eq!(commands[0].pid, PID);
    assert!(commands[0].script.is_empty());
}

#[tokio::test]
async fn test_lifecycle_start_drives_agent() {
    let registry = Arc::new(QueryRegistry::new(QueryDefaults::default()));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let as_dispatcher: Arc<dyn CommandDispatcher> = dispatcher.clone();
    let hooks = Arc::new(AgentHooks::new(registry.clone(), generator(), as_dispatcher, TICK));
    let lifecycle = QueryLifecycle::new(registry.clone(), hooks);

    lifecycle.apply(PID, QueryStatus::Submit);
    lifecycle.apply(PID, QueryStatus::Start);
    let mut scan = PlanNode::new(109, 0x1aea8b8);
    scan.metrics.instrument_address = 0x1aec100;
    registry.get(PID).unwrap().write_plan(|tree| tree.insert(scan));

    tokio::time::sleep(TICK * 4).await;
    lifecycle.apply(PID, QueryStatus::Cancel);
    tokio::time::sleep(TICK * 3).await;

    let commands = dispatcher.commands();
    assert!(commands.iter().any(|c| c.command_name == CommandName::Run));
    assert!(commands.iter().any(|c| c.command_name == CommandName::Stop));
    assert!(!registry.contains(PID));
}

/// Starts polling like `AgentHooks` but keeps the loop handle for the test
struct CapturingHooks {
    registry: Arc<QueryRegistry>,
    dispatcher: Arc<RecordingDispatcher>,
    handle: Mutex<Option<JoinHandle<u64>>>,
}

impl CapturingHooks {
    fn new(registry: Arc<QueryRegistry>, dispatcher: Arc<RecordingDispatcher>) -> Self {
        Self { registry, dispatcher, handle: Mutex::new(None) }
    }

    fn take(&self) -> Option<JoinHandle<u64>> {
        self.handle.lock().unwrap().take()
    }
}

impl TransitionHooks for CapturingHooks {
    fn on_start(&self, query: &Arc<QueryInfo>) {
        let handle = start_task(&self.registry, query, &self.dispatcher);
        *self.handle.lock().unwrap() = Some(handle);
    }

    fn on_cancel(&self, _pid: i32) {}
}
