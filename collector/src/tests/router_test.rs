use crate::services::message_router::{RouteOutcome, RouterOptions};
use crate::services::plan_tracer::models::QueryStatus;
use crate::services::plan_tracer::tree::{InsertOutcome, UpdateOutcome};
use crate::services::query_lifecycle::Transition;
use crate::services::query_registry::QueryDetails;
use crate::tests::common::{
    HookCall,
    StaticMetadataLookup,
    TestRouter,
    create_test_router,
    create_test_router_with,
    load_trace,
};
use crate::utils::TracerError;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PID: i32 = 96700;

#[tokio::test]
async fn test_scenario_c_duplicate_executor_start_polls_once() {
    let t = create_test_router();

    assert_eq!(
        t.line("96700|submit-query").await,
        RouteOutcome::Lifecycle(Transition::Created(QueryStatus::Submit))
    );
    assert_eq!(
        t.line("96700|executor-start").await,
        RouteOutcome::Lifecycle(Transition::Advanced {
            from: QueryStatus::Submit,
            to: QueryStatus::Start
        })
    );
    assert_eq!(
        t.line("96700|executor-start").await,
        RouteOutcome::Lifecycle(Transition::Ignored { current: QueryStatus::Start })
    );

    assert_eq!(t.hooks.starts_for(PID), 1, "Polling must start exactly once");
    assert_eq!(t.registry.get(PID).unwrap().status(), QueryStatus::Start);
}

#[tokio::test]
async fn test_scenario_e_cancel_removes_query() {
    let t = create_test_router();
    t.line("96700|submit-query").await;
    t.line("96700|executor-start").await;
    t.line("96700|node-declared|plantype:109,plan:0x1aea8b8,leftplan:0x0,rightplan:0x0")
        .await;

    let outcome = t.line("96700|cancel").await;
    assert_eq!(
        outcome,
        RouteOutcome::Lifecycle(Transition::Advanced {
            from: QueryStatus::Start,
            to: QueryStatus::Cancel
        })
    );
    assert!(!t.registry.contains(PID));
    assert!(t.hooks.calls().contains(&HookCall::Cancel { pid: PID }));

    // late metric for the cancelled query is a no-op
    let late = t.line("96700|metric-update|plannode:0x1aea8b8,running:0x1").await;
    assert_eq!(late, RouteOutcome::UnknownQuery);
    assert!(t.registry.is_empty());
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let t = create_test_router();
    t.line("96700|submit-query").await;
    t.line("96700|executor-start").await;

    assert_eq!(
        t.line("96700|submit-query").await,
        RouteOutcome::Lifecycle(Transition::Ignored { current: QueryStatus::Start })
    );
    assert_eq!(t.registry.get(PID).unwrap().status(), QueryStatus::Start);
}

#[tokio::test]
async fn test_query_first_seen_at_start_still_polls() {
    let t = create_test_router();
    assert_eq!(
        t.line("42|executor-start").await,
        RouteOutcome::Lifecycle(Transition::Created(QueryStatus::Start))
    );
    assert_eq!(t.hooks.starts_for(42), 1);
}

#[tokio::test]
async fn test_pid_reused_after_finish_gets_new_generation() {
    let t = create_test_router();
    t.line("7|submit-query").await;
    let first = t.registry.get(7).unwrap().generation;
    t.line("7|executor-finish").await;
    assert!(!t.registry.contains(7));

    assert_eq!(
        t.line("7|submit-query").await,
        RouteOutcome::Lifecycle(Transition::Created(QueryStatus::Submit))
    );
    let second = t.registry.get(7).unwrap();
    assert!(second.generation > first);
    assert!(second.read_plan(|tree| tree.is_empty()));
}

#[tokio::test]
async fn test_generate_node_starts_query_before_inserting() {
    let t = create_test_router();
    t.line("96700|submit-query").await;

    let outcome = t.line("96700|GenerateNode|plantype:109,plan:0x1aea8b8,leftplan:0x0,rightplan:0x0").await;
    assert!(matches!(outcome, RouteOutcome::Node(_)), "unexpected outcome {:?}", outcome);

    let query = t.registry.get(PID).unwrap();
    assert_eq!(query.status(), QueryStatus::Start);
    assert_eq!(query.read_plan(|tree| tree.node_count()), 1);
    assert_eq!(t.hooks.starts_for(PID), 1);

    t.line("96700|GenerateNode|plantype:124,plan:0x1aeb180,leftplan:0x1aea8b8,rightplan:0x0").await;
    assert_eq!(t.hooks.starts_for(PID), 1);
}

#[tokio::test]
async fn test_plan_events_for_unknown_pid_are_ignored() {
    let t = create_test_router();
    assert_eq!(
        t.line("5|node-declared|plantype:109,plan:0x10,leftplan:0x0,rightplan:0x0").await,
        RouteOutcome::UnknownQuery
    );
    assert_eq!(t.line("5|end-of-trace").await, RouteOutcome::UnknownQuery);
    assert!(t.registry.is_empty());
}

async fn wait_for_db_name(t: &TestRouter, pid: i32) -> QueryDetails {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let details = t.registry.get(pid).unwrap().details();
            if !details.db_name.is_empty() {
                return details;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("metadata was never applied")
}

#[tokio::test]
async fn test_submit_resolves_metadata() {
    let lookup = StaticMetadataLookup::with(PID, "shop", "alice", "select * from orders limit 10");
    let t = create_test_router_with(Arc::new(lookup), RouterOptions::default());

    t.line("96700|submit-query").await;

    let details = wait_for_db_name(&t, PID).await;
    assert_eq!(details.db_name, "shop");
    assert_eq!(details.user_name, "alice");
    assert_eq!(details.query_text, "select * from orders limit 10");
    assert_eq!(details.backend_state.as_deref(), Some("active"));
    assert_eq!(details.status, QueryStatus::Submit);
}

#[tokio::test]
async fn test_metadata_lookup_does_not_block_routing() {
    let lookup = StaticMetadataLookup::with(PID, "shop", "alice", "select 1")
        .delayed(Duration::from_millis(300));
    let options = RouterOptions { lookup_timeout: Duration::from_secs(2), ..Default::default() };
    let t = create_test_router_with(Arc::new(lookup), options);

    let started = Instant::now();
    t.line("96700|submit-query").await;
    t.line("96700|executor-start").await;
    assert!(started.elapsed() < Duration::from_millis(300), "routing waited on the lookup");
    assert_eq!(t.registry.get(PID).unwrap().details().db_name, "");

    let details = wait_for_db_name(&t, PID).await;
    assert_eq!(details.db_name, "shop");
    assert_eq!(details.status, QueryStatus::Start);
}

#[tokio::test]
async fn test_slow_metadata_lookup_times_out() {
    let lookup = StaticMetadataLookup::with(PID, "shop", "alice", "select 1")
        .delayed(Duration::from_millis(100));
    let options = RouterOptions { lookup_timeout: Duration::from_millis(20), ..Default::default() };
    let t = create_test_router_with(Arc::new(lookup), options);

    t.line("96700|submit-query").await;
    tokio::time::sleep(Duration::from_millis(250)).await;

    let query = t.registry.get(PID).unwrap();
    assert_eq!(query.details().db_name, "");
    assert_eq!(query.status(), QueryStatus::Submit);
}

#[tokio::test]
async fn test_finish_publishes_final_snapshot() {
    let t = create_test_router();
    let mut observer = t.broadcaster.subscribe();

    t.line("96700|submit-query").await;
    t.line("96700|executor-start").await;
    t.line("96700|node-declared|plantype:109,plan:0x1aea8b8,leftplan:0x0,rightplan:0x0")
        .await;
    t.line("96700|executor-finish").await;

    let message = observer.recv().await.unwrap();
    assert_eq!(message.message_type, "query");
    assert_eq!(message.query.pid, PID);
    assert_eq!(message.query.status, "finish");
    assert_eq!(message.query.status_code, 3);
    assert_eq!(message.query.plan.unwrap().address, "0x1aea8b8");
}

#[tokio::test]
async fn test_terminal_export_can_be_disabled() {
    let options = RouterOptions { export_on_terminal: false, ..Default::default() };
    let t = create_test_router_with(Arc::new(StaticMetadataLookup::default()), options);
    let mut observer = t.broadcaster.subscribe();

    t.line("1|submit-query").await;
    t.line("1|executor-finish").await;

    assert!(observer.try_recv().is_err());
}

#[tokio::test]
async fn test_undecodable_bytes_are_wire_errors() {
    let t = create_test_router();

    let err = t.router.route(&[b'1', b'|', 0xff, 0xfe]).await.unwrap_err();
    assert!(matches!(err, TracerError::WireDecode(_)));
    assert_eq!(err.error_code(), 1001);

    let err = t.router.route(b"garbage line without pid").await.unwrap_err();
    assert!(matches!(err, TracerError::WireDecode(_)));
    assert!(t.registry.is_empty());
}

#[tokio::test]
async fn test_unrecognized_event_is_ignored() {
    let t = create_test_router();
    t.line("3|submit-query").await;
    assert_eq!(t.line("3|checkpoint-start").await, RouteOutcome::Ignored);
    assert_eq!(t.registry.get(3).unwrap().status(), QueryStatus::Submit);
}

#[tokio::test]
async fn test_replay_nested_loop_trace_through_router() {
    let t = create_test_router();
    let mut observer = t.broadcaster.subscribe();

    let outcomes = t.replay(&load_trace("nested_loop.log")).await;

    let deferred = outcomes
        .iter()
        .filter(|o| matches!(o, RouteOutcome::Node(InsertOutcome::Deferred)))
        .count();
    assert_eq!(deferred, 1, "Seq Scan 0x1aeaf00 waits for Materialize");
    assert!(outcomes.contains(&RouteOutcome::Metric(UpdateOutcome::TargetMissing)));
    assert!(outcomes.contains(&RouteOutcome::UnknownQuery));
    assert!(outcomes.contains(&RouteOutcome::Exported { receivers: 1 }));

    // end-of-trace snapshot, then the final one on finish
    let exported = observer.recv().await.unwrap().query;
    assert_eq!(exported.status, "start");
    assert_eq!(exported.node_count, 5);
    assert_eq!(exported.pending_nodes, 0);

    let plan = exported.plan.unwrap();
    assert_eq!(plan.address, "0x1aeb200");
    assert_eq!(plan.type_label, "Limit");
    let join = &plan.children[0];
    assert_eq!(join.type_label, "Nested Loop");
    assert_eq!(join.children.len(), 2);
    assert_eq!(join.children[1].type_label, "Materialize");
    assert_eq!(join.children[1].children[0].address, "0x1aeaf00");

    let last = observer.recv().await.unwrap().query;
    assert_eq!(last.status, "finish");
    assert!(t.registry.is_empty());
    assert_eq!(t.hooks.starts_for(PID), 1);
}
