//! Query Registry
//!
//! Owns the tracking state of every traced query, keyed by backend pid.

use crate::services::metadata_lookup::QueryMetadata;
use crate::services::plan_tracer::models::{InstrumentationConfig, QuerySnapshot, QueryStatus};
use crate::services::plan_tracer::tree::{DEFAULT_MAX_PENDING_NODES, PlanTree};
use crate::services::query_lifecycle::Transition;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Descriptive state of a query, guarded separately from its plan tree
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDetails {
    pub query_text: String,
    pub db_name: String,
    pub user_name: String,
    pub status: QueryStatus,
    /// Activity state reported by the database itself
    pub backend_state: Option<String>,
    pub instrumentation: InstrumentationConfig,
}

/// One traced query
#[derive(Debug)]
pub struct QueryInfo {
    pub pid: i32,
    /// Tells a re-created query apart from an earlier one with the same pid
    pub generation: u64,
    pub created_at: DateTime<Utc>,
    details: RwLock<QueryDetails>,
    plan: RwLock<PlanTree>,
}

impl QueryInfo {
    fn new(pid: i32, generation: u64, status: QueryStatus, defaults: &QueryDefaults) -> Self {
        Self {
            pid,
            generation,
            created_at: Utc::now(),
            details: RwLock::new(QueryDetails {
                query_text: String::new(),
                db_name: String::new(),
                user_name: String::new(),
                status,
                backend_state: None,
                instrumentation: defaults.instrumentation.clone(),
            }),
            plan: RwLock::new(PlanTree::new(defaults.max_pending_nodes)),
        }
    }

    pub fn status(&self) -> QueryStatus {
        self.details.read().unwrap_or_else(PoisonError::into_inner).status
    }

    pub fn details(&self) -> QueryDetails {
        self.details.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn update_details<R>(&self, f: impl FnOnce(&mut QueryDetails) -> R) -> R {
        f(&mut *self.details.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn apply_metadata(&self, metadata: QueryMetadata) {
        self.update_details(|details| {
            details.db_name = metadata.db_name;
            details.user_name = metadata.user_name;
            details.query_text = metadata.query_text;
            details.backend_state = metadata.backend_state;
        });
    }

    /// Run `f` under the plan reader lock
    pub fn read_plan<R>(&self, f: impl FnOnce(&PlanTree) -> R) -> R {
        f(&*self.plan.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Run `f` under the plan writer lock
    pub fn write_plan<R>(&self, f: impl FnOnce(&mut PlanTree) -> R) -> R {
        f(&mut *self.plan.write().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn snapshot(&self, include_plan: bool) -> QuerySnapshot {
        let details = self.details();
        let (plan, node_count, pending_nodes) = self.read_plan(|tree| {
            let plan = if include_plan { tree.to_snapshot() } else { None };
            (plan, tree.node_count(), tree.pending_len())
        });

        QuerySnapshot {
            pid: self.pid,
            generation: self.generation,
            query_text: details.query_text,
            db_name: details.db_name,
            user_name: details.user_name,
            status: details.status.label().to_string(),
            status_code: details.status.code(),
            backend_state: details.backend_state,
            instrumentation: details.instrumentation,
            created_at: self.created_at,
            node_count,
            pending_nodes,
            plan,
        }
    }
}

/// Settings every new query starts with
#[derive(Debug, Clone)]
pub struct QueryDefaults {
    pub instrumentation: InstrumentationConfig,
    pub max_pending_nodes: usize,
}

impl Default for QueryDefaults {
    fn default() -> Self {
        Self {
            instrumentation: InstrumentationConfig::default(),
            max_pending_nodes: DEFAULT_MAX_PENDING_NODES,
        }
    }
}

/// Process-wide map of pid to traced query
#[derive(Debug, Default)]
pub struct QueryRegistry {
    queries: DashMap<i32, Arc<QueryInfo>>,
    next_generation: AtomicU64,
    defaults: QueryDefaults,
}

impl QueryRegistry {
    pub fn new(defaults: QueryDefaults) -> Self {
        Self { queries: DashMap::new(), next_generation: AtomicU64::new(0), defaults }
    }

    pub fn get(&self, pid: i32) -> Option<Arc<QueryInfo>> {
        self.queries.get(&pid).map(|entry| Arc::clone(entry.value()))
    }

    /// Returns the query and whether it was created by this call
    pub fn get_or_create(&self, pid: i32, status: QueryStatus) -> (Arc<QueryInfo>, bool) {
        match self.queries.entry(pid) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                let info = Arc::new(self.new_query(pid, status));
                entry.insert(Arc::clone(&info));
                (info, true)
            },
        }
    }

    /// Create the query at `status`, or advance it when `status` is strictly
    /// newer. The map entry stays locked for the whole check-and-set.
    pub fn advance_status(&self, pid: i32, status: QueryStatus) -> (Arc<QueryInfo>, Transition) {
        match self.queries.entry(pid) {
            Entry::Vacant(entry) => {
                let info = Arc::new(self.new_query(pid, status));
                entry.insert(Arc::clone(&info));
                (info, Transition::Created(status))
            },
            Entry::Occupied(entry) => {
                let info = Arc::clone(entry.get());
                let transition = info.update_details(|details| {
                    let current = details.status;
                    if status > current {
                        details.status = status;
                        Transition::Advanced { from: current, to: status }
                    } else {
                        Transition::Ignored { current }
                    }
                });
                (info, transition)
            },
        }
    }

    pub fn remove(&self, pid: i32) -> Option<Arc<QueryInfo>> {
        self.queries.remove(&pid).map(|(_, info)| info)
    }

    /// Remove the entry only while it still holds `generation`
    pub fn remove_generation(&self, pid: i32, generation: u64) -> Option<Arc<QueryInfo>> {
        self.queries.remove_if(&pid, |_, info| info.generation == generation).map(|(_, info)| info)
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.queries.contains_key(&pid)
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Snapshots of all queries, ordered by pid
    pub fn snapshots(&self, include_plans: bool) -> Vec<QuerySnapshot> {
        let queries: Vec<Arc<QueryInfo>> =
            self.queries.iter().map(|entry| Arc::clone(entry.value())).collect();
        let mut snapshots: Vec<QuerySnapshot> =
            queries.iter().map(|q| q.snapshot(include_plans)).collect();
        snapshots.sort_by_key(|s| s.pid);
        snapshots
    }

    fn new_query(&self, pid: i32, status: QueryStatus) -> QueryInfo {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        QueryInfo::new(pid, generation, status, &self.defaults)
    }
}
