//! One cook pass for one target.
//!
//! Steps:
//! 1. Collect the dirty closure of the target (dependencies first).
//!    A static cycle flags the offending connections and ends the job.
//! 2. Cook worklist entries whose dependencies are no longer pending.
//!    A node failure stays local; nodes downstream of it fail as upstream.
//! 3. Report the target's collection, or why there is none.

use std::sync::Arc;

use log::{debug, info};

use super::context::CookSession;
use super::events::{CookEvent, CookEventBus};
use super::scheduler::CancelToken;
use crate::error::CookError;
use crate::geometry::ElementCollection;
use crate::graph::keys::{Q_DELTA, Q_TIME};
use crate::graph::{CacheStats, Node, NodePath, QueryMap, QueryValue, dirty};
use crate::host::HostServices;

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed,
    Canceled,
    /// Static cycle; connections along it are flagged
    Circular(Vec<NodePath>),
    /// Target did not cook
    Failed(CookError),
}

impl JobOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

#[derive(Debug, Clone)]
pub struct CookReport {
    pub target: NodePath,
    pub time: f64,
    pub outcome: JobOutcome,
    /// Target output, present when completed
    pub collection: Option<Arc<ElementCollection>>,
    /// Nodes cooked during the job, in order
    pub cooked: Vec<NodePath>,
    /// Nodes that failed during the job
    pub failed: Vec<NodePath>,
    /// Node cache lookups made by the job
    pub cache: CacheStats,
}

pub struct CookJob<'r> {
    root: &'r Node,
    target: NodePath,
    host: &'r HostServices,
    base: QueryMap,
    cancel: CancelToken,
    events: Option<CookEventBus>,
}

impl<'r> CookJob<'r> {
    pub fn new(root: &'r Node, target: NodePath, host: &'r HostServices) -> Self {
        let mut base = QueryMap::new();
        base.insert(Q_TIME.to_string(), QueryValue::Float(0.0));
        base.insert(Q_DELTA.to_string(), QueryValue::Float(0.0));
        Self {
            root,
            target,
            host,
            base,
            cancel: CancelToken::new(),
            events: None,
        }
    }

    pub fn at_time(mut self, time: f64, delta: f64) -> Self {
        self.base.insert(Q_TIME.to_string(), QueryValue::Float(time));
        self.base.insert(Q_DELTA.to_string(), QueryValue::Float(delta));
        self
    }

    /// Extra base query entry (visible to every node through `query_value`).
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.base.insert(name.into(), value.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: CookEventBus) -> Self {
        self.events = Some(events);
        self
    }

    fn time(&self) -> f64 {
        self.base
            .get(Q_TIME)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    pub fn run(self) -> CookReport {
        let time = self.time();
        let session = CookSession::new(self.root, self.host, self.base.clone(), self.cancel.clone())
            .with_events(self.events.clone());

        let (outcome, collection) = self.drive(&session);
        let report = CookReport {
            target: self.target.clone(),
            time,
            outcome,
            collection,
            cooked: session.cooked(),
            failed: session.failed(),
            cache: session.cache_stats(),
        };

        debug!(
            "Cook {} @ {}: {:?}, {} cooked, {} failed, cache {}/{}",
            report.target,
            report.time,
            report.outcome,
            report.cooked.len(),
            report.failed.len(),
            report.cache.hits,
            report.cache.total()
        );
        if let Some(events) = &self.events {
            events.emit(CookEvent::JobFinished {
                target: report.target.clone(),
                outcome: report.outcome.clone(),
                cooked: report.cooked.len(),
            });
        }
        report
    }

    fn drive(&self, session: &CookSession<'_>) -> (JobOutcome, Option<Arc<ElementCollection>>) {
        let mut worklist = match dirty::find_dirty_dependencies_deep(self.root, &self.target) {
            Ok(list) => list,
            Err(CookError::Circular { cycle }) => {
                let marked = dirty::mark_circular(self.root, &cycle);
                info!("Cook of {} stopped by a cycle ({} connections flagged)", self.target, marked);
                return (JobOutcome::Circular(cycle), None);
            }
            Err(e) => return (JobOutcome::Failed(e), None),
        };
        if !worklist.contains(&self.target) {
            worklist.push(self.target.clone());
        }

        while !worklist.is_empty() {
            let Some(pos) = worklist.iter().position(|p| self.is_ready(p, &worklist)) else {
                return (JobOutcome::Failed(CookError::Deadlock(worklist.len())), None);
            };
            let path = worklist.remove(pos);
            match session.cook(&path) {
                Ok(_) => {}
                Err(CookError::Canceled) => return (JobOutcome::Canceled, None),
                Err(e) if e.is_fatal() => return (JobOutcome::Failed(e), None),
                // Recorded on the node; dependants report it as upstream
                Err(_) => {}
            }
        }

        match session.cook(&self.target) {
            Ok(resolved) => (JobOutcome::Completed, Some(resolved.collection)),
            Err(CookError::Canceled) => (JobOutcome::Canceled, None),
            Err(e) => {
                let cause = session.failure(&self.target).unwrap_or(e);
                (JobOutcome::Failed(cause), None)
            }
        }
    }

    /// No connected dependency is still waiting in the worklist.
    fn is_ready(&self, path: &NodePath, worklist: &[NodePath]) -> bool {
        dirty::dependencies_of(self.root, path)
            .iter()
            .filter_map(|d| d.node.as_ref())
            .all(|dep| !worklist.contains(dep))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, YieldMode};
    use crate::graph::keys::{P_AMOUNT, P_ATTRIBUTE, P_KIND};
    use crate::graph::{CookStatus, NodeId, Params};
    use crate::nodes::{Grid, Merge, Null, Offset, SetAttribute};

    fn host() -> HostServices {
        HostServices::new(EngineConfig {
            yield_mode: YieldMode::None,
            ..EngineConfig::default()
        })
    }

    fn add(root: &mut Node, node: Node) -> NodeId {
        root.system_mut().unwrap().add_node(node).unwrap()
    }

    /// /grid -> /off(500) -> /out
    fn chain() -> Node {
        let mut root = Node::root();
        let g = add(&mut root, Node::new("grid", Grid::new()));
        let o = add(
            &mut root,
            Node::new("off", Offset::new()).with_params(Params::new().with(P_AMOUNT, 500.0)),
        );
        let n = add(&mut root, Node::new("out", Null::new()));
        let sys = root.system_mut().unwrap();
        sys.connect(g, 0, o, 0).unwrap();
        sys.connect(o, 0, n, 0).unwrap();
        root
    }

    fn node<'a>(root: &'a Node, path: &str) -> &'a Node {
        root.find(&NodePath::parse(path)).unwrap()
    }

    #[test]
    fn test_chain_cooks_in_dependency_order() {
        let root = chain();
        let host = host();
        let report = CookJob::new(&root, NodePath::parse("/out"), &host).run();

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(
            report.cooked,
            vec![NodePath::parse("/grid"), NodePath::parse("/off"), NodePath::parse("/out")]
        );
        let out = report.collection.unwrap();
        assert_eq!(out.len(), 16);
        assert_eq!(out.time_span(), Some((500.0, 1000.0)));
        assert_eq!(node(&root, "/out").status(), CookStatus::Cooked);
    }

    #[test]
    fn test_second_cook_reuses_cache() {
        let root = chain();
        let host = host();
        CookJob::new(&root, NodePath::parse("/out"), &host).run();
        let again = CookJob::new(&root, NodePath::parse("/out"), &host).run();

        assert!(again.outcome.is_completed());
        assert!(again.cooked.is_empty());
        assert_eq!(node(&root, "/grid").cook_count(), 1);
        assert_eq!(again.cache, CacheStats { hits: 1, misses: 0 });

        dirty::mark_dirty(&root, &NodePath::parse("/off"), dirty::DirtyReason::Params);
        let third = CookJob::new(&root, NodePath::parse("/out"), &host).run();
        assert_eq!(third.cooked, vec![NodePath::parse("/off"), NodePath::parse("/out")]);
        // /off reads /grid from its cache
        assert_eq!(third.cache.hits, 1);
        assert_eq!(node(&root, "/grid").cook_count(), 1);
    }

    #[test]
    fn test_cycle_flags_connections() {
        let mut root = Node::root();
        let a = add(&mut root, Node::new("a", Null::new()));
        let b = add(&mut root, Node::new("b", Null::new()));
        let sys = root.system_mut().unwrap();
        sys.connect(a, 0, b, 0).unwrap();
        sys.connect(b, 0, a, 0).unwrap();

        let host = host();
        let report = CookJob::new(&root, NodePath::parse("/a"), &host).run();
        assert!(matches!(report.outcome, JobOutcome::Circular(_)));
        assert!(report.cooked.is_empty());
        let sys = root.system().unwrap();
        assert!(sys.connections().iter().all(|c| c.is_circular()));
    }

    #[test]
    fn test_cycle_flags_only_its_own_edges() {
        // /grid -> /a <-> /b -> /c
        let mut root = Node::root();
        let g = add(&mut root, Node::new("grid", Grid::new()));
        let a = add(&mut root, Node::new("a", Merge::new()));
        let b = add(&mut root, Node::new("b", Null::new()));
        let c = add(&mut root, Node::new("c", Null::new()));
        let sys = root.system_mut().unwrap();
        sys.connect(g, 0, a, 0).unwrap();
        sys.connect(a, 0, b, 0).unwrap();
        sys.connect(b, 0, a, 0).unwrap();
        sys.connect(b, 0, c, 0).unwrap();

        let host = host();
        let report = CookJob::new(&root, NodePath::parse("/c"), &host).run();
        assert!(matches!(report.outcome, JobOutcome::Circular(_)));
        let flags: Vec<bool> = root
            .system()
            .unwrap()
            .connections()
            .iter()
            .map(|c| c.is_circular())
            .collect();
        assert_eq!(flags, vec![false, true, true, false]);
        assert_eq!(node(&root, "/grid").status(), CookStatus::Dirty);
    }

    #[test]
    fn test_failure_stays_local_and_propagates_upstream() {
        let mut root = Node::root();
        let g = add(&mut root, Node::new("grid", Grid::new()));
        let bad = add(
            &mut root,
            Node::new("bad", SetAttribute::new())
                .with_params(Params::new().with(P_ATTRIBUTE, "tint").with(P_KIND, "colour")),
        );
        let n = add(&mut root, Node::new("out", Null::new()));
        let sys = root.system_mut().unwrap();
        sys.connect(g, 0, bad, 0).unwrap();
        sys.connect(bad, 0, n, 0).unwrap();

        let host = host();
        let report = CookJob::new(&root, NodePath::parse("/out"), &host).run();

        assert_eq!(
            report.outcome,
            JobOutcome::Failed(CookError::Upstream { path: NodePath::parse("/bad") })
        );
        assert_eq!(node(&root, "/grid").status(), CookStatus::Cooked);
        assert_eq!(node(&root, "/bad").status(), CookStatus::Error);
        assert_eq!(node(&root, "/bad").errors().len(), 1);
        assert_eq!(node(&root, "/out").status(), CookStatus::Error);
        assert_eq!(node(&root, "/out").upstream_errors(), vec![NodePath::parse("/bad")]);
    }

    #[test]
    fn test_canceled_job_leaves_nodes_dirty() {
        let root = chain();
        let host = host();
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = CookJob::new(&root, NodePath::parse("/out"), &host)
            .with_cancel(cancel)
            .run();

        assert_eq!(report.outcome, JobOutcome::Canceled);
        assert!(report.collection.is_none());
        assert_eq!(node(&root, "/grid").status(), CookStatus::Dirty);
    }

    #[test]
    fn test_missing_target() {
        let root = chain();
        let host = host();
        let report = CookJob::new(&root, NodePath::parse("/nope"), &host).run();
        assert_eq!(
            report.outcome,
            JobOutcome::Failed(CookError::MissingNode(NodePath::parse("/nope")))
        );
    }

    #[test]
    fn test_events_report_job() {
        let root = chain();
        let host = host();
        let bus = CookEventBus::new();
        let rx = bus.subscribe();
        CookJob::new(&root, NodePath::parse("/out"), &host)
            .with_events(bus)
            .run();

        let events: Vec<CookEvent> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            CookEvent::StatusChanged { status: CookStatus::Cooking, .. }
        )));
        assert!(matches!(
            events.last(),
            Some(CookEvent::JobFinished { outcome: JobOutcome::Completed, cooked: 3, .. })
        ));
    }
}
