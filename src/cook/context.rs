//! Cook session and per-node cook context.
//!
//! A [`CookSession`] lives for one job. It owns the per-job memo (evaluation
//! key → result), so a diamond-shaped graph cooks its shared ancestors once,
//! and it knows how to cook a single node ([`CookSession::resolve`]).
//!
//! A [`CookContext`] is what an operator sees while cooking: parameters,
//! fetch functions for other nodes, query values (`time`, `delta`), asset
//! lookups and the provide/inject side channel. Everything the operator
//! touches is recorded so the result can be cached with the right key and
//! invalidated by the right events.
//!
//! Cache reuse rules:
//! - memo hit: same key within this job
//! - node cache hit: node is `Cooked`, entry exists for the key, and every
//!   base query value the entry read is unchanged
//! - results that read injected parent values stay in the memo only
//!
//! Evaluation key: `path#slot?k=v&...`, overrides in insertion order.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::Arc;

use log::{trace, warn};

use super::events::{CookEvent, CookEventBus};
use super::scheduler::CancelToken;
use crate::config::EngineConfig;
use crate::error::{CookError, CookResult};
use crate::geometry::ElementCollection;
use crate::graph::keys::{Q_DELTA, Q_TIME};
use crate::graph::{
    CacheStats, CachedResult, CookStatus, Cookable, DependencyKinds, Node, NodePath, Params, PortLayout,
    QueryMap, QueryValue, dirty, evaluation_key,
};
use crate::host::{Beatmap, HostServices};

/// Value passed from a node to its descendants through `provide`/`inject`.
#[derive(Debug, Clone)]
pub enum ContextValue {
    Float(f64),
    Int(i64),
    Str(String),
    Collection(Arc<ElementCollection>),
}

/// Result of resolving one evaluation key.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub collection: Arc<ElementCollection>,
    pub kinds: DependencyKinds,
    /// Base query values read while producing this result
    pub base_reads: QueryMap,
    /// Provide keys read from ancestors
    pub injected: BTreeSet<String>,
}

impl From<CachedResult> for Resolved {
    fn from(hit: CachedResult) -> Self {
        Self {
            collection: hit.collection,
            kinds: hit.kinds,
            base_reads: hit.base_reads,
            injected: BTreeSet::new(),
        }
    }
}

/// What one cook observed.
#[derive(Debug, Default)]
struct Observed {
    kinds: DependencyKinds,
    base_reads: QueryMap,
    injected: BTreeSet<String>,
    upstream_errors: Vec<NodePath>,
}

impl Observed {
    fn final_kinds(&self) -> DependencyKinds {
        if self.injected.is_empty() {
            self.kinds - DependencyKinds::PARENT_VALUE
        } else {
            self.kinds | DependencyKinds::PARENT_VALUE
        }
    }
}

struct MemoEntry {
    result: Result<Resolved, CookError>,
    provide_epoch: u64,
}

/// Provide/inject scope. Each cook gets a child of its caller's scope.
#[derive(Default)]
struct ProvideScope {
    values: RefCell<HashMap<String, ContextValue>>,
    parent: Option<Rc<ProvideScope>>,
}

impl ProvideScope {
    fn child(parent: &Rc<ProvideScope>) -> Rc<ProvideScope> {
        Rc::new(ProvideScope {
            values: RefCell::new(HashMap::new()),
            parent: Some(Rc::clone(parent)),
        })
    }

    fn lookup(&self, key: &str) -> Option<ContextValue> {
        if let Some(v) = self.values.borrow().get(key) {
            return Some(v.clone());
        }
        self.parent.as_ref().and_then(|p| p.lookup(key))
    }

    fn provides(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }
}

/// State shared by every node cooked within one job.
pub struct CookSession<'r> {
    root: &'r Node,
    host: &'r HostServices,
    base: QueryMap,
    cancel: CancelToken,
    events: Option<CookEventBus>,
    memo: RefCell<HashMap<String, MemoEntry>>,
    provide_epoch: Cell<u64>,
    cooked: RefCell<Vec<NodePath>>,
    failed: RefCell<Vec<NodePath>>,
    cache_stats: Cell<CacheStats>,
}

impl<'r> CookSession<'r> {
    pub fn new(root: &'r Node, host: &'r HostServices, base: QueryMap, cancel: CancelToken) -> Self {
        Self {
            root,
            host,
            base,
            cancel,
            events: None,
            memo: RefCell::new(HashMap::new()),
            provide_epoch: Cell::new(0),
            cooked: RefCell::new(Vec::new()),
            failed: RefCell::new(Vec::new()),
            cache_stats: Cell::new(CacheStats::default()),
        }
    }

    pub fn with_events(mut self, events: Option<CookEventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn root(&self) -> &'r Node {
        self.root
    }

    pub fn base(&self) -> &QueryMap {
        &self.base
    }

    pub fn is_canceled(&self) -> bool {
        self.cancel.is_canceled()
    }

    /// Nodes cooked so far, in cook order (repeats for override evaluations).
    pub fn cooked(&self) -> Vec<NodePath> {
        self.cooked.borrow().clone()
    }

    pub fn failed(&self) -> Vec<NodePath> {
        self.failed.borrow().clone()
    }

    /// Node cache lookups made by this job.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache_stats.get()
    }

    /// The node's own error, when its base evaluation failed in this job.
    pub fn failure(&self, path: &NodePath) -> Option<CookError> {
        let key = evaluation_key(path, 0, &QueryMap::new());
        match &self.memo.borrow().get(&key)?.result {
            Err(e) => Some(e.clone()),
            Ok(_) => None,
        }
    }

    /// Resolve the base evaluation of `path` from outside any node.
    pub fn cook(&self, path: &NodePath) -> CookResult<Resolved> {
        let scope = Rc::new(ProvideScope::default());
        self.resolve(path, 0, &QueryMap::new(), &[], &scope)
    }

    /// Resolve one evaluation: memo, then node cache, then cook.
    ///
    /// A failure of the node itself comes back as `Upstream { path }`; the
    /// original error stays in the memo and the node state.
    fn resolve(
        &self,
        path: &NodePath,
        output_slot: usize,
        overrides: &QueryMap,
        chain: &[NodePath],
        scope: &Rc<ProvideScope>,
    ) -> CookResult<Resolved> {
        if self.is_canceled() {
            return Err(CookError::Canceled);
        }
        let key = evaluation_key(path, output_slot, overrides);

        if let Some(hit) = self.memo_lookup(&key) {
            return hit.map_err(|_| CookError::Upstream { path: path.clone() });
        }
        if chain.contains(path) {
            return Err(CookError::Reentrant(path.clone()));
        }
        let node = self
            .root
            .find(path)
            .ok_or_else(|| CookError::MissingNode(path.clone()))?;
        if output_slot >= PortLayout::OUTPUTS {
            return Err(CookError::node(format!("{} has no output slot {}", path, output_slot)));
        }

        {
            let mut state = node.state();
            if state.status == CookStatus::Cooked {
                let hit = state.cache.get(&key, &self.base);
                let mut stats = self.cache_stats.get();
                stats.record(hit.is_some());
                self.cache_stats.set(stats);
                if let Some(hit) = hit {
                    trace!("cache hit {}", key);
                    let resolved = Resolved::from(hit);
                    drop(state);
                    self.memo_insert(key, Ok(resolved.clone()));
                    return Ok(resolved);
                }
            }
        }

        match self.cook_node(node, path, &key, overrides, chain, scope) {
            Ok(resolved) => {
                self.memo_insert(key, Ok(resolved.clone()));
                Ok(resolved)
            }
            Err(CookError::Canceled) => Err(CookError::Canceled),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                self.memo_insert(key, Err(e));
                Err(CookError::Upstream { path: path.clone() })
            }
        }
    }

    fn cook_node(
        &self,
        node: &Node,
        path: &NodePath,
        key: &str,
        overrides: &QueryMap,
        chain: &[NodePath],
        scope: &Rc<ProvideScope>,
    ) -> CookResult<Resolved> {
        if self.is_canceled() {
            return Err(CookError::Canceled);
        }
        self.set_status(node, path, CookStatus::Cooking);
        dirty::clear_circular(self.root, path);
        self.host.yielder.yield_frame();
        if self.is_canceled() {
            self.set_status(node, path, CookStatus::Dirty);
            return Err(CookError::Canceled);
        }

        let mut chain = chain.to_vec();
        chain.push(path.clone());
        let ctx = CookContext {
            session: self,
            node,
            path: path.clone(),
            overrides: overrides.clone(),
            chain,
            scope: ProvideScope::child(scope),
            observed: RefCell::new(Observed::default()),
        };

        trace!("cook {}", key);
        let result = match node.kind().cook(&ctx) {
            Ok(_) if self.is_canceled() => Err(CookError::Canceled),
            other => other,
        };
        let observed = ctx.observed.into_inner();

        let mut state = node.state();
        state.cook_count += 1;
        match result {
            Ok(collection) => {
                let kinds = observed.final_kinds();
                let resolved = Resolved {
                    collection: Arc::new(collection),
                    kinds,
                    base_reads: observed.base_reads,
                    injected: observed.injected,
                };
                state.cache.insert(
                    key.to_string(),
                    CachedResult {
                        collection: Arc::clone(&resolved.collection),
                        kinds,
                        base_reads: resolved.base_reads.clone(),
                    },
                );
                state.status = CookStatus::Cooked;
                state.kinds = kinds;
                state.errors.clear();
                state.upstream_errors = observed.upstream_errors;
                drop(state);

                self.cooked.borrow_mut().push(path.clone());
                self.emit_status(path, CookStatus::Cooked);
                Ok(resolved)
            }
            Err(CookError::Canceled) => {
                state.status = CookStatus::Dirty;
                drop(state);
                self.emit_status(path, CookStatus::Dirty);
                Err(CookError::Canceled)
            }
            Err(e) => {
                warn!("{} failed: {}", path, e);
                state.status = CookStatus::Error;
                state.errors = vec![e.to_string()];
                state.upstream_errors = observed.upstream_errors;
                drop(state);

                self.failed.borrow_mut().push(path.clone());
                self.emit_status(path, CookStatus::Error);
                Err(e)
            }
        }
    }

    fn set_status(&self, node: &Node, path: &NodePath, status: CookStatus) {
        node.state().status = status;
        self.emit_status(path, status);
    }

    fn emit_status(&self, path: &NodePath, status: CookStatus) {
        if let Some(events) = &self.events {
            events.emit(CookEvent::StatusChanged {
                path: path.clone(),
                status,
            });
        }
    }

    fn memo_lookup(&self, key: &str) -> Option<Result<Resolved, CookError>> {
        let memo = self.memo.borrow();
        let entry = memo.get(key)?;
        if let Ok(resolved) = &entry.result {
            // Injected values may have changed since
            if !resolved.injected.is_empty() && entry.provide_epoch != self.provide_epoch.get() {
                return None;
            }
        }
        Some(entry.result.clone())
    }

    fn memo_insert(&self, key: String, result: Result<Resolved, CookError>) {
        self.memo.borrow_mut().insert(
            key,
            MemoEntry {
                result,
                provide_epoch: self.provide_epoch.get(),
            },
        );
    }
}

/// Everything an operator may touch while cooking.
pub struct CookContext<'s> {
    session: &'s CookSession<'s>,
    node: &'s Node,
    path: NodePath,
    overrides: QueryMap,
    chain: Vec<NodePath>,
    scope: Rc<ProvideScope>,
    observed: RefCell<Observed>,
}

impl<'s> CookContext<'s> {
    pub fn node(&self) -> &Node {
        self.node
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn params(&self) -> &Params {
        self.node.params()
    }

    pub fn host(&self) -> &HostServices {
        self.session.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.session.host.config
    }

    /// Query overrides in effect for this evaluation.
    pub fn overrides(&self) -> &QueryMap {
        &self.overrides
    }

    // --- Fetching ---

    /// Fetch another node's output by relative (`b`, `../c`) or absolute path.
    pub fn fetch(&self, reference: &str, output_slot: usize) -> CookResult<ElementCollection> {
        self.fetch_with(reference, output_slot, &QueryMap::new())
    }

    /// Fetch with extra query overrides layered over the current ones.
    pub fn fetch_with(
        &self,
        reference: &str,
        output_slot: usize,
        overrides: &QueryMap,
    ) -> CookResult<ElementCollection> {
        let path = self
            .path
            .resolve(reference)
            .ok_or_else(|| CookError::MissingNode(NodePath::parse(reference)))?;
        self.fetch_path(&path, output_slot, overrides)
    }

    pub fn fetch_path(
        &self,
        path: &NodePath,
        output_slot: usize,
        overrides: &QueryMap,
    ) -> CookResult<ElementCollection> {
        let shared = self.fetch_shared(path, output_slot, overrides)?;
        Ok(ElementCollection::clone(&shared))
    }

    /// Collection connected to `slot`, empty when unconnected.
    pub fn fetch_input(&self, slot: usize) -> CookResult<ElementCollection> {
        self.fetch_input_with(slot, &QueryMap::new())
    }

    pub fn fetch_input_with(&self, slot: usize, overrides: &QueryMap) -> CookResult<ElementCollection> {
        self.fetch_first(dirty::input_sources(self.session.root, &self.path, slot), overrides)
    }

    /// Every collection connected to a multiple-connection `slot`, in connection order.
    pub fn fetch_inputs(&self, slot: usize) -> CookResult<Vec<ElementCollection>> {
        dirty::input_sources(self.session.root, &self.path, slot)
            .iter()
            .map(|(source, from_slot)| self.fetch_path(source, *from_slot, &QueryMap::new()))
            .collect()
    }

    /// Collection connected to the containing node's input `slot`.
    pub fn fetch_parent_input(&self, slot: usize) -> CookResult<ElementCollection> {
        self.fetch_parent_input_with(slot, &QueryMap::new())
    }

    pub fn fetch_parent_input_with(
        &self,
        slot: usize,
        overrides: &QueryMap,
    ) -> CookResult<ElementCollection> {
        let Some(container) = self.path.parent() else {
            return Ok(ElementCollection::new());
        };
        self.fetch_first(dirty::input_sources(self.session.root, &container, slot), overrides)
    }

    /// Output of this container's designated output child, empty if none.
    pub fn fetch_output_child(&self, overrides: &QueryMap) -> CookResult<ElementCollection> {
        let Some(output) = self.node.system().and_then(|s| s.output_name()) else {
            return Ok(ElementCollection::new());
        };
        self.fetch_path(&self.path.child(output), 0, overrides)
    }

    fn fetch_first(
        &self,
        sources: Vec<(NodePath, usize)>,
        overrides: &QueryMap,
    ) -> CookResult<ElementCollection> {
        match sources.into_iter().next() {
            Some((source, from_slot)) => self.fetch_path(&source, from_slot, overrides),
            None => Ok(ElementCollection::new()),
        }
    }

    fn fetch_shared(
        &self,
        path: &NodePath,
        output_slot: usize,
        extra: &QueryMap,
    ) -> CookResult<Arc<ElementCollection>> {
        self.checkpoint()?;
        let mut overrides = self.overrides.clone();
        for (name, value) in extra {
            overrides.insert(name.clone(), value.clone());
        }

        match self
            .session
            .resolve(path, output_slot, &overrides, &self.chain, &self.scope)
        {
            Ok(resolved) => {
                self.absorb(&resolved);
                Ok(resolved.collection)
            }
            Err(CookError::Upstream { path }) => {
                self.observed.borrow_mut().upstream_errors.push(path.clone());
                Err(CookError::Upstream { path })
            }
            Err(e) => Err(e),
        }
    }

    /// Fold a dependency's observations into ours.
    fn absorb(&self, resolved: &Resolved) {
        let mut observed = self.observed.borrow_mut();
        observed.kinds |= resolved.kinds - DependencyKinds::PARENT_VALUE;
        for (name, value) in &resolved.base_reads {
            observed
                .base_reads
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
        for key in &resolved.injected {
            // Values we provided ourselves are accounted to us
            if !self.scope.provides(key) {
                observed.injected.insert(key.clone());
            }
        }
    }

    // --- Query values ---

    /// Current value of a query entry: override first, then the job's base query.
    pub fn query_value(&self, name: &str) -> Option<QueryValue> {
        if name == Q_TIME || name == Q_DELTA {
            self.record(DependencyKinds::TIME);
        }
        if let Some(v) = self.overrides.get(name) {
            return Some(v.clone());
        }
        let value = self.session.base.get(name)?.clone();
        self.observed
            .borrow_mut()
            .base_reads
            .entry(name.to_string())
            .or_insert_with(|| value.clone());
        Some(value)
    }

    /// Time cursor in ms.
    pub fn time(&self) -> f64 {
        self.query_value(Q_TIME)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    /// Time since the previously cooked cursor position, ms.
    pub fn delta(&self) -> f64 {
        self.query_value(Q_DELTA)
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    // --- Provide / inject ---

    /// Make `value` visible to every node fetched from this cook afterwards.
    pub fn provide(&self, key: &str, value: ContextValue) {
        self.scope.values.borrow_mut().insert(key.to_string(), value);
        let epoch = &self.session.provide_epoch;
        epoch.set(epoch.get() + 1);
    }

    /// Value provided by the nearest ancestor evaluation.
    pub fn inject(&self, key: &str) -> Option<ContextValue> {
        self.observed.borrow_mut().injected.insert(key.to_string());
        self.record(DependencyKinds::PARENT_VALUE);
        self.scope.parent.as_ref().and_then(|p| p.lookup(key))
    }

    // --- Assets ---

    pub fn texture_id(&self, name: &str) -> i32 {
        self.record(DependencyKinds::TEXTURE);
        self.session.host.assets.texture_id(name)
    }

    pub fn beatmap(&self) -> Option<Beatmap> {
        self.record(DependencyKinds::BEATMAP);
        self.session.host.assets.beatmap()
    }

    // --- Misc ---

    /// Cooperative cancellation point.
    pub fn checkpoint(&self) -> CookResult<()> {
        if self.session.is_canceled() {
            Err(CookError::Canceled)
        } else {
            Ok(())
        }
    }

    pub fn record(&self, kinds: DependencyKinds) {
        self.observed.borrow_mut().kinds |= kinds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::keys::{K_PREVIOUS_FRAME, P_AMOUNT, P_OFFSET};
    use crate::graph::{NodeId, Params, query};
    use crate::nodes::{Grid, Merge, Null, Offset, PreviousFrame, TimeShift};

    fn host() -> HostServices {
        HostServices::new(EngineConfig {
            yield_mode: crate::config::YieldMode::None,
            ..EngineConfig::default()
        })
    }

    fn add(root: &mut Node, node: Node) -> NodeId {
        root.system_mut().unwrap().add_node(node).unwrap()
    }

    fn connect(root: &mut Node, from: NodeId, to: NodeId, slot: usize) {
        root.system_mut().unwrap().connect(from, 0, to, slot).unwrap();
    }

    fn count(root: &Node, path: &str) -> u64 {
        root.find(&NodePath::parse(path)).unwrap().cook_count()
    }

    #[test]
    fn test_diamond_cooks_shared_ancestor_once() {
        // grid -> a, grid -> b, (a, b) -> merge
        let mut root = Node::root();
        let g = add(&mut root, Node::new("grid", Grid::new()));
        let a = add(&mut root, Node::new("a", Null::new()));
        let b = add(&mut root, Node::new("b", Null::new()));
        let m = add(&mut root, Node::new("merge", Merge::new()));
        connect(&mut root, g, a, 0);
        connect(&mut root, g, b, 0);
        connect(&mut root, a, m, 0);
        connect(&mut root, b, m, 0);

        let host = host();
        let session = CookSession::new(&root, &host, QueryMap::new(), CancelToken::new());
        let merged = session.cook(&NodePath::parse("/merge")).unwrap();

        assert_eq!(merged.collection.len(), 32);
        assert_eq!(count(&root, "/grid"), 1);
        assert_eq!(count(&root, "/merge"), 1);
    }

    #[test]
    fn test_fetch_returns_independent_copies() {
        let mut root = Node::root();
        let g = add(&mut root, Node::new("grid", Grid::new()));
        let o = add(
            &mut root,
            Node::new("off", Offset::new()).with_params(Params::new().with(P_AMOUNT, 100.0)),
        );
        connect(&mut root, g, o, 0);

        let host = host();
        let session = CookSession::new(&root, &host, QueryMap::new(), CancelToken::new());
        let grid = session.cook(&NodePath::parse("/grid")).unwrap();
        let shifted = session.cook(&NodePath::parse("/off")).unwrap();

        assert!(!Arc::ptr_eq(&grid.collection, &shifted.collection));
        assert_eq!(
            shifted.collection.time_span().unwrap().0,
            grid.collection.time_span().unwrap().0 + 100.0
        );
    }

    #[test]
    fn test_overrides_and_base_reads() {
        let mut root = Node::root();
        let n = add(&mut root, Node::new("null", Null::new()));
        let s = add(
            &mut root,
            Node::new("shift", TimeShift::new()).with_params(Params::new().with(P_OFFSET, 50.0)),
        );
        connect(&mut root, n, s, 0);

        let host = host();
        let base = query([(Q_TIME, 10.0), (Q_DELTA, 0.0)]);
        let session = CookSession::new(&root, &host, base, CancelToken::new());
        let shifted = session.cook(&NodePath::parse("/shift")).unwrap();

        assert!(shifted.kinds.contains(DependencyKinds::TIME));
        assert_eq!(shifted.base_reads.get(Q_TIME), Some(&QueryValue::Float(10.0)));
        // input evaluated under the override key
        assert_eq!(count(&root, "/null"), 1);
        let null_state = root.find(&NodePath::parse("/null")).unwrap().state();
        assert!(null_state.cache.contains("/null#0?time=60"));
    }

    #[test]
    fn test_missing_and_reentrant() {
        let mut root = Node::root();
        add(&mut root, Node::new("grid", Grid::new()));
        let host = host();
        let session = CookSession::new(&root, &host, QueryMap::new(), CancelToken::new());

        assert_eq!(
            session.cook(&NodePath::parse("/nope")).unwrap_err(),
            CookError::MissingNode(NodePath::parse("/nope"))
        );
        let scope = Rc::new(ProvideScope::default());
        let grid = NodePath::parse("/grid");
        let err = session
            .resolve(&grid, 0, &QueryMap::new(), std::slice::from_ref(&grid), &scope)
            .unwrap_err();
        assert_eq!(err, CookError::Reentrant(grid));
    }

    #[test]
    fn test_canceled_session_leaves_nodes_dirty() {
        let mut root = Node::root();
        add(&mut root, Node::new("grid", Grid::new()));
        let host = host();
        let token = CancelToken::new();
        token.cancel();
        let session = CookSession::new(&root, &host, QueryMap::new(), token);

        assert_eq!(session.cook(&NodePath::parse("/grid")).unwrap_err(), CookError::Canceled);
        let grid = root.find(&NodePath::parse("/grid")).unwrap();
        assert_eq!(grid.status(), CookStatus::Dirty);
        assert_eq!(grid.cook_count(), 0);
    }

    #[test]
    fn test_injected_results_are_not_persisted() {
        let mut root = Node::root();
        add(&mut root, Node::new("prev", PreviousFrame::new()));
        let host = host();
        let session = CookSession::new(&root, &host, QueryMap::new(), CancelToken::new());

        let outer = Rc::new(ProvideScope::default());
        outer.values.borrow_mut().insert(
            K_PREVIOUS_FRAME.to_string(),
            ContextValue::Collection(Arc::new(ElementCollection::new())),
        );
        let path = NodePath::parse("/prev");
        let resolved = session.resolve(&path, 0, &QueryMap::new(), &[], &outer).unwrap();

        assert!(resolved.kinds.contains(DependencyKinds::PARENT_VALUE));
        assert!(root.find(&path).unwrap().state().cache.is_empty());
    }
}
