//! Engine - owns the graph, the cook worker and the published result.
//!
//! Hosts edit the graph through the engine so every edit marks the right
//! nodes dirty, then request cooks. Requests go through a single-flight
//! [`Scheduler`]: a newer request supersedes a waiting one, and with
//! `supersede_running` it also cancels the running one.
//!
//! Only completed jobs publish; a canceled or failed job leaves the previous
//! published collection in place.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::Receiver;
use log::{debug, info};

use super::events::{CookEvent, CookEventBus};
use super::job::{CookJob, CookReport, JobOutcome};
use super::scheduler::{Scheduler, TaskHandle, TaskOutcome};
use crate::geometry::ElementCollection;
use crate::graph::{DependencyKinds, DirtyReason, Node, NodePath, ParamValue, dirty};
use crate::host::HostServices;

/// Last successfully cooked output.
#[derive(Debug, Clone)]
pub struct Published {
    pub target: NodePath,
    pub time: f64,
    pub collection: Arc<ElementCollection>,
}

#[derive(Debug, Default)]
struct TimeCursor {
    time: f64,
    /// Cursor position of the last published cook
    last_cooked: Option<f64>,
}

pub struct Engine {
    root: Arc<Mutex<Node>>,
    host: HostServices,
    scheduler: Scheduler<CookReport>,
    published: Arc<RwLock<Option<Published>>>,
    cursor: Arc<Mutex<TimeCursor>>,
    events: CookEventBus,
}

impl Engine {
    pub fn new(root: Node, host: HostServices) -> Result<Self> {
        let scheduler = Scheduler::new("spritecook-cook").context("Failed to start cook worker")?;
        for path in root.descendants() {
            if let Some(node) = root.find(&path) {
                node.set_cache_capacity(host.config.cache_capacity);
            }
        }
        Ok(Self {
            root: Arc::new(Mutex::new(root)),
            host,
            scheduler,
            published: Arc::new(RwLock::new(None)),
            cursor: Arc::new(Mutex::new(TimeCursor::default())),
            events: CookEventBus::new(),
        })
    }

    pub fn host(&self) -> &HostServices {
        &self.host
    }

    pub fn subscribe(&self) -> Receiver<CookEvent> {
        self.events.subscribe()
    }

    fn lock_root(&self) -> MutexGuard<'_, Node> {
        self.root.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_cursor(&self) -> MutexGuard<'_, TimeCursor> {
        self.cursor.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn supersede(&self) {
        if self.host.config.supersede_running && self.scheduler.cancel_current() {
            debug!("Running cook canceled by newer request");
        }
    }

    // --- Cooking ---

    /// Schedule a cook of `target` at the current time cursor.
    pub fn request_cook(&self, target: NodePath) -> TaskHandle<CookReport> {
        self.supersede();
        let (time, delta) = {
            let cursor = self.lock_cursor();
            (cursor.time, cursor.last_cooked.map_or(0.0, |last| cursor.time - last))
        };

        let root = Arc::clone(&self.root);
        let host = self.host.clone();
        let published = Arc::clone(&self.published);
        let cursor = Arc::clone(&self.cursor);
        let events = self.events.clone();

        self.scheduler.schedule(move |cancel| {
            let root = root.lock().unwrap_or_else(|e| e.into_inner());
            let report = CookJob::new(&root, target, &host)
                .at_time(time, delta)
                .with_cancel(cancel.clone())
                .with_events(events.clone())
                .run();
            drop(root);

            if report.outcome == JobOutcome::Completed && !cancel.is_canceled() {
                if let Some(collection) = &report.collection {
                    let elements = collection.len();
                    *published.write().unwrap_or_else(|e| e.into_inner()) = Some(Published {
                        target: report.target.clone(),
                        time: report.time,
                        collection: Arc::clone(collection),
                    });
                    cursor.lock().unwrap_or_else(|e| e.into_inner()).last_cooked = Some(report.time);
                    events.emit(CookEvent::Published {
                        target: report.target.clone(),
                        time: report.time,
                        elements,
                    });
                }
            }
            Ok(report)
        })
    }

    /// Cook and wait for the report.
    pub fn cook_blocking(&self, target: NodePath) -> Result<CookReport> {
        match self.request_cook(target.clone()).wait() {
            TaskOutcome::Finished(report) => Ok(report),
            TaskOutcome::Canceled => bail!("Cook of {} was canceled", target),
            TaskOutcome::Skipped => bail!("Cook of {} was superseded", target),
            TaskOutcome::Error(msg) => Err(anyhow!("Cook of {} failed: {}", target, msg)),
        }
    }

    pub fn published(&self) -> Option<Published> {
        self.published
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_busy(&self) -> bool {
        self.scheduler.is_busy()
    }

    // --- Invalidation events ---

    pub fn time(&self) -> f64 {
        self.lock_cursor().time
    }

    /// Move the time cursor; time-dependent nodes go dirty.
    pub fn set_time(&self, time: f64) {
        self.supersede();
        self.lock_cursor().time = time;
        let touched = dirty::mark_kinds_dirty(&self.lock_root(), DependencyKinds::TIME, DirtyReason::Time);
        debug!("set_time({}): {} nodes dirty", time, touched);
    }

    /// Textures, beatmap or audio changed on the host side.
    pub fn assets_reloaded(&self) {
        self.supersede();
        let touched =
            dirty::mark_kinds_dirty(&self.lock_root(), DependencyKinds::ASSETS, DirtyReason::Assets);
        info!("Assets reloaded: {} nodes dirty", touched);
    }

    // --- Graph edits ---

    /// Read-only access to the graph. Blocks while a cook runs.
    pub fn with_root<R>(&self, f: impl FnOnce(&Node) -> R) -> R {
        f(&self.lock_root())
    }

    /// Arbitrary edit. The caller is responsible for dirty marking.
    pub fn edit<R>(&self, f: impl FnOnce(&mut Node) -> R) -> R {
        self.supersede();
        f(&mut self.lock_root())
    }

    pub fn set_param(&self, path: &NodePath, key: &str, value: impl Into<ParamValue>) -> Result<()> {
        self.supersede();
        let mut root = self.lock_root();
        let node = root
            .find_mut(path)
            .ok_or_else(|| anyhow!("No node at {}", path))?;
        node.params_mut().set(key, value);
        dirty::mark_dirty(&root, path, DirtyReason::Params);
        Ok(())
    }

    /// Add `node` under the container at `parent`. Returns the new node's path.
    pub fn add_node(&self, parent: &NodePath, node: Node) -> Result<NodePath> {
        self.supersede();
        let mut root = self.lock_root();
        node.set_cache_capacity(self.host.config.cache_capacity);
        let name = node.name().to_string();
        container_mut(&mut root, parent)?.add_node(node)?;
        Ok(parent.child(&name))
    }

    /// Remove the node at `path`; its dependants go dirty first.
    pub fn remove_node(&self, path: &NodePath) -> Result<()> {
        self.supersede();
        let mut root = self.lock_root();
        dirty::mark_dirty(&root, path, DirtyReason::Structure);
        let (parent, name) = split(path)?;
        let system = container_mut(&mut root, &parent)?;
        let id = system
            .id_of(&name)
            .ok_or_else(|| anyhow!("No node at {}", path))?;
        system.remove_node(id);
        Ok(())
    }

    pub fn rename(&self, path: &NodePath, new_name: &str) -> Result<NodePath> {
        self.supersede();
        let mut root = self.lock_root();
        dirty::mark_dirty(&root, path, DirtyReason::Structure);
        let (parent, name) = split(path)?;
        let system = container_mut(&mut root, &parent)?;
        let id = system
            .id_of(&name)
            .ok_or_else(|| anyhow!("No node at {}", path))?;
        system.rename(id, new_name)?;
        Ok(parent.child(new_name))
    }

    /// Connect two siblings. The target and its dependants go dirty.
    pub fn connect(&self, from: &NodePath, from_slot: usize, to: &NodePath, to_slot: usize) -> Result<()> {
        self.supersede();
        let mut root = self.lock_root();
        let (parent, from_name, to_name) = siblings(from, to)?;
        let system = container_mut(&mut root, &parent)?;
        let (Some(a), Some(b)) = (system.id_of(&from_name), system.id_of(&to_name)) else {
            bail!("Cannot connect {} -> {}: unknown node", from, to);
        };
        system.connect(a, from_slot, b, to_slot)?;
        dirty::mark_dirty(&root, to, DirtyReason::Structure);
        Ok(())
    }

    /// Returns whether a connection was removed.
    pub fn disconnect(&self, from: &NodePath, from_slot: usize, to: &NodePath, to_slot: usize) -> Result<bool> {
        self.supersede();
        let mut root = self.lock_root();
        let (parent, from_name, to_name) = siblings(from, to)?;
        let system = container_mut(&mut root, &parent)?;
        let (Some(a), Some(b)) = (system.id_of(&from_name), system.id_of(&to_name)) else {
            bail!("Cannot disconnect {} -> {}: unknown node", from, to);
        };
        let removed = system.disconnect(a, from_slot, b, to_slot);
        if removed {
            dirty::mark_dirty(&root, to, DirtyReason::Structure);
        }
        Ok(removed)
    }

    /// Designate the output child of the container at `container`.
    pub fn set_output(&self, container: &NodePath, child: &str) -> Result<()> {
        self.supersede();
        let mut root = self.lock_root();
        let system = container_mut(&mut root, container)?;
        let id = system
            .id_of(child)
            .ok_or_else(|| anyhow!("No node {} in {}", child, container))?;
        system.set_output(id)?;
        dirty::mark_dirty(&root, container, DirtyReason::Structure);
        Ok(())
    }
}

fn container_mut<'a>(root: &'a mut Node, path: &NodePath) -> Result<&'a mut crate::graph::NodeSystem> {
    root.find_mut(path)
        .ok_or_else(|| anyhow!("No node at {}", path))?
        .system_mut()
        .ok_or_else(|| anyhow!("{} is not a container", path))
}

fn split(path: &NodePath) -> Result<(NodePath, String)> {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => Ok((parent, name.to_string())),
        _ => bail!("The root node cannot be edited this way"),
    }
}

fn siblings(from: &NodePath, to: &NodePath) -> Result<(NodePath, String, String)> {
    let (from_parent, from_name) = split(from)?;
    let (to_parent, to_name) = split(to)?;
    if from_parent != to_parent {
        bail!("{} and {} are not in the same system", from, to);
    }
    Ok((from_parent, from_name, to_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, YieldMode};
    use crate::graph::keys::{P_AMOUNT, P_OFFSET};
    use crate::nodes::{Grid, Null, Offset, TimeShift};

    fn engine() -> Engine {
        let host = HostServices::new(EngineConfig {
            yield_mode: YieldMode::None,
            ..EngineConfig::default()
        });
        Engine::new(Node::root(), host).unwrap()
    }

    fn p(s: &str) -> NodePath {
        NodePath::parse(s)
    }

    #[test]
    fn test_edit_and_cook_publishes() {
        let engine = engine();
        engine.add_node(&p("/"), Node::new("grid", Grid::new())).unwrap();
        engine.add_node(&p("/"), Node::new("off", Offset::new())).unwrap();
        engine.connect(&p("/grid"), 0, &p("/off"), 0).unwrap();
        engine.set_param(&p("/off"), P_AMOUNT, 250.0).unwrap();

        let events = engine.subscribe();
        let report = engine.cook_blocking(p("/off")).unwrap();
        assert!(report.outcome.is_completed());

        let published = engine.published().unwrap();
        assert_eq!(published.target, p("/off"));
        assert_eq!(published.collection.time_span(), Some((250.0, 750.0)));
        assert!(events
            .try_iter()
            .any(|e| matches!(e, CookEvent::Published { elements: 16, .. })));
    }

    #[test]
    fn test_param_edit_recooks_only_dependants() {
        let engine = engine();
        engine.add_node(&p("/"), Node::new("grid", Grid::new())).unwrap();
        engine.add_node(&p("/"), Node::new("off", Offset::new())).unwrap();
        engine.connect(&p("/grid"), 0, &p("/off"), 0).unwrap();
        engine.cook_blocking(p("/off")).unwrap();

        engine.set_param(&p("/off"), P_AMOUNT, 10.0).unwrap();
        let report = engine.cook_blocking(p("/off")).unwrap();
        assert_eq!(report.cooked, vec![p("/off")]);
    }

    #[test]
    fn test_time_change_dirties_time_readers() {
        let engine = engine();
        engine.add_node(&p("/"), Node::new("src", Null::new())).unwrap();
        engine
            .add_node(
                &p("/"),
                Node::new("shift", TimeShift::new())
                    .with_params(crate::graph::Params::new().with(P_OFFSET, 5.0)),
            )
            .unwrap();
        engine.connect(&p("/src"), 0, &p("/shift"), 0).unwrap();
        engine.cook_blocking(p("/shift")).unwrap();

        engine.set_time(100.0);
        assert_eq!(engine.time(), 100.0);
        engine.with_root(|root| {
            assert!(!root.find(&p("/shift")).unwrap().is_fresh());
            assert!(root.find(&p("/src")).unwrap().is_fresh());
        });
        let report = engine.cook_blocking(p("/shift")).unwrap();
        assert_eq!(report.time, 100.0);
        // the input cooks under the shifted time before the node completes
        assert_eq!(report.cooked, vec![p("/src"), p("/shift")]);
    }

    #[test]
    fn test_failed_cook_keeps_previous_publish() {
        let engine = engine();
        engine.add_node(&p("/"), Node::new("grid", Grid::new())).unwrap();
        engine.cook_blocking(p("/grid")).unwrap();

        let report = engine.cook_blocking(p("/missing")).unwrap();
        assert!(!report.outcome.is_completed());
        assert_eq!(engine.published().unwrap().target, p("/grid"));
    }

    #[test]
    fn test_structural_edits() {
        let engine = engine();
        engine.add_node(&p("/"), Node::new("a", Null::new())).unwrap();
        assert!(engine.add_node(&p("/a"), Node::new("b", Null::new())).is_err());
        assert!(engine.connect(&p("/a"), 0, &p("/nope"), 0).is_err());

        let renamed = engine.rename(&p("/a"), "z").unwrap();
        assert_eq!(renamed, p("/z"));
        engine.set_output(&p("/"), "z").unwrap();
        engine.remove_node(&p("/z")).unwrap();
        engine.with_root(|root| {
            let sys = root.system().unwrap();
            assert!(sys.is_empty());
            assert!(sys.output().is_none());
        });
    }
}
