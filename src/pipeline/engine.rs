//! Engine contract and the in-memory simulated engine
//!
//! The graph builder and the run session only talk to a processing engine
//! through [`Engine`]. The GStreamer realization lives in `gst_engine`;
//! [`SimulatedEngine`] records what was asked of it and replays a detection
//! script on a streaming thread of its own.

use std::collections::HashSet;
use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::aggregator::{lock_context, on_batch, SharedContext};
use crate::error::{HeadcountError, HeadcountResult};
use crate::metrics::ManualClock;
use crate::pipeline::topology::{LinkKind, LinkSpec, NodeRole, NodeSpec};
use crate::replay::ReplayScript;
use crate::utils::meta::BatchMeta;

/// Why the pipeline stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    FatalError {
        source_element: String,
        message: String,
        debug: Option<String>,
    },
}

impl StopReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            StopReason::EndOfStream => 0,
            StopReason::FatalError { .. } => 1,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StopReason::FatalError { .. })
    }

    pub fn into_error(self) -> Option<HeadcountError> {
        match self {
            StopReason::EndOfStream => None,
            StopReason::FatalError {
                source_element,
                message,
                ..
            } => Some(HeadcountError::RuntimeFatal {
                source_element,
                message,
            }),
        }
    }
}

/// Lifecycle state of an engine's pipeline container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Null,
    Playing,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EngineState::Null => "null",
            EngineState::Playing => "playing",
            EngineState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Narrow contract between graph assembly and a streaming runtime
pub trait Engine {
    /// Create the container every node is registered in
    fn create_container(&mut self, name: &str) -> HeadcountResult<()>;

    /// Instantiate and register one node with its properties applied
    fn create_node(&mut self, spec: &NodeSpec) -> HeadcountResult<()>;

    fn link(&mut self, link: &LinkSpec) -> HeadcountResult<()>;

    /// Run [`on_batch`] for every batch reaching the named node
    fn attach_batch_probe(&mut self, node: &str, context: SharedContext) -> HeadcountResult<()>;

    fn play(&mut self) -> HeadcountResult<()>;

    /// Block until end of stream or a fatal runtime error
    fn wait_for_stop(&mut self) -> StopReason;

    fn stop(&mut self) -> HeadcountResult<()>;

    /// Tear down the container and every node in it. Safe to call twice.
    fn release(&mut self);
}

/// Engine that keeps the graph in memory and replays a [`ReplayScript`].
///
/// Batches start flowing once the caller blocks in [`Engine::wait_for_stop`],
/// so anything printed before that precedes the first batch line.
pub struct SimulatedEngine {
    container: Option<String>,
    nodes: Vec<NodeSpec>,
    links: Vec<LinkSpec>,
    requested_pads: HashSet<(String, String)>,
    probe: Option<(String, SharedContext)>,
    state: EngineState,
    released: bool,
    released_nodes: Vec<String>,
    fail_factories: HashSet<String>,
    fail_links: HashSet<(String, String)>,
    script: ReplayScript,
    clock: Option<ManualClock>,
    delivered: Arc<Mutex<Vec<BatchMeta>>>,
    worker: Option<JoinHandle<()>>,
    start_tx: Option<Sender<()>>,
    stop_rx: Option<Receiver<StopReason>>,
}

impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self {
            container: None,
            nodes: Vec::new(),
            links: Vec::new(),
            requested_pads: HashSet::new(),
            probe: None,
            state: EngineState::Null,
            released: false,
            released_nodes: Vec::new(),
            fail_factories: HashSet::new(),
            fail_links: HashSet::new(),
            script: ReplayScript::default(),
            clock: None,
            delivered: Arc::new(Mutex::new(Vec::new())),
            worker: None,
            start_tx: None,
            stop_rx: None,
        }
    }

    pub fn with_script(mut self, script: ReplayScript) -> Self {
        self.script = script;
        self
    }

    /// Move this clock to each batch's timestamp before delivering it
    pub fn with_clock(mut self, clock: ManualClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Make every node built from `factory` fail to instantiate
    pub fn fail_factory(mut self, factory: &str) -> Self {
        self.fail_factories.insert(factory.to_string());
        self
    }

    /// Make the link between two named nodes fail
    pub fn fail_link(mut self, upstream: &str, downstream: &str) -> Self {
        self.fail_links
            .insert((upstream.to_string(), downstream.to_string()));
        self
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn nodes(&self) -> &[NodeSpec] {
        &self.nodes
    }

    pub fn node_names(&self) -> Vec<&str> {
        self.nodes.iter().map(|node| node.name.as_str()).collect()
    }

    pub fn links(&self) -> &[LinkSpec] {
        &self.links
    }

    pub fn probe_node(&self) -> Option<&str> {
        self.probe.as_ref().map(|(name, _)| name.as_str())
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Names of the nodes torn down by [`Engine::release`]
    pub fn released_nodes(&self) -> &[String] {
        &self.released_nodes
    }

    /// Batches as they left the probe, overlays included
    pub fn delivered(&self) -> Vec<BatchMeta> {
        self.delivered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn find(&self, name: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.name == name)
    }

    fn join_worker(&mut self) {
        // a worker that was never started exits once its start channel closes
        self.start_tx = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("streaming thread panicked");
            }
        }
    }
}

impl Engine for SimulatedEngine {
    fn create_container(&mut self, name: &str) -> HeadcountResult<()> {
        if let Some(existing) = &self.container {
            return Err(HeadcountError::InvalidTopology(format!(
                "container '{}' already exists",
                existing
            )));
        }
        self.container = Some(name.to_string());
        self.released = false;
        Ok(())
    }

    fn create_node(&mut self, spec: &NodeSpec) -> HeadcountResult<()> {
        let creation_error = |reason: &str| HeadcountError::ElementCreation {
            name: spec.name.clone(),
            factory: spec.factory.clone(),
            reason: reason.to_string(),
        };

        if self.container.is_none() {
            return Err(creation_error("no pipeline container"));
        }
        if self.fail_factories.contains(&spec.factory) {
            return Err(creation_error("no such element factory"));
        }
        if self.find(&spec.name).is_some() {
            return Err(creation_error("name already in use"));
        }

        tracing::debug!(name = %spec.name, factory = %spec.factory, "node created");
        self.nodes.push(spec.clone());
        Ok(())
    }

    fn link(&mut self, link: &LinkSpec) -> HeadcountResult<()> {
        let link_error = |reason: String| HeadcountError::Link {
            upstream: link.upstream.clone(),
            downstream: link.downstream.clone(),
            reason,
        };

        for end in [&link.upstream, &link.downstream] {
            if self.find(end).is_none() {
                return Err(link_error(format!("'{}' is not in the pipeline", end)));
            }
        }
        if self
            .fail_links
            .contains(&(link.upstream.clone(), link.downstream.clone()))
        {
            return Err(link_error("incompatible pads".to_string()));
        }

        if let LinkKind::RequestPad(pad) = &link.kind {
            let is_batcher = self
                .find(&link.downstream)
                .is_some_and(|node| node.role == NodeRole::Batcher);
            if !is_batcher {
                return Err(link_error(format!(
                    "'{}' has no request pads",
                    link.downstream
                )));
            }
            if !self
                .requested_pads
                .insert((link.downstream.clone(), pad.clone()))
            {
                return Err(link_error(format!("pad '{}' already requested", pad)));
            }
        }

        self.links.push(link.clone());
        Ok(())
    }

    fn attach_batch_probe(&mut self, node: &str, context: SharedContext) -> HeadcountResult<()> {
        if self.find(node).is_none() {
            return Err(HeadcountError::InvalidTopology(format!(
                "cannot probe unknown node '{}'",
                node
            )));
        }
        self.probe = Some((node.to_string(), context));
        Ok(())
    }

    fn play(&mut self) -> HeadcountResult<()> {
        if self.container.is_none() || self.released {
            return Err(HeadcountError::StateChange(
                "no pipeline to play".to_string(),
            ));
        }
        if self.state != EngineState::Null {
            return Err(HeadcountError::StateChange(format!(
                "cannot play from state {}",
                self.state
            )));
        }

        let (start_tx, start_rx) = mpsc::channel::<()>();
        let (tx, rx) = mpsc::channel();
        let timeline = self.script.timeline();
        let error = self.script.error.clone();
        let context = self.probe.as_ref().map(|(_, ctx)| Arc::clone(ctx));
        let clock = self.clock.clone();
        let delivered = Arc::clone(&self.delivered);

        let worker = thread::Builder::new()
            .name("streaming".to_string())
            .spawn(move || {
                if start_rx.recv().is_err() {
                    return;
                }
                for (at_us, mut batch) in timeline {
                    if let Some(clock) = &clock {
                        clock.set(at_us);
                    }
                    if let Some(context) = &context {
                        on_batch(&mut batch, &mut lock_context(context));
                    }
                    delivered
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(batch);
                }
                let reason = match error {
                    Some(error) => StopReason::FatalError {
                        source_element: error.element,
                        message: error.message,
                        debug: error.debug,
                    },
                    None => StopReason::EndOfStream,
                };
                // the receiver is gone once the session stopped waiting
                let _ = tx.send(reason);
            })?;

        self.worker = Some(worker);
        self.start_tx = Some(start_tx);
        self.stop_rx = Some(rx);
        self.state = EngineState::Playing;
        Ok(())
    }

    fn wait_for_stop(&mut self) -> StopReason {
        let container = self.container.clone().unwrap_or_default();
        if let Some(start) = self.start_tx.take() {
            let _ = start.send(());
        }
        let reason = match self.stop_rx.take() {
            Some(rx) => rx.recv().unwrap_or_else(|_| StopReason::FatalError {
                source_element: container,
                message: "streaming thread exited without a stop signal".to_string(),
                debug: None,
            }),
            None => StopReason::FatalError {
                source_element: container,
                message: "pipeline is not playing".to_string(),
                debug: None,
            },
        };
        self.join_worker();
        reason
    }

    fn stop(&mut self) -> HeadcountResult<()> {
        self.join_worker();
        self.state = EngineState::Stopped;
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.join_worker();
        self.stop_rx = None;
        self.probe = None;
        self.released_nodes = self.nodes.drain(..).map(|node| node.name).collect();
        self.links.clear();
        self.requested_pads.clear();
        self.container = None;
        self.released = true;
        tracing::debug!(nodes = self.released_nodes.len(), "pipeline released");
    }
}

impl Drop for SimulatedEngine {
    fn drop(&mut self) {
        self.join_worker();
    }
}
