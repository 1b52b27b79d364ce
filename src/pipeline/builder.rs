//! Graph builder: plans a topology and realizes it on an [`Engine`]
//!
//! Construction is fail-fast. Every node is created and registered before the
//! first link is attempted; on any failure the engine is released and the
//! error returned to the caller.

use crate::capability::CapabilityFlag;
use crate::config::AppConfig;
use crate::error::HeadcountResult;
use crate::pipeline::engine::Engine;
use crate::pipeline::templates::{plan_topology, ResolvedSource};
use crate::pipeline::topology::GraphTopology;
use crate::source::SourceDescriptor;

pub struct GraphBuilder<'a, E: Engine> {
    engine: &'a mut E,
}

impl<'a, E: Engine> GraphBuilder<'a, E> {
    pub fn new(engine: &'a mut E) -> Self {
        Self { engine }
    }

    /// Resolve the source, plan the topology for `capability` and build it
    pub fn build(
        &mut self,
        descriptor: &SourceDescriptor,
        capability: CapabilityFlag,
        config: &AppConfig,
    ) -> HeadcountResult<GraphTopology> {
        let source = ResolvedSource::resolve(descriptor, config)?;
        let topology = plan_topology(&source, capability, config)?;
        tracing::info!(
            source = %descriptor,
            capability = %capability,
            nodes = topology.nodes().len(),
            "building pipeline"
        );
        self.realize(&topology)?;
        Ok(topology)
    }

    /// Create every node of `topology`, then every link
    pub fn realize(&mut self, topology: &GraphTopology) -> HeadcountResult<()> {
        if let Err(err) = self.try_realize(topology) {
            tracing::error!(error = %err, "pipeline construction failed");
            self.engine.release();
            return Err(err);
        }
        Ok(())
    }

    fn try_realize(&mut self, topology: &GraphTopology) -> HeadcountResult<()> {
        topology.validate()?;
        self.engine.create_container(topology.name())?;
        for node in topology.nodes() {
            self.engine.create_node(node)?;
        }
        for link in topology.links() {
            self.engine.link(link)?;
        }
        Ok(())
    }
}
