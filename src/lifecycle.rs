//! Run session: build, play, wait for the stop signal, tear down
//!
//! The stop signal is raised exactly once per run, either by end of stream or
//! by a fatal runtime error. Both take the same shutdown path.

use std::sync::Arc;

use crate::aggregator::{lock_context, SharedContext};
use crate::capability::CapabilityFlag;
use crate::config::AppConfig;
use crate::error::HeadcountResult;
use crate::metrics::PerfReport;
use crate::pipeline::builder::GraphBuilder;
use crate::pipeline::engine::Engine;
pub use crate::pipeline::engine::StopReason;
use crate::pipeline::topology::GraphTopology;
use crate::source::SourceDescriptor;

/// Operator line announcing the input
pub fn source_banner(source: &SourceDescriptor) -> String {
    match source {
        SourceDescriptor::Camera { .. } => "Using USB camera input".to_string(),
        SourceDescriptor::EncodedFile { path } => format!("Using file: {}", path.display()),
        SourceDescriptor::ConfigDriven { config_path } => {
            format!("Using file: {}", config_path.display())
        }
    }
}

/// Result of one completed run
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub reason: StopReason,
    pub report: PerfReport,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        self.reason.exit_code()
    }
}

/// A built pipeline bound to its engine and batch context
pub struct Session<'a, E: Engine> {
    engine: &'a mut E,
    source: SourceDescriptor,
    topology: GraphTopology,
    context: SharedContext,
}

impl<'a, E: Engine> Session<'a, E> {
    /// Build the graph and attach the batch probe. Nothing is left behind in
    /// the engine on failure.
    pub fn build(
        engine: &'a mut E,
        source: SourceDescriptor,
        capability: CapabilityFlag,
        config: &AppConfig,
        context: SharedContext,
    ) -> HeadcountResult<Self> {
        let topology = GraphBuilder::new(&mut *engine).build(&source, capability, config)?;

        if let Err(err) = engine.attach_batch_probe(topology.probe_node(), Arc::clone(&context)) {
            tracing::error!(node = topology.probe_node(), error = %err, "unable to attach batch probe");
            engine.release();
            return Err(err);
        }

        Ok(Self {
            engine,
            source,
            topology,
            context,
        })
    }

    pub fn topology(&self) -> &GraphTopology {
        &self.topology
    }

    /// Play until the stop signal, then stop and release the pipeline
    pub fn run(self) -> HeadcountResult<RunOutcome> {
        let Session {
            engine,
            source,
            topology,
            context,
        } = self;

        println!("{}", source_banner(&source));
        if let Err(err) = engine.play() {
            engine.release();
            return Err(err);
        }
        tracing::info!(pipeline = topology.name(), "pipeline playing");
        println!("Running...");

        let reason = engine.wait_for_stop();
        match &reason {
            StopReason::EndOfStream => println!("End of stream"),
            StopReason::FatalError {
                source_element,
                message,
                debug,
            } => {
                eprintln!("ERROR from element {}: {}", source_element, message);
                if let Some(debug) = debug {
                    eprintln!("Error details: {}", debug);
                }
            }
        }

        println!("Returned, stopping playback");
        let stopped = engine.stop();
        println!("Deleting pipeline");

        let report = {
            let ctx = lock_context(&context);
            if let Some(line) = ctx.perf().format_summary() {
                println!("{}", line);
            }
            ctx.report()
        };
        engine.release();
        stopped?;

        tracing::info!(
            frames = report.frames,
            exit_code = reason.exit_code(),
            "pipeline finished"
        );
        Ok(RunOutcome { reason, report })
    }
}
