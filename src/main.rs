//! headcount command line entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use headcount::aggregator::BatchContext;
use headcount::capability::{default_probe, CapabilityFlag, CapabilityProbe, FixedProbe};
use headcount::config::AppConfig;
use headcount::error::HeadcountError;
use headcount::lifecycle::Session;
use headcount::metrics::ManualClock;
use headcount::pipeline::engine::{Engine, SimulatedEngine};
use headcount::pipeline::templates::{plan_topology, ResolvedSource};
use headcount::replay::ReplayScript;
use headcount::source::SourceDescriptor;

const USAGE: &str = "headcount <yml file>\n       headcount <H264 filename>\n       headcount camera";

/// Count people in a camera feed or an H.264 stream
#[derive(Parser, Debug)]
#[command(author, version, about, override_usage = USAGE)]
struct Args {
    /// `camera`, an H.264 elementary stream file or a .yml source config
    source: String,

    /// Application settings (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the device query and assume this GPU kind
    #[arg(long, env = "HEADCOUNT_GPU")]
    gpu: Option<CapabilityFlag>,

    /// Run without a display, ending in a fakesink
    #[arg(long)]
    no_display: bool,

    /// Print the planned topology and exit
    #[arg(long)]
    dry_run: bool,

    /// Drive the pipeline from a recorded detection script
    #[arg(long, value_name = "JSON")]
    replay: Option<PathBuf>,

    /// Write final throughput statistics to this file
    #[arg(long, value_name = "JSON")]
    report: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(args: Args, source: SourceDescriptor) -> Result<i32> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if args.no_display {
        config.output.display = false;
    }
    let source = source.with_camera_device(&config.camera.device);

    let probe: Box<dyn CapabilityProbe> = match args.gpu {
        Some(flag) => Box::new(FixedProbe::new(flag)),
        None => default_probe(config.inference.gpu_id),
    };
    let device = probe.probe()?;
    let capability = device.capability();
    tracing::info!(device = %device.name, %capability, "compute device");

    if args.dry_run {
        let resolved = ResolvedSource::resolve(&source, &config)?;
        let topology = plan_topology(&resolved, capability, &config)?;
        print!("{}", topology);
        return Ok(0);
    }

    let outcome = match &args.replay {
        Some(path) => {
            let script = ReplayScript::from_json_file(path)?;
            let clock = ManualClock::new(0);
            let context = BatchContext::with_clock(&config, Box::new(clock.clone())).shared();
            let mut engine = SimulatedEngine::new()
                .with_script(script)
                .with_clock(clock);
            run_session(&mut engine, source, capability, &config, context)?
        }
        None => run_live(source, capability, &config)?,
    };

    if let Some(path) = &args.report {
        outcome
            .report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
    }
    Ok(outcome.exit_code())
}

fn run_session<E: Engine>(
    engine: &mut E,
    source: SourceDescriptor,
    capability: CapabilityFlag,
    config: &AppConfig,
    context: headcount::SharedContext,
) -> Result<headcount::RunOutcome> {
    let session = Session::build(engine, source, capability, config, context)?;
    Ok(session.run()?)
}

#[cfg(feature = "gst")]
fn run_live(
    source: SourceDescriptor,
    capability: CapabilityFlag,
    config: &AppConfig,
) -> Result<headcount::RunOutcome> {
    use headcount::pipeline::gst_engine::{GstEngine, RoiMetaBridge};
    use std::sync::Arc;

    let bridge = Arc::new(RoiMetaBridge::new(config.overlay.class_labels.clone()));
    let mut engine = GstEngine::new(bridge)?;
    let context = BatchContext::new(config).shared();
    run_session(&mut engine, source, capability, config, context)
}

#[cfg(not(feature = "gst"))]
fn run_live(
    _source: SourceDescriptor,
    _capability: CapabilityFlag,
    _config: &AppConfig,
) -> Result<headcount::RunOutcome> {
    Err(HeadcountError::Unsupported(
        "built without the `gst` feature; use --replay or --dry-run".to_string(),
    )
    .into())
}

fn main() {
    let args = Args::parse();
    let source = match SourceDescriptor::parse(&args.source) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: {}\n\nUsage: {}", err, USAGE);
            std::process::exit(err.exit_code());
        }
    };
    init_tracing();

    let code = match run(args, source) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            err.downcast_ref::<HeadcountError>()
                .map_or(1, HeadcountError::exit_code)
        }
    };
    std::process::exit(code);
}
