//! CLI entry point for fts-control
//!
//! Drives the spectrometer through one acquisition from the command line:
//!
//! ```bash
//! # Full cycle against the controller in config/fts.toml
//! fts-control run --range 10 50 --repeat 15
//!
//! # Same cycle on the simulated instrument
//! fts-control run --simulate --position 0 45
//!
//! # Inspect the controller's groups and stages
//! fts-control topology
//! ```
//!
//! Ctrl-C during `run` stops all motion and leaves the instrument
//! uninitialized.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fts_control::config::{FtsConfig, DEFAULT_CONFIG_PATH};
use fts_control::fts::{self, FtsHandle, FtsStateMachine, PointingPosition};
use fts_control::hardware::mock::{MockMotionLink, MockTransport};
use fts_control::hardware::{ConfigTransport, LocalTransport, MotionLink, XpsLink};
use fts_control::motion::ScanRequest;
use fts_control::error::FtsResult;
use fts_control::session::MotionSession;
use fts_control::topology::Topology;
use fts_control::tracing_setup::{self, OutputFormat, TracingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "fts-control")]
#[command(about = "Fourier-Transform Spectrometer control", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the simulated controller instead of the configured host
    #[arg(long, global = true)]
    simulate: bool,

    /// Log as JSON lines and print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize, point, scan and save
    Run {
        /// Scan bounds; full stage travel when omitted
        #[arg(long, num_args = 2, value_names = ["MINUS", "PLUS"], allow_negative_numbers = true)]
        range: Option<Vec<f64>>,

        /// Back-and-forth passes; `scan.repeat` from the config when omitted
        #[arg(long)]
        repeat: Option<u32>,

        /// Pointing mirror target
        #[arg(long, num_args = 2, value_names = ["LINEAR", "ANGLE"], allow_negative_numbers = true)]
        position: Option<Vec<f64>>,

        /// Treat the pointing target as relative
        #[arg(long)]
        relative: bool,
    },

    /// Connect and print the motion groups and stages
    Topology,

    /// Load and validate the configuration, then print it
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = FtsConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Compact
    };
    tracing_setup::init(TracingConfig::from_config(&config)?.with_format(format))?;

    match cli.command {
        Commands::Run {
            range,
            repeat,
            position,
            relative,
        } => {
            let (link, transport) = collaborators(&config, cli.simulate);
            let mut request = ScanRequest::default().with_repeat(repeat.unwrap_or(config.scan.repeat));
            if let Some([minus, plus]) = range.as_deref() {
                request = request.with_range(*minus, *plus);
            }
            let position = match position.as_deref() {
                Some([linear, angle]) => PointingPosition {
                    linear: *linear,
                    angle: *angle,
                },
                _ => PointingPosition {
                    linear: 0.0,
                    angle: 0.0,
                },
            };
            let plan = Acquisition {
                request,
                position,
                relative,
                json: cli.json,
            };
            run(config, link, transport, plan).await
        }
        Commands::Topology => {
            let (link, transport) = collaborators(&config, cli.simulate);
            print_topology(&config, link, transport).await
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

fn collaborators(
    config: &FtsConfig,
    simulate: bool,
) -> (Arc<dyn MotionLink>, Arc<dyn ConfigTransport>) {
    if simulate {
        info!("using simulated controller");
        (
            Arc::new(MockMotionLink::fts_default()),
            Arc::new(MockTransport::with_sample_description()),
        )
    } else {
        (
            Arc::new(XpsLink::new()),
            Arc::new(LocalTransport::new(config.transport.root.clone())),
        )
    }
}

struct Acquisition {
    request: ScanRequest,
    position: PointingPosition,
    relative: bool,
    json: bool,
}

async fn run(
    config: FtsConfig,
    link: Arc<dyn MotionLink>,
    transport: Arc<dyn ConfigTransport>,
    plan: Acquisition,
) -> Result<()> {
    let machine = FtsStateMachine::new(config, link, transport);
    let (handle, task) = fts::spawn(machine);

    let stopper = handle.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping motion");
            if let Err(e) = stopper.stop().await {
                error!(error = %e, "stop failed");
            }
        }
    });

    let outcome = acquire(&handle, plan).await;
    if let Err(e) = &outcome {
        error!(error = %e, state = %handle.state(), "acquisition failed");
    }

    ctrl_c.abort();
    handle.close().await?;
    drop(handle);
    task.await?;
    outcome
}

async fn acquire(handle: &FtsHandle, plan: Acquisition) -> Result<()> {
    handle.initialize().await.context("initialize")?;

    let report = handle.status().await.context("status")?;
    if plan.json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "{} firmware {}",
            report.state,
            report.firmware.as_deref().unwrap_or("unknown")
        );
        for group in &report.groups {
            println!("  {} ({}) status {}", group.name, group.category, group.code);
        }
    }

    handle
        .configure(plan.position, plan.relative)
        .await
        .context("configure")?;

    let result = handle.scan(plan.request).await.context("scan")?;
    info!(
        run_id = %result.run_id,
        minus = result.minus,
        plus = result.plus,
        timestamps = result.timestamps.len(),
        "scan finished"
    );

    let saved = handle.save().await.context("save")?;
    if plan.json {
        println!("{}", serde_json::to_string(&saved)?);
    } else {
        println!("saved {}", saved.gathering_file.display());
        if let Some(path) = &saved.timestamp_file {
            println!("saved {}", path.display());
        }
    }
    Ok(())
}

async fn print_topology(
    config: &FtsConfig,
    link: Arc<dyn MotionLink>,
    transport: Arc<dyn ConfigTransport>,
) -> Result<()> {
    let session = MotionSession::establish(link, transport, config).await?;
    let listing = describe_topology(session.topology());
    session.close().await?;
    println!("firmware: {}", session.firmware());
    print!("{}", listing?);
    Ok(())
}

fn describe_topology(topology: &Topology) -> FtsResult<String> {
    let mut out = String::new();
    for group in topology.groups() {
        out.push_str(&format!("{} ({})\n", group.name, group.category));
        for positioner in &group.positioners {
            let stage = topology.lookup_stage(positioner)?;
            out.push_str(&format!(
                "  {} [{}] travel [{}, {}] vmax {} amax {}\n",
                stage.name,
                stage.stage_type,
                stage.limits.min_target,
                stage.limits.max_target,
                stage.limits.max_velocity,
                stage.limits.max_acceleration
            ));
        }
    }
    Ok(out)
}
