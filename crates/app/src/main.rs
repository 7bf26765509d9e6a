mod scenario;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use plumefx_core::{
    AttributeData, AttributeTarget, Effect, EffectDefinition, HostState, IntegratorStats,
    MemoryRenderer, PipelineConfig, PlumeError, SceneGraph,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::scenario::Scenario;

fn main() -> plumefx_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            scenario,
            config,
            ticks,
            dt,
        } => run_simulate(&scenario, config.as_deref(), ticks, dt),
        Commands::Check { effect } => run_check(&effect),
    }
}

#[derive(Debug, Serialize)]
struct AttributeReport {
    path: String,
    target: AttributeTarget,
    value: AttributeData,
    visible: bool,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    effect: String,
    ticks: u64,
    time: f32,
    visible: bool,
    integrators: usize,
    active: usize,
    controllers: Vec<(String, Vec<f32>)>,
    attributes: Vec<AttributeReport>,
}

fn run_simulate(
    path: &Path,
    config: Option<&Path>,
    ticks: u32,
    dt: f32,
) -> plumefx_core::Result<()> {
    tracing::info!(?path, ticks, dt, "running scenario");

    let scenario = Scenario::from_path(path)?;
    let config = match config {
        Some(path) => PipelineConfig::from_path(path)?,
        None => scenario.config.clone(),
    };
    let scene = scenario.scene();
    let mut renderer = scenario.renderer(&scene);
    let mut host = scenario.host.host();
    scenario.host.apply(&mut host, 0.0);

    let mut effect = Effect::new(config, Default::default());
    effect.load(scenario.effect.clone())?;
    effect.initialize(&host, scene.clone(), &renderer)?;

    let mut stats = IntegratorStats::default();
    for _ in 0..ticks {
        let time = effect.clock().time_seconds + dt;
        scenario.host.apply(&mut host, time);
        stats = effect.tick(dt, &host, &mut renderer)?.integrators;
    }

    let report = SimulationReport {
        effect: effect.name().to_string(),
        ticks: effect.clock().ticks,
        time: effect.clock().time_seconds,
        visible: effect.is_visible(),
        integrators: stats.integrators,
        active: stats.active,
        controllers: effect
            .controllers()
            .outputs()
            .iter()
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect(),
        attributes: collect_attributes(&scene, &renderer),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn collect_attributes(scene: &SceneGraph, renderer: &MemoryRenderer) -> Vec<AttributeReport> {
    let mut attributes: Vec<AttributeReport> = renderer
        .attributes()
        .map(|(element, target, value)| AttributeReport {
            path: scene.path(*element),
            target: target.clone(),
            value: *value,
            visible: renderer.is_visible(*element, target),
        })
        .collect();
    attributes.sort_by(|a, b| {
        a.path
            .cmp(&b.path)
            .then_with(|| a.target.to_string().cmp(&b.target.to_string()))
    });
    attributes
}

/// Saves an effect after building it, then confirms the saved form builds
/// into the same declarations.
fn run_check(path: &Path) -> plumefx_core::Result<()> {
    let definition = EffectDefinition::from_path(path)?;
    let first = roundtrip(definition)?;
    let second = roundtrip(EffectDefinition::from_json_str(&first.to_json_string()?)?)?;
    if first != second {
        return Err(PlumeError::msg(format!(
            "{} does not survive a save/load round trip",
            path.display()
        )));
    }
    tracing::info!(
        effect = %first.name,
        controllers = first.controllers.len(),
        modifiers = first.modifiers.len(),
        "effect definition is stable"
    );
    println!("{}", first.to_json_string()?);
    Ok(())
}

fn roundtrip(definition: EffectDefinition) -> plumefx_core::Result<EffectDefinition> {
    let host = HostState::new();
    let mut renderer = MemoryRenderer::new();
    let mut effect = Effect::default();
    effect.load(definition)?;
    effect.initialize(&host, SceneGraph::new(), &renderer)?;
    let saved = effect.save();
    effect.unload(&mut renderer)?;
    Ok(saved)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Engine effect pipeline driver", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive an effect through a scripted scenario and print the final state.
    Simulate {
        /// Scenario file describing the model, host script and effect.
        #[arg(short, long)]
        scenario: PathBuf,
        /// Pipeline settings overriding the scenario's own.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Number of ticks to run.
        #[arg(short, long, default_value_t = 100)]
        ticks: u32,
        /// Seconds per tick.
        #[arg(long, default_value_t = 0.02)]
        dt: f32,
    },
    /// Verify that an effect definition survives a save/load round trip.
    Check {
        /// Effect definition file.
        #[arg(short, long)]
        effect: PathBuf,
    },
}
