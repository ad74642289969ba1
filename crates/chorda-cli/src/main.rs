use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chorda_engine::{
    OutputMode, StereoFrame, Synth, SynthConfig, SynthError, TimedCommand, FRAME_SAMPLES,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Play(args) => execute_play(args),
        Commands::Query(args) => execute_query(args),
        Commands::Events(args) => execute_events(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

#[derive(Parser)]
#[command(author, version, about = "Soundfont synthesis with LADSPA channel filters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a single note, optionally through a filter.
    Play(PlayArgs),
    /// Print the controls of a LADSPA plugin as JSON.
    Query(QueryArgs),
    /// Run a JSON list of timed commands against the engine.
    Events(EventsArgs),
}

#[derive(Args)]
struct EngineArgs {
    /// Engine configuration (JSON). Soundfonts given on the command line are
    /// appended to the ones it lists.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Soundfont file; repeat to load several (ids follow the given order).
    #[arg(long = "soundfont")]
    soundfonts: Vec<PathBuf>,
    /// Render without an output device and report levels instead.
    #[arg(long)]
    headless: bool,
}

impl EngineArgs {
    fn build(&self) -> Result<Synth> {
        let mut config = match &self.config {
            Some(path) => SynthConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => SynthConfig::default(),
        };
        config.sfpaths.extend(self.soundfonts.iter().cloned());
        if self.headless {
            config.output = OutputMode::Headless;
        }
        Ok(Synth::new(config)?)
    }
}

#[derive(Args)]
struct PlayArgs {
    #[command(flatten)]
    engine: EngineArgs,
    #[arg(long, default_value_t = 0)]
    channel: usize,
    #[arg(long, default_value_t = 1)]
    sfont_id: u32,
    #[arg(long, default_value_t = 0)]
    bank: u32,
    #[arg(long, default_value_t = 0)]
    preset: u32,
    #[arg(long, default_value_t = 60)]
    key: u8,
    #[arg(long, default_value_t = 100)]
    velocity: u8,
    /// How long the note is held.
    #[arg(long, default_value_t = 1.0)]
    seconds: f32,
    /// Filter library to insert on the channel.
    #[arg(long, requires = "label")]
    plugin: Option<PathBuf>,
    /// Label of the plugin inside the library.
    #[arg(long)]
    label: Option<String>,
    /// Control assignments for the filter, as NAME=VALUE.
    #[arg(long = "set", value_parser = parse_assignment)]
    controls: Vec<(String, f32)>,
}

#[derive(Args)]
struct QueryArgs {
    /// LADSPA shared library.
    #[arg(long)]
    plugin: PathBuf,
    #[arg(long)]
    label: String,
    #[arg(long, default_value_t = 44_100)]
    sample_rate: u32,
}

#[derive(Args)]
struct EventsArgs {
    #[command(flatten)]
    engine: EngineArgs,
    /// JSON array of timed commands.
    #[arg(long)]
    events: PathBuf,
    /// Extra time to keep the engine running after the last event.
    #[arg(long, default_value_t = 0.5)]
    tail: f32,
}

fn parse_assignment(text: &str) -> Result<(String, f32), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got {text}"))?;
    let value = value
        .trim()
        .parse::<f32>()
        .map_err(|err| format!("invalid value for {name}: {err}"))?;
    Ok((name.trim().to_owned(), value))
}

fn execute_play(args: PlayArgs) -> Result<()> {
    let mut synth = args.engine.build()?;
    synth.start().context("failed to start engine")?;

    synth.select(args.channel, args.sfont_id, args.bank, args.preset)?;
    if let (Some(plugin), Some(label)) = (&args.plugin, &args.label) {
        synth
            .add_filter(args.channel, plugin, label)
            .with_context(|| format!("failed to add {label} from {}", plugin.display()))?;
        for (name, value) in &args.controls {
            let applied = synth.set_control(args.channel, label, name.as_str(), *value)?;
            info!(control = %name, value = applied, "control set");
        }
        synth.enable_filter(args.channel, label)?;
    }

    synth.note_on(args.channel, args.key, args.velocity)?;
    run_for(&synth, Duration::from_secs_f32(args.seconds.max(0.0)), args.sfont_id)?;
    synth.note_off(args.channel, args.key)?;
    run_for(&synth, Duration::from_millis(250), args.sfont_id)?;

    synth.stop();
    Ok(())
}

fn execute_query(args: QueryArgs) -> Result<()> {
    let config = SynthConfig {
        sample_rate: args.sample_rate,
        output: OutputMode::Headless,
        ..SynthConfig::default()
    };
    let synth = Synth::new(config)?;
    let controls = synth
        .query_filter(&args.plugin, &args.label)
        .with_context(|| format!("failed to query {} in {}", args.label, args.plugin.display()))?;

    let report = QueryReport {
        plugin: &args.plugin,
        label: &args.label,
        controls,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Serialize)]
struct QueryReport<'a> {
    plugin: &'a PathBuf,
    label: &'a str,
    controls: Vec<chorda_engine::ControlInfo>,
}

fn execute_events(args: EventsArgs) -> Result<()> {
    let data = fs::read_to_string(&args.events)
        .with_context(|| format!("failed to read events file {}", args.events.display()))?;
    let batch: Vec<TimedCommand> = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a valid events file", args.events.display()))?;

    let mut synth = args.engine.build()?;
    for timed in &batch {
        if let Some(channel) = timed.command.channel() {
            synth.state().channels().channel(channel)?;
        }
    }
    synth.start().context("failed to start engine")?;

    let last = batch.iter().map(|timed| timed.when).max().unwrap_or(0);
    let ids = synth.schedule_batch(batch);
    info!(events = ids.len(), "events scheduled");

    let total = Duration::from_millis(last) + Duration::from_secs_f32(args.tail.max(0.0));
    run_for(&synth, total, 1)?;
    synth.stop();
    Ok(())
}

/// Keeps the engine running for `duration`. Headless engines are drained at
/// roughly real-time pace and the peak level of unit `sfont_id` is printed.
fn run_for(synth: &Synth, duration: Duration, sfont_id: u32) -> Result<()> {
    if synth.config().output == OutputMode::Device {
        thread::sleep(duration);
        return Ok(());
    }

    let sample_rate = synth.config().sample_rate.max(1);
    let frame_time = Duration::from_secs_f64(FRAME_SAMPLES as f64 / sample_rate as f64);
    let start = Instant::now();
    let mut frame = StereoFrame::silent();
    let mut peak = 0.0f32;
    let mut frames = 0usize;
    while start.elapsed() < duration {
        if synth.pull(sfont_id, &mut frame)? {
            frames += 1;
            peak = frame
                .left
                .iter()
                .chain(frame.right.iter())
                .fold(peak, |acc, s| acc.max(s.abs()));
        }
        thread::sleep(frame_time);
    }
    println!("rendered {frames} frames, peak {peak:.4}");
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<SynthError>() {
        Some(SynthError::InvalidChannel(_) | SynthError::UnboundChannel(_)) => 2,
        Some(SynthError::Config(_)) => 2,
        Some(SynthError::Filter(_) | SynthError::Control(_)) => 3,
        Some(SynthError::SoundFontMissing(_) | SynthError::Font(_)) => 4,
        Some(SynthError::Device(_)) => 5,
        _ => 1,
    }
}
