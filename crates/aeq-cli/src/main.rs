//! AudioEQ command-line front end
//!
//! Usage:
//!   aeq presets                  - List built-in presets
//!   aeq response --preset Rock   - Print a frequency response curve
//!   aeq export --preset Jazz     - Print a preset as JSON
//!   aeq analyze --frequency 440  - Run a test tone through the engine

use std::f64::consts::PI;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use aeq_core::{EqSettings, builtin_presets, preset};
use aeq_dsp::SpectrumFrame;
use aeq_engine::{EngineConfig, EqEngine};

#[derive(Parser)]
#[command(name = "aeq", about = "Parametric/graphic EQ engine tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List built-in presets
    Presets {
        /// Print gain tables too
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print `frequency_hz magnitude_db` rows for a preset or settings file
    Response {
        /// Built-in preset name
        #[arg(short, long, conflicts_with = "settings")]
        preset: Option<String>,
        /// EQ settings JSON file
        #[arg(short, long)]
        settings: Option<PathBuf>,
        #[arg(long, default_value_t = 48000.0)]
        sample_rate: f64,
        #[arg(long, default_value_t = 200)]
        points: usize,
    },
    /// Print a built-in preset as JSON
    Export {
        #[arg(short, long)]
        preset: String,
    },
    /// Run a sine through the engine and print the analyzer's view of it
    Analyze {
        /// Test tone frequency (Hz)
        #[arg(short, long, default_value_t = 1000.0)]
        frequency: f64,
        /// Run time (seconds)
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
        #[arg(short, long)]
        preset: Option<String>,
        /// Engine configuration JSON file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Presets { verbose } => list_presets(verbose),
        Commands::Response {
            preset,
            settings,
            sample_rate,
            points,
        } => print_response(preset.as_deref(), settings.as_deref(), sample_rate, points),
        Commands::Export { preset } => export_preset(&preset),
        Commands::Analyze {
            frequency,
            seconds,
            preset,
            config,
        } => analyze(frequency, seconds, preset.as_deref(), config.as_deref()),
    }
}

fn find_preset(name: &str) -> Result<EqSettings> {
    match preset(name) {
        Some(settings) => Ok(settings),
        None => bail!("Unknown preset '{}' (try `aeq presets`)", name),
    }
}

fn load_settings(preset: Option<&str>, settings: Option<&Path>) -> Result<EqSettings> {
    if let Some(path) = settings {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        return serde_json::from_str(&json)
            .with_context(|| format!("Invalid EQ settings in {}", path.display()));
    }
    match preset {
        Some(name) => find_preset(name),
        None => Ok(EqSettings::flat()),
    }
}

fn list_presets(verbose: bool) -> Result<()> {
    for settings in builtin_presets() {
        if verbose {
            let gains: Vec<String> = settings
                .graphic_gains()
                .iter()
                .map(|g| format!("{:+.0}", g))
                .collect();
            println!("{:<14} {}", settings.name, gains.join(" "));
        } else {
            println!("{}", settings.name);
        }
    }
    Ok(())
}

fn print_response(
    preset: Option<&str>,
    settings: Option<&Path>,
    sample_rate: f64,
    points: usize,
) -> Result<()> {
    let settings = load_settings(preset, settings)?;
    let config = EngineConfig {
        sample_rate,
        response_points: points,
        ..Default::default()
    };
    let mut engine = EqEngine::build(config).context("Invalid engine configuration")?;
    let controller = engine.controller();
    controller.apply_settings(&settings)?;

    let curve = controller.response_curve()?;
    println!("# {} @ {} Hz", settings.name, sample_rate);
    for point in &curve {
        println!("{:.2} {:.3}", point.frequency_hz, point.magnitude_db);
    }
    Ok(())
}

fn export_preset(name: &str) -> Result<()> {
    let settings = find_preset(name)?;
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

fn analyze(
    frequency: f64,
    seconds: f64,
    preset: Option<&str>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            EngineConfig::from_json_str(&json)?
        }
        None => EngineConfig::default(),
    };
    if !(seconds > 0.0 && seconds.is_finite()) {
        bail!("Run time must be positive, got {}", seconds);
    }

    log::info!("Analyzing a {} Hz tone for {} s", frequency, seconds);

    let sample_rate = config.sample_rate;
    let channels = config.channels;
    let engine = EqEngine::build(config)?;
    let (mut controller, mut processor, mut analyzer) = engine.split();
    controller.apply_settings(&load_settings(preset, None)?)?;

    let frames = analyzer.subscribe(8);
    analyzer.start()?;

    // Stand-in for the device callback: fixed-size blocks, paced in real time
    let block_frames = 512;
    let total_frames = (seconds * sample_rate) as usize;
    let audio = thread::Builder::new()
        .name("aeq-audio".into())
        .spawn(move || {
            let period = Duration::from_secs_f64(block_frames as f64 / sample_rate);
            let mut buffer = vec![0.0_f32; block_frames * channels];
            let mut position = 0;
            let start = Instant::now();
            while position < total_frames {
                for (i, frame) in buffer.chunks_exact_mut(channels).enumerate() {
                    let t = (position + i) as f64 / sample_rate;
                    frame.fill((0.5 * (2.0 * PI * frequency * t).sin()) as f32);
                }
                processor.process_interleaved(&mut buffer);
                position += block_frames;

                let due = period * (position / block_frames) as u32;
                if let Some(wait) = due.checked_sub(start.elapsed()) {
                    thread::sleep(wait);
                }
            }
            processor
        })?;

    let mut last: Option<SpectrumFrame> = None;
    while !audio.is_finished() {
        if let Ok(frame) = frames.recv_timeout(Duration::from_millis(50)) {
            if !frame.is_silent() {
                last = Some(frame);
            }
        }
        let report = controller.poll_faults();
        if !report.is_empty() {
            println!("faults: {}", serde_json::to_string(&report)?);
        }
    }
    let processor = match audio.join() {
        Ok(processor) => processor,
        Err(_) => bail!("Audio thread panicked"),
    };
    analyzer.stop();

    match last {
        Some(frame) => print_frame(&frame),
        None => println!("No spectrum frames captured (run longer than one FFT window)"),
    }
    println!("stats: {}", serde_json::to_string(&processor.stats().snapshot())?);
    Ok(())
}

fn print_frame(frame: &SpectrumFrame) {
    println!("# frame {}", frame.sequence);
    for (freq, magnitude) in frame.frequencies.iter().zip(&frame.magnitudes) {
        let bar = "#".repeat((magnitude * 50.0).round() as usize);
        println!("{:>8.1} Hz {:.3} {}", freq, magnitude, bar);
    }
    if let Some(peak) = frame.peak_bin() {
        println!("strongest band: {:.1} Hz", frame.frequencies[peak]);
    }
}
