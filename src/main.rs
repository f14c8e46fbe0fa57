// SERENADE Main Entry Point
// Copyright (c) 2026 SERENADE Project

use serenade_core::config::Settings;
use serenade_core::director::{
    DirectorPipeline, PipelineConfig, PipelineHooks, PipelineInput, Section, StyleToken,
};
use serenade_core::lyrics::{self, WordTiming};
use serenade_core::runner::ShowRunner;
use serenade_core::stage::{CameraView, LightPreset, NullEffects, NullHead};
use serenade_core::timeline::{CompileOptions, Timeline};
use serenade_core::{EngineEvent, EventKind, Plan};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "serenade-core")]
#[command(about = "SERENADE Performance Kernel", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the director chain over a sections file and print the merged plan
    Plan {
        /// JSON file: either [{start_ms,end_ms,text}] or timed words
        #[arg(short, long)]
        sections: PathBuf,

        /// Song duration in milliseconds
        #[arg(short, long)]
        duration: u64,

        /// Style token: cinematic, intimate, hype, minimal, experimental
        #[arg(long, default_value = "cinematic")]
        style: String,

        /// Seed string mixed into the prompts
        #[arg(long, default_value = "serenade")]
        seed: String,

        /// Output plan path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run stage and camera sequentially instead of in parallel
        #[arg(long)]
        sequential: bool,
    },

    /// Compile a plan file into a timeline file
    Compile {
        /// Plan JSON (as produced by `plan`)
        #[arg(short, long)]
        plan: PathBuf,

        /// Output timeline path (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Timed-words JSON to attach a lip-sync track
        #[arg(long)]
        words: Option<PathBuf>,

        /// Audio URL recorded in the lip-sync track
        #[arg(long)]
        audio: Option<String>,
    },

    /// Play a plan or timeline headlessly against a logging rig
    Perform {
        /// Plan JSON
        #[arg(short, long, conflicts_with = "timeline")]
        plan: Option<PathBuf>,

        /// Timeline JSON
        #[arg(short, long)]
        timeline: Option<PathBuf>,

        /// Playback rate multiplier
        #[arg(long, default_value_t = 1.0)]
        rate: f64,
    },

    /// Summarize a timeline file
    Inspect {
        /// Timeline JSON
        #[arg(short, long)]
        timeline: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("--- SERENADE PERFORMANCE KERNEL v0.1.1 ---");
    let settings = Settings::from_env();

    let args = Cli::parse();
    match args.command {
        Commands::Plan {
            sections,
            duration,
            style,
            seed,
            output,
            sequential,
        } => {
            let sections = load_sections(&sections, duration)?;
            let style = StyleToken::parse(&style)
                .with_context(|| format!("unknown style '{}'", style))?;

            let config = PipelineConfig {
                llm: settings,
                parallel_stage_camera: !sequential,
                ..Default::default()
            };
            let pipeline = DirectorPipeline::new(config);
            let input = PipelineInput {
                sections,
                duration_ms: duration,
                style,
                seed,
                default_light: LightPreset::Spotlight,
                default_camera: CameraView::Full,
            };

            let hooks = PipelineHooks {
                on_progress: Some(Arc::new(|p| {
                    info!(
                        "[PLAN] {} -> {:?}{}",
                        p.stage,
                        p.status,
                        p.message
                            .as_deref()
                            .map(|m| format!(" ({})", m))
                            .unwrap_or_default()
                    );
                })),
                on_thoughts: Some(Arc::new(|role, thoughts| {
                    info!("[PLAN] {} thinks: {}", role, thoughts);
                })),
                ..Default::default()
            };

            let outcome = pipeline.run(&input, &hooks).await;
            if outcome.used_fallback {
                info!("[PLAN] directors unavailable; heuristic plan emitted");
            }
            write_json(output.as_deref(), &outcome.plan)?;
        }

        Commands::Compile {
            plan,
            output,
            words,
            audio,
        } => {
            let plan: Plan = read_json(&plan)?;
            let speech = match words {
                Some(path) => {
                    let timings: Vec<WordTiming> = read_json(&path)?;
                    Some(lyrics::viseme_track(
                        &timings,
                        audio.as_deref().unwrap_or("song.mp3"),
                    ))
                }
                None => None,
            };
            let opts = CompileOptions {
                speech,
                ..Default::default()
            };
            let show = serenade_core::timeline::compile(&plan, &opts);
            info!(
                "[COMPILE] {} blocks, {} external actions",
                show.timeline.blocks.len(),
                show.external_actions.len()
            );
            write_json(output.as_deref(), &show.timeline)?;
        }

        Commands::Perform {
            plan,
            timeline,
            rate,
        } => {
            let mut runner = ShowRunner::new(Box::new(NullHead::new()), Box::new(NullEffects));
            match (plan, timeline) {
                (Some(path), _) => {
                    let plan: Plan = read_json(&path)?;
                    runner.load_from_plan(&plan, &CompileOptions::default())?;
                }
                (None, Some(path)) => {
                    let timeline: Timeline = read_json(&path)?;
                    runner.load_timeline(timeline)?;
                }
                (None, None) => anyhow::bail!("perform needs --plan or --timeline"),
            }
            runner.engine_mut().set_playback_rate(rate);
            runner.on(EventKind::BlockStart, |event| {
                if let EngineEvent::BlockStart { block_id, layer } = event {
                    info!("[PERFORM] + {} on {}", block_id, layer);
                }
            });
            runner.on(EventKind::WordChange, |event| {
                if let EngineEvent::WordChange { word, index } = event {
                    info!("[PERFORM] word {} '{}'", index, word);
                }
            });
            runner.run_to_completion().await?;
            info!("[PERFORM] show finished");
        }

        Commands::Inspect { timeline } => {
            let timeline: Timeline = read_json(&timeline)?;
            println!("timeline: {} ({})", timeline.name, timeline.id);
            println!("duration: {} ms", timeline.duration_ms);
            for layer in &timeline.layers {
                let count = timeline.blocks_on(layer.id).count();
                println!(
                    "  {:<11} {:>3} blocks  priority {:>2}{}",
                    layer.id.to_string(),
                    count,
                    layer.priority,
                    if layer.muted { "  (muted)" } else { "" }
                );
            }
            println!("markers: {}", timeline.markers.len());
        }
    }

    Ok(())
}

/// Sections come either pre-windowed or as timed words to be grouped.
fn load_sections(path: &PathBuf, duration_ms: u64) -> Result<Vec<Section>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    if let Ok(sections) = serde_json::from_str::<Vec<Section>>(&raw) {
        return Ok(sections);
    }
    let words: Vec<WordTiming> = serde_json::from_str(&raw)
        .context("sections file is neither sections nor timed words")?;
    Ok(lyrics::sections_from_words(
        &words,
        duration_ms,
        lyrics::SECTION_GAP_MS,
    ))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: serde::Serialize>(path: Option<&std::path::Path>, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("[CLI] wrote {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
