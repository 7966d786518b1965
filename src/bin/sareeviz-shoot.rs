// Saree Shoot - one photoshoot from the command line with live progress

use anyhow::Context;
use clap::Parser;
use crossterm::style::Stylize;
use sareeviz::StudioConfig;
use sareeviz::photoshoot::{
    CancelToken, GeminiAdapter, GenerationService, OrchestratorError, PhotoshootOrchestrator,
    RunSnapshot, UploadedSource,
};
use std::path::PathBuf;
use std::sync::Arc;
use termimad::{MadSkin, crossterm::style::Color};
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate a saree photoshoot from one garment photo", long_about = None)]
struct Args {
    /// Photo of the saree
    image: PathBuf,

    /// Number of poses (1-10, defaults to the config value)
    #[arg(short, long)]
    poses: Option<u32>,

    /// Try the failed pose once more if the failure looks transient
    #[arg(long)]
    retry_failed: bool,

    /// Regenerate these poses after the run
    #[arg(long, value_name = "POSE")]
    regenerate: Vec<u32>,

    /// Extra instruction for regenerated poses
    #[arg(long, requires = "regenerate")]
    instruction: Option<String>,

    /// Config file (default: .sareeviz.json in the current or home directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Where generated images are written
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn create_markdown_skin() -> MadSkin {
    let mut skin = MadSkin::default();
    skin.headers[0].set_fg(Color::Magenta);
    skin.headers[1].set_fg(Color::Cyan);
    skin.inline_code.set_fg(Color::Yellow);
    skin.bold.set_fg(Color::White);
    skin.italic.set_fg(Color::DarkGrey);
    skin
}

/// Print "pose K of N" lines as snapshots arrive
async fn report_progress(mut updates: watch::Receiver<RunSnapshot>) {
    let mut reported = 0;
    let mut regenerating = None;

    while updates.changed().await.is_ok() {
        let (cursor, total, running, regen) = {
            let snapshot = updates.borrow_and_update();
            (
                snapshot.cursor,
                snapshot.total,
                snapshot.phase.is_running(),
                snapshot.regenerating,
            )
        };

        if cursor < reported {
            reported = 0;
        }
        for pose in reported + 1..=cursor {
            println!("  {} pose {} of {}", "✓".green(), pose, total);
        }
        if running && cursor > reported && cursor < total {
            println!("  ⏳ generating pose {} of {}...", cursor + 1, total);
        }
        reported = cursor;

        if regen != regenerating {
            if let Some(pose) = regen {
                println!("  🎨 regenerating pose {}...", pose);
            }
            regenerating = regen;
        }
    }
}

fn print_summary(snapshot: &RunSnapshot, skin: &MadSkin) {
    let mut text = String::from("# Photoshoot\n\n");
    text.push_str(&format!("**Status:** {}\n\n", snapshot.phase));
    if let Some(seed) = &snapshot.seed {
        text.push_str(&format!("**Seed:** `{}`\n\n", seed));
    }

    if snapshot.artifacts.is_empty() {
        text.push_str("*No images generated*\n");
    } else {
        text.push_str("|Pose|Image|Notes|\n|-:|-|-|\n");
        for artifact in &snapshot.artifacts {
            let location = artifact
                .stored
                .as_ref()
                .map(|s| s.path.display().to_string())
                .unwrap_or_else(|| artifact.image.url().to_string());
            let notes: String = artifact
                .analysis
                .replace(['|', '\n'], " ")
                .chars()
                .take(60)
                .collect();
            text.push_str(&format!("|{}|{}|{}|\n", artifact.pose_index, location, notes));
        }
    }

    if let Some(error) = &snapshot.last_error {
        text.push_str(&format!(
            "\n**Last error** (pose {}): {}\n",
            error.pose_index(),
            error.message()
        ));
    }

    println!();
    skin.print_text(&text);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    sareeviz::logging::init(args.verbose);

    let mut config = StudioConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.output_dir {
        config.storage.output_dir = dir;
    }
    let total = args.poses.unwrap_or(config.default_poses);

    let source = UploadedSource::from_path(&args.image)
        .await
        .with_context(|| format!("Failed to read {}", args.image.display()))?;

    let service: Arc<dyn GenerationService> = Arc::new(GeminiAdapter::from_studio_config(&config)?);
    let orchestrator = PhotoshootOrchestrator::new(service);

    println!("\n📸 Saree photoshoot");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🖼️  Source: {} ({} bytes, {})", args.image.display(), source.len(), source.media_type());
    println!("🤖 Model: {}", orchestrator.service_name());
    println!("📁 Output: {}", config.storage.output_dir.display());
    println!("🎯 Poses: {}", total);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("\n⏹️  Stopping after the current pose...");
                cancel.cancel();
            }
        });
    }

    let progress = tokio::spawn(report_progress(orchestrator.subscribe()));

    match orchestrator.shoot(source, total, cancel.clone()).await {
        Ok(artifacts) => println!("\n✅ Generated {} poses", artifacts.len()),
        Err(OrchestratorError::PoseFailed { pose_index, source }) => {
            eprintln!("\n❌ Pose {} failed: {}", pose_index, source);

            if args.retry_failed && source.is_transient() && !cancel.is_cancelled() {
                println!("🔁 Retrying pose {}", pose_index);
                match orchestrator
                    .regenerate_pose(pose_index, None, cancel.clone())
                    .await
                {
                    Ok(_) => println!("✅ Pose {} recovered", pose_index),
                    Err(e) => eprintln!("❌ Retry failed: {}", e),
                }
            }
        }
        Err(OrchestratorError::Cancelled { completed }) => {
            println!("\n⏹️  Cancelled after {} poses", completed);
        }
        Err(e) => return Err(e.into()),
    }

    for pose in &args.regenerate {
        if cancel.is_cancelled() {
            break;
        }
        match orchestrator
            .regenerate_pose(*pose, args.instruction.as_deref(), cancel.clone())
            .await
        {
            Ok(artifact) => println!(
                "✅ Pose {} regenerated{}",
                pose,
                artifact
                    .download_url()
                    .map(|url| format!(" ({})", url))
                    .unwrap_or_default()
            ),
            Err(e) => eprintln!("❌ Pose {}: {}", pose, e),
        }
    }

    progress.abort();
    print_summary(&orchestrator.snapshot(), &create_markdown_skin());

    Ok(())
}
