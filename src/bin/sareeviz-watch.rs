// Saree Watch - hot folder that runs a photoshoot for each new photo

use anyhow::bail;
use clap::Parser;
use notify::event::{EventKind, ModifyKind};
use notify::RecursiveMode;
use notify_debouncer_full::{DebounceEventResult, new_debouncer};
use sareeviz::StudioConfig;
use sareeviz::config::CONFIG_FILE_NAME;
use sareeviz::photoshoot::{
    CancelToken, GeminiAdapter, GenerationService, PhotoshootOrchestrator, UploadedSource,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a photoshoot for every saree photo dropped into an inbox", long_about = None)]
struct Args {
    /// Create an example .sareeviz.json and exit
    #[arg(long)]
    init: bool,

    /// Config file (default: .sareeviz.json in the current or home directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of poses per photo (defaults to the config value)
    #[arg(short, long)]
    poses: Option<u32>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Whether the event brings a new file into the inbox
fn is_arrival(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

async fn shoot_file(
    orchestrator: &PhotoshootOrchestrator,
    path: &Path,
    total: u32,
) -> anyhow::Result<()> {
    let source = UploadedSource::from_path(path).await?;

    println!("\n📸 {}", path.display());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match orchestrator.shoot(source, total, CancelToken::new()).await {
        Ok(artifacts) => {
            for artifact in &artifacts {
                let location = artifact
                    .download_url()
                    .unwrap_or_else(|| artifact.image.url());
                println!("  ✓ pose {}: {}", artifact.pose_index, location);
            }
            println!("✅ {} poses generated", artifacts.len());
        }
        Err(e) => {
            let kept = orchestrator.artifacts().len();
            eprintln!("❌ {} ({} poses kept)", e, kept);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    sareeviz::logging::init(args.verbose);

    if args.init {
        let path = args.config.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        if path.exists() {
            bail!("{} already exists", path.display());
        }
        StudioConfig::write_example(&path)?;
        println!("✅ Created example config at: {}", path.display());
        return Ok(());
    }

    let config = StudioConfig::load(args.config.as_deref())?;
    let total = args.poses.unwrap_or(config.default_poses);

    let service: Arc<dyn GenerationService> = Arc::new(GeminiAdapter::from_studio_config(&config)?);
    let orchestrator = PhotoshootOrchestrator::new(service);

    println!("\n🔍 Saree inbox watcher");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    println!("Watching directories:");
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let mut debouncer = new_debouncer(
        Duration::from_millis(config.watch.debounce_ms),
        None,
        move |result: DebounceEventResult| {
            // The receiver only goes away on shutdown
            let _ = tx.send(result);
        },
    )?;

    let mut watching = 0;
    for dir in &config.watch.inbox_dirs {
        if dir.exists() {
            debouncer.watch(dir, RecursiveMode::Recursive)?;
            println!("  ✓ {}", dir.display());
            watching += 1;
        } else {
            println!("  ✗ {} (not found)", dir.display());
        }
    }
    if watching == 0 {
        bail!("None of the inbox directories exist");
    }

    if !config.watch.ignore_patterns.is_empty() {
        println!("\nIgnoring patterns:");
        for pattern in &config.watch.ignore_patterns {
            println!("  • {}", pattern);
        }
    }

    println!("\nPoses per photo: {}", total);
    println!("Debounce: {}ms", config.watch.debounce_ms);
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Waiting for saree photos... (Press Ctrl+C to stop)\n");

    loop {
        let result = tokio::select! {
            result = rx.recv() => match result {
                Some(result) => result,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for error in errors {
                    eprintln!("⚠️  Watch error: {}", error);
                }
                continue;
            }
        };

        let arrivals: BTreeSet<PathBuf> = events
            .iter()
            .filter(|event| is_arrival(&event.event.kind))
            .flat_map(|event| event.event.paths.iter())
            .filter(|path| path.is_file() && config.watch.image_media_type(path).is_some())
            .cloned()
            .collect();

        for path in arrivals {
            tokio::select! {
                outcome = shoot_file(&orchestrator, &path, total) => {
                    if let Err(e) = outcome {
                        eprintln!("⚠️  Skipped {}: {}", path.display(), e);
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    println!("\n⏹️  Stopped during {}", path.display());
                    return Ok(());
                }
            }
        }
    }

    println!("\n👋 Stopped watching");
    Ok(())
}
