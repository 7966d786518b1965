// Saree Serve - HTTP API for photoshoot sessions

use clap::Parser;
use sareeviz::StudioConfig;
use sareeviz::photoshoot::GeminiAdapter;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Serve the saree photoshoot HTTP API", long_about = None)]
struct Args {
    /// Config file (default: .sareeviz.json in the current or home directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    sareeviz::logging::init(args.verbose);

    let mut config = StudioConfig::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let adapter = GeminiAdapter::from_studio_config(&config)?;

    println!("\n🌐 Saree photoshoot API");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("🔗 http://{}:{}", config.server.host, config.server.port);
    println!("🤖 Model: {}", config.gemini.model);
    println!(
        "📁 Images: {} -> {}",
        config.storage.output_dir.display(),
        config.storage.public_prefix
    );
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    sareeviz::server::serve(config, Arc::new(adapter)).await
}
