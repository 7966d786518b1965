// sareeviz - virtual saree photoshoot studio
// Turns one garment photo into a sequence of model shots, one pose per call.

pub mod config;
pub mod logging;
pub mod photoshoot;
pub mod server;

pub use config::StudioConfig;
pub use photoshoot::{PhotoshootOrchestrator, UploadedSource};
