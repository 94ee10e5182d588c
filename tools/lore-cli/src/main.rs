//! Lore CLI - audio asset tool for Lorecore
//!
//! # Commands
//!
//! - `lore encode` - Compress a WAV file into an `.lqa` music stream
//! - `lore decode` - Decode an `.lqa` stream back to WAV through the
//!   runtime's streaming decoder
//! - `lore render` - Synthesize a `.mid` file to WAV through the MIDI
//!   pipeline (wavetable patches when available, FM fallback otherwise)
//!
//! # Usage
//!
//! ```bash
//! # Compress music for the game
//! lore encode town-theme.wav
//!
//! # Check what the runtime will actually play
//! lore decode town-theme.lqa preview.wav
//!
//! # Render a MIDI track with a patch set
//! lore render battle.mid --patches assets/patches.toml
//! ```

mod decode;
mod encode;
mod pcm;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Lore CLI - audio asset tool for Lorecore
#[derive(Parser)]
#[command(name = "lore")]
#[command(about = "Audio asset tool for Lorecore")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress a WAV file into an .lqa music stream
    Encode(encode::EncodeArgs),

    /// Decode an .lqa stream to WAV via the streaming decoder
    Decode(decode::DecodeArgs),

    /// Synthesize a .mid file to WAV via the MIDI pipeline
    Render(render::RenderArgs),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    match Cli::parse().command {
        Commands::Encode(args) => encode::run(args),
        Commands::Decode(args) => decode::run(args),
        Commands::Render(args) => render::run(args),
    }
}
