//! `lore render` - synthesize a .mid file to WAV via the MIDI pipeline

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lorecore_core::{AudioDecoder, SynthRegistry, shared_source};

use crate::pcm;

#[derive(Args)]
pub struct RenderArgs {
    /// Input .mid file
    pub input: PathBuf,

    /// Output WAV path (defaults to the input with a .wav extension)
    pub output: Option<PathBuf>,

    /// Wavetable patch manifest; without it the FM fallback renders
    #[arg(long)]
    pub patches: Option<PathBuf>,
}

pub fn run(args: RenderArgs) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("wav"));

    let mut registry = SynthRegistry::with_default_backends(args.patches.as_deref());

    let file = File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?;
    let mut decoder = registry
        .create_decoder(shared_source(file), true)
        .with_context(|| format!("creating a MIDI decoder for {}", args.input.display()))?;

    let frames = pcm::drain_to_wav(decoder.as_mut(), &output)?;
    println!(
        "{} -> {} ({} frames, {}s)",
        args.input.display(),
        output.display(),
        frames,
        decoder.ticks(),
    );
    Ok(())
}
