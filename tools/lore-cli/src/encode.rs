//! `lore encode` - compress WAV into an .lqa music stream

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::pcm;

#[derive(Args)]
pub struct EncodeArgs {
    /// Input WAV file (mono or stereo)
    pub input: PathBuf,

    /// Output .lqa path (defaults to the input with an .lqa extension)
    pub output: Option<PathBuf>,
}

pub fn run(args: EncodeArgs) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("lqa"));

    let wav = pcm::read_wav(&args.input)?;
    let samples = pcm::resample(&wav, lore_qoa::SAMPLE_RATE);

    let encoded = lore_qoa::encode(&samples, wav.channels);
    std::fs::write(&output, &encoded).with_context(|| format!("writing {}", output.display()))?;

    let pcm_size = samples.len() * 2;
    println!(
        "{} -> {} ({} frames, {:.2}:1)",
        args.input.display(),
        output.display(),
        samples.len() / wav.channels as usize,
        pcm_size as f64 / encoded.len().max(1) as f64,
    );
    Ok(())
}
