//! `lore decode` - expand an .lqa stream to WAV via the runtime decoder

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use lorecore_core::{AudioDecoder, QoaDecoder, shared_source};

use crate::pcm;

#[derive(Args)]
pub struct DecodeArgs {
    /// Input .lqa stream
    pub input: PathBuf,

    /// Output WAV path (defaults to the input with a .wav extension)
    pub output: Option<PathBuf>,
}

pub fn run(args: DecodeArgs) -> Result<()> {
    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("wav"));

    let file = File::open(&args.input).with_context(|| format!("opening {}", args.input.display()))?;
    let mut decoder = QoaDecoder::open(shared_source(file))
        .with_context(|| format!("opening {} as an LQA1 stream", args.input.display()))?;

    let frames = pcm::drain_to_wav(&mut decoder, &output)?;
    println!(
        "{} -> {} ({} frames, {}s)",
        args.input.display(),
        output.display(),
        frames,
        decoder.ticks(),
    );
    Ok(())
}
