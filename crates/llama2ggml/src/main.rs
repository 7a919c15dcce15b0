//! LLaMA to GGML converter CLI.
//!
//! # Usage
//!
//! ```bash
//! # Convert a model directory (tokenizer.model discovered next to it)
//! llama2ggml --input models/7B
//!
//! # Full f32 output with explicit paths
//! llama2ggml --input models/7B --tokenizer models/tokenizer.model \
//!            --output /tmp/ggml-model.bin --ftype 0
//! ```
//!
//! Exit code 0 on success; non-zero with a diagnostic on any conversion
//! error. Multi-part models (13B and up) produce one file per part, with
//! `.1`, `.2`, ... appended beyond the first.

use anyhow::{Context, Result};
use clap::Parser;
use ggml_format::FloatType;
use llama2ggml::{convert, ConvertOptions};
use std::path::PathBuf;

/// Convert LLaMA checkpoint shards and a SentencePiece vocabulary to GGML
#[derive(Parser, Debug)]
#[command(name = "llama2ggml")]
#[command(about = "Convert LLaMA checkpoints to GGML model files")]
#[command(version)]
struct Args {
    /// Model directory containing params.json and consolidated.0N.safetensors
    #[arg(short, long)]
    input: PathBuf,

    /// Tokenizer model path
    ///
    /// Defaults to tokenizer.model in the parent of the model directory
    #[arg(short, long)]
    tokenizer: Option<PathBuf>,

    /// Base output path
    ///
    /// Defaults to ggml-model-{f32,f16}.bin inside the model directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output precision: 0 for f32, 1 for f16
    #[arg(short, long, default_value_t = 1)]
    ftype: i32,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    let float_type =
        FloatType::try_from(args.ftype).context("--ftype must be 0 (f32) or 1 (f16)")?;

    let options = ConvertOptions {
        model_dir: args.input,
        tokenizer: args.tokenizer,
        output: args.output,
        float_type,
    };

    tracing::info!("Input: {}", options.model_dir.display());
    tracing::info!("Tokenizer: {}", options.tokenizer_path().display());
    tracing::info!("Output: {}", options.base_output().display());

    let written = convert(&options)?;

    tracing::info!("Conversion complete!");
    for path in &written {
        tracing::info!("  Output: {}", path.display());
    }

    Ok(())
}
