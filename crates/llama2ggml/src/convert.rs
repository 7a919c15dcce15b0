//! Conversion driver.
//!
//! Orchestrates one full conversion: hyperparameters, vocabulary, then one
//! output file per checkpoint part. Each part owns its output file
//! exclusively; on any fatal error or cancellation the part's partially
//! written file is removed instead of being left truncated on disk.

use crate::checkpoint;
use crate::error::{ConvertError, Result};
use crate::hparams::{part_count_for_dim, Hparams};
use crate::vocab::{SpmVocab, VocabSource};
use crate::writer::GgmlModelWriter;
use ggml_format::FloatType;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ── Cancel token ────────────────────────────────────────────────────────────

/// Cooperative cancellation token for a running conversion.
///
/// Cloning a token shares the same underlying flag so that any holder can
/// trigger cancellation visible to all others. The conversion checks it
/// between records, never mid-tensor.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new, non-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self { cancelled: Arc::new(AtomicBool::new(false)) }
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.is_cancelled() { Err(ConvertError::Cancelled) } else { Ok(()) }
    }
}

// ── Options ─────────────────────────────────────────────────────────────────

/// Fully resolved conversion inputs.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    /// Directory holding `params.json` and the checkpoint shards.
    pub model_dir: PathBuf,
    /// Tokenizer model; defaults to `tokenizer.model` next to the model
    /// directory.
    pub tokenizer: Option<PathBuf>,
    /// Base output path; defaults to `ggml-model-{tag}.bin` inside the model
    /// directory. Parts beyond the first append `.1`, `.2`, ...
    pub output: Option<PathBuf>,
    /// Requested precision for multi-dimensional tensors.
    pub float_type: FloatType,
}

impl ConvertOptions {
    pub fn new(model_dir: impl Into<PathBuf>, float_type: FloatType) -> Self {
        Self { model_dir: model_dir.into(), tokenizer: None, output: None, float_type }
    }

    /// Effective tokenizer path.
    pub fn tokenizer_path(&self) -> PathBuf {
        self.tokenizer.clone().unwrap_or_else(|| {
            self.model_dir
                .parent()
                .unwrap_or(&self.model_dir)
                .join("tokenizer.model")
        })
    }

    /// Effective base output path (part 0).
    pub fn base_output(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            self.model_dir.join(format!("ggml-model-{}.bin", self.float_type.tag()))
        })
    }

    /// Output path for part `part`.
    pub fn part_output(&self, part: u32) -> PathBuf {
        let base = self.base_output();
        if part == 0 { base } else { PathBuf::from(format!("{}.{part}", base.display())) }
    }
}

// ── Partial-output guard ────────────────────────────────────────────────────

/// Removes a partially written output file unless disarmed.
///
/// The original tooling left truncated files on disk after a mid-conversion
/// failure; this guard guarantees a part's output either exists complete or
/// not at all.
struct OutputGuard {
    path: PathBuf,
    armed: bool,
}

impl OutputGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "could not remove partial output"
                );
            } else {
                tracing::warn!(path = %self.path.display(), "removed partial output");
            }
        }
    }
}

// ── Driver ──────────────────────────────────────────────────────────────────

/// Convert a checkpoint directory, writing every part.
///
/// Returns the output paths in part order.
pub fn convert(options: &ConvertOptions) -> Result<Vec<PathBuf>> {
    convert_with(options, &CancelToken::new())
}

/// [`convert`] with an external cancellation token.
pub fn convert_with(options: &ConvertOptions, cancel: &CancelToken) -> Result<Vec<PathBuf>> {
    let hparams = Hparams::load(&options.model_dir.join("params.json"))?;

    let tokenizer_path = options.tokenizer_path();
    let vocab = SpmVocab::load(&tokenizer_path)?;
    let vocab_size = vocab.vocab_size() as i32;
    if let Some(declared) = hparams.vocab_size {
        if declared >= 0 && declared != vocab_size {
            tracing::warn!(
                declared,
                tokenizer = vocab_size,
                "sidecar vocab_size disagrees with tokenizer; using the tokenizer's"
            );
        }
    }

    let n_parts = part_count_for_dim(hparams.dim)?;
    tracing::info!(
        dim = hparams.dim,
        multiple_of = hparams.multiple_of,
        n_heads = hparams.n_heads,
        n_layers = hparams.n_layers,
        vocab_size,
        n_parts,
        ftype = options.float_type.tag(),
        "starting conversion"
    );

    let mut written = Vec::with_capacity(n_parts as usize);
    for part in 0..n_parts {
        cancel.checkpoint()?;
        let out_path = options.part_output(part);
        write_part(options, &hparams, &vocab, vocab_size, part, &out_path, cancel)?;
        tracing::info!(part, path = %out_path.display(), "part complete");
        written.push(out_path);
    }
    Ok(written)
}

/// Write one part, removing the output file on any failure.
fn write_part(
    options: &ConvertOptions,
    hparams: &Hparams,
    vocab: &SpmVocab,
    vocab_size: i32,
    part: u32,
    out_path: &Path,
    cancel: &CancelToken,
) -> Result<()> {
    let shard = checkpoint::shard_path(&options.model_dir, part);
    let mmap = checkpoint::open_shard(&shard)?;
    let tensors = checkpoint::deserialize(&shard, &mmap)?;

    let file = fs::File::create(out_path)?;
    let mut guard = OutputGuard::new(out_path.to_path_buf());
    let result = write_part_inner(options, hparams, vocab, vocab_size, &tensors, file, cancel);
    if result.is_ok() {
        guard.disarm();
    }
    result
}

fn write_part_inner(
    options: &ConvertOptions,
    hparams: &Hparams,
    vocab: &SpmVocab,
    vocab_size: i32,
    tensors: &safetensors::SafeTensors<'_>,
    file: fs::File,
    cancel: &CancelToken,
) -> Result<()> {
    // The file handle moves into this frame and is closed when it returns,
    // before the guard decides whether to remove the path.
    let mut writer = GgmlModelWriter::new(BufWriter::new(file), options.float_type);

    writer.write_header(hparams, vocab_size)?;
    cancel.checkpoint()?;
    writer.write_vocab(vocab)?;

    for name in checkpoint::ordered_names(tensors) {
        cancel.checkpoint()?;
        let view = tensors.tensor(&name).map_err(|e| ConvertError::MalformedCheckpoint {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        writer.write_checkpoint_tensor(&name, &view)?;
    }

    writer.flush()?;
    tracing::debug!(tensors = writer.tensors_written(), "part flushed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_initially_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn cancel_token_cancel_sets_flag() {
        let token = CancelToken::new();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_token_clone_shares_state() {
        let t1 = CancelToken::new();
        let t2 = t1.clone();
        t1.cancel();
        assert!(t2.is_cancelled());
    }

    #[test]
    fn default_output_name_uses_precision_tag() {
        let opts = ConvertOptions::new("/models/7B", FloatType::F16);
        assert_eq!(opts.base_output(), PathBuf::from("/models/7B/ggml-model-f16.bin"));

        let opts = ConvertOptions::new("/models/7B", FloatType::F32);
        assert_eq!(opts.base_output(), PathBuf::from("/models/7B/ggml-model-f32.bin"));
    }

    #[test]
    fn later_parts_append_numeric_suffix() {
        let opts = ConvertOptions::new("/models/13B", FloatType::F16);
        assert_eq!(opts.part_output(0), PathBuf::from("/models/13B/ggml-model-f16.bin"));
        assert_eq!(opts.part_output(1), PathBuf::from("/models/13B/ggml-model-f16.bin.1"));
        assert_eq!(opts.part_output(2), PathBuf::from("/models/13B/ggml-model-f16.bin.2"));
    }

    #[test]
    fn tokenizer_defaults_to_parent_directory() {
        let opts = ConvertOptions::new("/models/7B", FloatType::F16);
        assert_eq!(opts.tokenizer_path(), PathBuf::from("/models/tokenizer.model"));
    }

    #[test]
    fn explicit_paths_override_defaults() {
        let mut opts = ConvertOptions::new("/models/7B", FloatType::F16);
        opts.tokenizer = Some(PathBuf::from("/elsewhere/tok.model"));
        opts.output = Some(PathBuf::from("/out/model.bin"));
        assert_eq!(opts.tokenizer_path(), PathBuf::from("/elsewhere/tok.model"));
        assert_eq!(opts.part_output(0), PathBuf::from("/out/model.bin"));
        assert_eq!(opts.part_output(3), PathBuf::from("/out/model.bin.3"));
    }
}
