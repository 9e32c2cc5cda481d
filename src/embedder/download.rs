/// Model file auto-download from HuggingFace.
///
/// Fetches the ONNX export and tokenizer of the configured sentence-transformers
/// model once, at startup, when they are not already on disk.
use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

const HF_BASE: &str = "https://huggingface.co/sentence-transformers";

/// Files required for the embedder, with their paths inside the model repo.
const MODEL_FILES: &[(&str, &str)] = &[
    ("model.onnx", "onnx/model.onnx"),
    ("tokenizer.json", "tokenizer.json"),
    ("config.json", "config.json"),
    ("special_tokens_map.json", "special_tokens_map.json"),
    ("tokenizer_config.json", "tokenizer_config.json"),
];

/// Check whether all required model files exist in `model_dir`.
#[must_use]
pub fn all_files_present(model_dir: &Path) -> bool {
    MODEL_FILES
        .iter()
        .all(|(name, _)| model_dir.join(name).exists())
}

fn file_url(model_name: &str, url_path: &str) -> String {
    format!("{HF_BASE}/{model_name}/resolve/main/{url_path}")
}

/// Download model files for `model_name` into `model_dir` if any are missing.
///
/// Files already present are left alone.
pub fn download_model_files(model_name: &str, model_dir: &Path) -> Result<()> {
    info!("Checking model files in {}", model_dir.display());

    fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create models directory: {}", model_dir.display()))?;

    if all_files_present(model_dir) {
        info!("All model files found, skipping download");
        return Ok(());
    }

    info!("Downloading {model_name} from HuggingFace (one-time)...");

    for &(filename, url_path) in MODEL_FILES {
        let dest = model_dir.join(filename);

        if dest.exists() {
            info!("File already exists: {filename}");
            continue;
        }

        let url = file_url(model_name, url_path);
        download_file(&dest, &url).with_context(|| format!("failed to download {filename}"))?;
        info!("Downloaded {filename}");
    }

    info!("Model download complete");
    Ok(())
}

/// Download a single file with a progress bar.
fn download_file(dest: &Path, url: &str) -> Result<()> {
    let mut resp =
        reqwest::blocking::get(url).with_context(|| format!("HTTP request failed: {url}"))?;

    if !resp.status().is_success() {
        anyhow::bail!("bad status: {} for {url}", resp.status());
    }

    let total = resp.content_length().unwrap_or(0);

    let pb = if total > 0 {
        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("  {bar:40.cyan/blue} {percent}% ({bytes}/{total_bytes}) {msg}")
                .context("invalid progress template")?
                .progress_chars("█▓░"),
        );
        pb
    } else {
        ProgressBar::new_spinner()
    };

    // Write to a temp name first so an interrupted download is not mistaken for a model file
    let partial = dest.with_extension("part");
    stream_to_file(&mut resp, &partial, &pb)?;
    pb.finish_and_clear();

    fs::rename(&partial, dest)
        .with_context(|| format!("failed to move {} into place", partial.display()))?;

    Ok(())
}

/// Copy `reader` into `path`, advancing `pb` by every chunk written.
fn stream_to_file<R: Read>(reader: &mut R, path: &Path, pb: &ProgressBar) -> Result<u64> {
    let file = fs::File::create(path)
        .with_context(|| format!("failed to create file: {}", path.display()))?;
    let mut writer = pb.wrap_write(BufWriter::new(file));

    let written = io::copy(reader, &mut writer).context("failed to write file")?;
    writer.flush().context("failed to flush file")?;
    Ok(written)
}
