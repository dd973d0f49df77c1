//! Resolve command-line inputs into a sorted list of PDF files.
//!
//! Files are taken as given (the loader rejects non-PDFs by signature);
//! directories are walked recursively for `**/*.pdf`, case-insensitively.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

fn pdf_matcher() -> Result<GlobMatcher> {
    Ok(GlobBuilder::new("**/*.pdf")
        .case_insensitive(true)
        .build()
        .context("invalid PDF glob")?
        .compile_matcher())
}

/// Expand `inputs` into PDF paths. The result is sorted and deduplicated
/// so builds are deterministic.
pub fn collect_pdf_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let matcher = pdf_matcher()?;
    let mut out = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).follow_links(false) {
                let entry = entry
                    .with_context(|| format!("Failed to walk directory: {}", input.display()))?;
                if entry.file_type().is_file() && is_match(&matcher, input, entry.path()) {
                    out.push(entry.into_path());
                }
            }
        } else if input.is_file() {
            out.push(input.clone());
        } else {
            bail!("Input not found: {}", input.display());
        }
    }

    out.sort();
    out.dedup();
    Ok(out)
}

fn is_match(matcher: &GlobMatcher, root: &Path, path: &Path) -> bool {
    let rel = path.strip_prefix(root).unwrap_or(path);
    matcher.is_match(rel)
}
