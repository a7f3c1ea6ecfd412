//! Content directory scanner.
//!
//! Walks the configured content root and turns every post source file into a
//! [`FileDescriptor`]: front matter parsed, body extracted, content hash
//! computed, category derived from the directory the file sits in.
//! Eligibility is decided by the configured extension alone; hidden
//! (dot-prefixed) directories are walked like any other.
//!
//! The scan is best-effort per file. A file that cannot be read or decoded
//! is logged and skipped so one bad file never blocks the rest of the
//! corpus. Errors on the root itself (other than the root simply not
//! existing, which yields an empty scan) abort the run.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::Config;
use crate::fingerprint;
use crate::front_matter;
use crate::models::FileDescriptor;

pub fn scan_content_dir(config: &Config) -> Result<Vec<FileDescriptor>> {
    let root = config.content.root.as_path();
    if !root.exists() {
        // An absent root is an empty corpus, not an error.
        return Ok(Vec::new());
    }

    let mut descriptors = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                // Errors on the root itself make the whole scan untrustworthy.
                if err.path() == Some(root) {
                    return Err(err).with_context(|| {
                        format!("Failed to scan content root: {}", root.display())
                    });
                }
                warn!(error = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(config.content.extension.as_str()) {
            continue;
        }

        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        match file_to_descriptor(path, &rel_str) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(err) => {
                warn!(file = %rel_str, error = %err, "skipping unreadable post file");
            }
        }
    }

    // Sort for deterministic ordering
    descriptors.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    // One slug owns one post. The sort above makes the winner stable: the
    // first path claiming a slug keeps it, later claims are skipped.
    let mut seen_slugs = HashSet::new();
    descriptors.retain(|d| {
        if seen_slugs.insert(d.slug.clone()) {
            true
        } else {
            warn!(file = %d.relative_path, slug = %d.slug, "skipping duplicate slug");
            false
        }
    });

    Ok(descriptors)
}

fn file_to_descriptor(path: &Path, relative_path: &str) -> Result<FileDescriptor> {
    let content_hash = fingerprint::hash_file(path)?;
    let raw = std::fs::read_to_string(path)?;
    let parsed = front_matter::parse(&raw);

    let slug = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| relative_path.to_string());

    let title = parsed
        .metadata
        .get("title")
        .filter(|t| !t.is_empty())
        .cloned()
        .unwrap_or_else(|| slug.clone());

    let category = match relative_path.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => String::new(),
    };

    let is_hidden = parsed
        .metadata
        .get("hidden")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    Ok(FileDescriptor {
        relative_path: relative_path.to_string(),
        slug,
        title,
        category,
        content: parsed.body,
        content_hash,
        is_hidden,
    })
}
