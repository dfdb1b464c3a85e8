//! Override resolution: which labels get force-applied to one response.
//!
//! Overrides come from two sources, lowest precedence first: the inbound
//! request's query string, then `*.label` files in the configured directory.
//! The files are re-read on every request; they are small and local, and
//! skipping a cache avoids a stale-invalidation problem.
use crate::{
    telemetry::{
        ErrorKind,
        Telemetry,
    },
    LabelSet,
};
use std::path::Path;
use tracing::{
    debug,
    warn,
};

/// Resolve the effective override label set for one request.
///
/// Query pairs are folded in first (the first value of a repeated key wins),
/// then labels from `{name}.label` files are overlaid on top, so a file wins
/// any collision with a query parameter. The file's base name is the label
/// name and its content, with surrounding newlines trimmed, is the value.
///
/// Only the top level of `labels_dir` is listed. A missing or unreadable
/// directory or file is logged, counted, and skipped; resolution never
/// fails.
pub async fn resolve(
    labels_dir: &Path,
    query_pairs: &[(String, String)],
    telemetry: &Telemetry,
) -> LabelSet {
    let mut overrides = LabelSet::default();
    for (key, value) in query_pairs {
        if !overrides.contains_key(key) {
            overrides.insert(key.clone(), value.clone());
        }
    }

    let mut entries = match tokio::fs::read_dir(labels_dir).await {
        Ok(entries) => entries,
        Err(err) => {
            telemetry.error(ErrorKind::ListLabelsDir);
            warn!(dir = %labels_dir.display(), %err, "unable to list labels dir");
            return overrides;
        }
    };
    let mut found = 0_usize;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("label") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(path = %path.display(), "loaded override");
                overrides.insert(name.to_owned(), content.trim_matches('\n').to_owned());
                found += 1;
            }
            Err(err) => {
                telemetry.error(ErrorKind::ReadLabelFile);
                warn!(path = %path.display(), %err, "unable to read label file");
            }
        }
    }
    if found == 0 {
        debug!(dir = %labels_dir.display(), "no label files found");
    }
    overrides
}
