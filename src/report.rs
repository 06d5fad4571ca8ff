//! # Report Assembler
//!
//! Builds the typed [`Report`] from the pipeline's stage outputs and
//! writes the JSON artifact. Artifacts are named by UTC timestamp and
//! never overwritten; the HTML artifact is delegated to an external
//! [`ReportRenderer`].

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::{Insight, Priority, Report, RunStats, SourceRef, VendorMention};
use crate::summarize::SourceBinding;

/// External HTML renderer seam. The pipeline hands over the same
/// typed report the JSON sink serialises; styling is not this crate's
/// concern.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &Report) -> Result<String, std::io::Error>;
}

/// Assemble the report. Priorities without insights are present with
/// empty lists so the renderer layout is stable; the source list is
/// ordered by SOURCE_ID.
pub fn assemble(
    generated_at: DateTime<Utc>,
    insights: Vec<Insight>,
    executive_summary: Option<String>,
    bindings: &[SourceBinding],
    vendor_rollup: Vec<VendorMention>,
    run_stats: RunStats,
) -> Report {
    let mut insights_by_priority: BTreeMap<Priority, Vec<Insight>> = BTreeMap::new();
    for priority in Priority::DISPLAY_ORDER {
        insights_by_priority.insert(*priority, Vec::new());
    }
    for insight in insights {
        insights_by_priority
            .entry(insight.priority)
            .or_default()
            .push(insight);
    }

    let mut sources: Vec<SourceRef> = bindings
        .iter()
        .map(|binding| SourceRef {
            source_id: binding.source_id,
            url: binding.item.item.url.clone(),
            title: binding.item.item.title.clone(),
            source_kind: binding.item.item.source_kind,
            posted_at: binding.item.item.posted_at,
        })
        .collect();
    sources.sort_by_key(|s| s.source_id);

    Report {
        generated_at,
        insights_by_priority,
        executive_summary,
        sources,
        vendor_rollup,
        run_stats,
    }
}

/// Deterministic artifact stem for a run: `report_<UTC timestamp>`.
pub fn artifact_stem(generated_at: DateTime<Utc>) -> String {
    format!("report_{}", generated_at.format("%Y%m%d_%H%M%S"))
}

/// Write the JSON artifact. Fails if the file already exists;
/// idempotency is by timestamped filename, never by overwrite.
pub fn write_json(report: &Report, output_dir: &Path) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.json", artifact_stem(report.generated_at)));
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    let json = serde_json::to_string_pretty(report)?;
    file.write_all(json.as_bytes())?;
    info!(path = %path.display(), "wrote report artifact");
    Ok(path)
}

/// Write the HTML artifact through the external renderer.
pub fn write_html(
    renderer: &dyn ReportRenderer,
    report: &Report,
    output_dir: &Path,
) -> Result<PathBuf, std::io::Error> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(format!("{}.html", artifact_stem(report.generated_at)));
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    file.write_all(renderer.render(report)?.as_bytes())?;
    info!(path = %path.display(), "wrote html artifact");
    Ok(path)
}
