//! Human-readable failure reports for sync summaries

use crate::types::{BucketSyncSummary, FleetSyncSummary};

const RULE_WIDTH: usize = 60;

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Report listing every failed bucket and file of a fleet sync
pub fn failure_report(summary: &FleetSyncSummary) -> String {
    let mut lines = vec![
        rule(),
        "SYNC FAILURE REPORT - ALL BUCKETS".to_string(),
        rule(),
    ];

    for bucket in summary.bucket_summaries.iter().filter(|b| b.has_failures()) {
        lines.push(format!("\nBucket: {}", bucket.bucket));
        if let Some(ref error) = bucket.error {
            lines.push(format!("  Bucket-level error: {}", error));
        }
        if !bucket.failed_files.is_empty() {
            lines.push(format!("  Failed files ({}):", bucket.failed_files.len()));
            for failed in &bucket.failed_files {
                lines.push(format!("    - {}", failed.key));
                lines.push(format!("      Error: {}", failed.error));
            }
        }
    }

    lines.push(format!("\n{}", rule()));
    lines.join("\n")
}

/// Report for a single bucket sync
pub fn bucket_failure_report(summary: &BucketSyncSummary) -> String {
    let mut lines = vec![
        rule(),
        format!("SYNC FAILURE REPORT - BUCKET: {}", summary.bucket),
        rule(),
    ];

    if let Some(ref error) = summary.error {
        lines.push(format!("\nBucket-level error: {}", error));
    }
    if !summary.failed_files.is_empty() {
        lines.push(format!("\nFailed files ({}):", summary.failed_files.len()));
        for failed in &summary.failed_files {
            lines.push(format!("  - {}", failed.key));
            lines.push(format!("    Error: {}", failed.error));
        }
    }

    lines.push(format!("\n{}", rule()));
    lines.join("\n")
}
