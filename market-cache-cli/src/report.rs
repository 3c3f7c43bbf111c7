//! Human-readable output for the CLI

use market_cache::{CacheStats, InvalidationEvent, PolicyTable, SizeGateStatus};
use std::fmt::Write;

pub fn render_stats(stats: &CacheStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Cache Statistics:");
    let _ = writeln!(out, "{}", "=".repeat(40));
    let _ = writeln!(out, "  Entries:       {}", stats.total_entries);
    let _ = writeln!(out, "  Quote series:  {}", stats.quote_series_count);
    let _ = writeln!(out, "  News:          {}", stats.news_count);
    let _ = writeln!(out, "  Fundamentals:  {}", stats.fundamentals_count);
    if stats.custom_count > 0 {
        let _ = writeln!(out, "  Custom:        {}", stats.custom_count);
    }
    let _ = writeln!(
        out,
        "  Skipped:       {} ({:.1}%)",
        stats.skipped_count,
        stats.skip_rate()
    );
    let _ = writeln!(out, "  Size:          {:.2} MB", stats.total_size_mb());

    if !stats.partitions.is_empty() {
        let _ = writeln!(out, "\nPartitions:");
        for (name, count) in &stats.partitions {
            let _ = writeln!(out, "  {:<30} {}", name, count);
        }
    }
    out
}

pub fn render_policies(policies: &PolicyTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{:<30} {:>8} {:>10}  Description", "Partition", "TTL", "Max files");
    for (name, policy) in policies.iter() {
        let _ = writeln!(
            out,
            "{:<30} {:>7}h {:>10}  {}",
            name, policy.ttl_hours, policy.max_files, policy.description
        );
    }
    let _ = writeln!(
        out,
        "Default TTL for other kinds: {}h",
        policies.default_ttl().as_secs() / 3600
    );
    out
}

pub fn render_gate_status(status: &SizeGateStatus) -> String {
    let list = |items: &[String]| {
        if items.is_empty() {
            "(none)".to_string()
        } else {
            items.join(", ")
        }
    };

    let mut out = String::new();
    let _ = writeln!(out, "Size gate:       {}", if status.enabled { "enabled" } else { "disabled" });
    let _ = writeln!(out, "Max length:      {} chars", status.max_content_length);
    let _ = writeln!(out, "Long-context:    {}", list(&status.long_context_providers));
    let _ = writeln!(out, "Configured:      {}", list(&status.available_providers));
    let _ = writeln!(out, "Usable:          {}", list(&status.available_long_context_providers));
    let _ = writeln!(
        out,
        "Long content:    {}",
        if status.will_skip_long_content { "skipped" } else { "cached" }
    );
    out
}

pub fn render_event(event: &InvalidationEvent) -> String {
    let mut line = format!("Removed {} entries ({})", event.count(), event.reason);
    if event.failures > 0 {
        let _ = write!(line, ", {} failed", event.failures);
    }
    line
}
