use colored::Colorize;
use staffsync_protocol::api::{
    ChangeDetectionResponse, RetryResponse, SyncResponse, TimelineProcessResponse,
};
use staffsync_protocol::change::ChangeRecord;
use staffsync_protocol::report::ErrorList;
use staffsync_protocol::timeline::TimelineEvent;

pub fn print_sync(response: &SyncResponse) {
    let summary = &response.result;
    println!(
        "{} {} processed, {} unchanged, {} errored",
        "✔ Sync finished:".green().bold(),
        summary.processed,
        summary.unchanged,
        summary.errored
    );
    println!(
        "  Mode: {} (immediate: {}, queued: {})",
        response.hybrid_processing.mode,
        response.hybrid_processing.immediate,
        response.hybrid_processing.queued
    );
    let collector = &summary.collector;
    println!(
        "  Employees: {} new, {} unchanged",
        collector.employees.new, collector.employees.unchanged
    );
    println!(
        "  Employments: {} new, {} unchanged",
        collector.employments.new, collector.employments.unchanged
    );
    if collector.partial_records > 0 {
        println!("  Partial records: {}", collector.partial_records);
    }
    if let Some(timeline) = &summary.timeline {
        println!(
            "  Timeline: {} events for {} employees",
            timeline.events_created, timeline.employees_with_events
        );
    }
    if let Some(entry_id) = summary.queue_entry_id {
        println!("  Queue entry: {entry_id}");
    }
    print_errors(&collector.errors);
}

pub fn print_retry(response: &RetryResponse) {
    let result = &response.result;
    println!(
        "{} {} processed, {} succeeded, {} failed, {} exhausted",
        "✔ Retry finished:".green().bold(),
        result.processed,
        result.succeeded_retries,
        result.failed_retries,
        result.max_retries_reached
    );
    for detail in &result.details {
        let marker = if detail.success {
            "ok".green()
        } else if detail.terminal || detail.max_retries_reached {
            "gave up".red()
        } else {
            "failed".yellow()
        };
        println!(
            "  {} {}/{} after {} attempts (retry count {})",
            marker, detail.entity_id, detail.endpoint, detail.attempts, detail.retry_count
        );
    }
    if result.queue_signalled {
        println!("  Pending timeline work was signalled");
    }
}

pub fn print_detection(response: &ChangeDetectionResponse) {
    let result = &response.result;
    println!(
        "{} {} changes from {} snapshots in {} ms",
        "✔ Change detection finished:".green().bold(),
        result.total_changes,
        result.snapshots_processed,
        response.duration_ms
    );
    println!(
        "  Salary: {}, hours: {}, contracts: {}, already recorded: {}",
        result.salary_changes, result.hours_changes, result.contract_changes, result.skipped_existing
    );
    print_errors(&result.errors);
}

pub fn print_timeline_run(response: &TimelineProcessResponse) {
    let result = &response.result;
    println!(
        "{} {} events for {} of {} employees",
        "✔ Timeline processed:".green().bold(),
        result.events_created,
        result.employees_with_events,
        result.employees_processed
    );
    print_errors(&result.errors);
}

pub fn print_changes(employee_id: &str, changes: &[ChangeRecord]) {
    if changes.is_empty() {
        println!("No changes recorded for {}", employee_id.bold());
        return;
    }
    println!("{} {}", "Changes for".bold(), employee_id.bold());
    for change in changes {
        let percent = change
            .change_percent
            .map(|value| format!(" ({value:+.1}%)"))
            .unwrap_or_default();
        println!(
            "  {} {:<16} {}{} [{}]",
            change.effective_date,
            change.change_type.as_str(),
            change.field_name,
            percent,
            change.business_impact.as_str()
        );
    }
}

pub fn print_events(employee_id: &str, events: &[TimelineEvent]) {
    if events.is_empty() {
        println!("No timeline events for {}", employee_id.bold());
        return;
    }
    println!("{} {}", "Timeline for".bold(), employee_id.bold());
    for event in events {
        println!("  {} {}", event.event_date, event.event_title.bold());
        println!("    {}", event.event_description);
    }
}

fn print_errors(errors: &ErrorList) {
    if errors.is_empty() {
        return;
    }
    println!("  {} {}", "Errors:".red().bold(), errors.error_count);
    for error in &errors.errors {
        println!("    {}: {}", error.entity_id, error.message);
    }
    let hidden = errors.error_count.saturating_sub(errors.errors.len());
    if hidden > 0 {
        println!("    ... and {hidden} more");
    }
}
