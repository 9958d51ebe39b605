//! Plain-text summaries of run and repair reports.

use docket_sync::{RepairReport, RunOutcome, SyncReport};

const MAX_LISTED: usize = 20;

/// Print the terminal condition of a sync run and its totals.
pub fn print_run(outcome: &RunOutcome) {
    println!("=== sync: {} ===", outcome.as_str());
    match outcome.report() {
        Some(report) => print_report(report),
        None => println!("  no cases matched; nothing to do"),
    }
}

fn print_report(r: &SyncReport) {
    println!("Cases");
    row("anchors discovered", r.anchors_discovered);
    row("changed", r.cases_changed);
    row("skipped (unchanged)", r.cases_skipped);
    row("failed extraction", r.cases_failed);
    println!("Documents");
    row("fetched", r.documents_fetched);
    row("recovered on retry", r.documents_recovered);
    row("failed (pruned)", r.documents_failed());
    print_list(
        "Failed documents",
        r.failed_documents
            .iter()
            .map(|d| format!("{}/{}", d.case_id, d.identity)),
    );
}

/// Print the outcome of a repair pass over one stored case.
pub fn print_repair(r: &RepairReport) {
    println!("=== repair: {} ===", r.rol);
    row("documents checked", r.checked);
    row("missing blobs", r.missing);
    row("re-fetched", r.repaired.len());
    row("pulled from case", r.pulled.len());
    print_list("Re-fetched", r.repaired.iter().cloned());
    print_list("Pulled", r.pulled.iter().cloned());
}

fn row(label: &str, value: usize) {
    println!("  {label:<22} {value}");
}

fn print_list(header: &str, items: impl Iterator<Item = String>) {
    let items: Vec<String> = items.collect();
    if items.is_empty() {
        return;
    }
    println!("{header}");
    for item in items.iter().take(MAX_LISTED) {
        println!("  {item}");
    }
    if items.len() > MAX_LISTED {
        println!("  ... and {} more", items.len() - MAX_LISTED);
    }
}
