//! Reconciliation of upstream cases into the local stores.
//!
//! Per case: `Discovered → DetailExtracted → Diffed → DocumentsEnumerated →
//! DocumentsFetched → Finalized`. Extraction runs strictly one case at a time
//! against the single upstream session; only document fetches fan out.

use std::collections::HashSet;
use std::sync::Arc;

use docket_core::{Anchor, Diff, ListedCase, PaginationCursor, classify, page_indices};
use docket_store::CaseStore;
use tracing::{debug, info, warn};

use crate::enumerate::{Enumerated, enumerate, stored_keys};
use crate::ingest::{FailureHandler, FailureLog, StorePull};
use crate::recovery::{recover, rederive};
use crate::{CaseSource, DocumentIngestor, SyncConfig, SyncError};

/// A document that ended a run without a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentRef {
    pub case_id: String,
    pub identity: String,
}

/// Totals for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub anchors_discovered: usize,
    pub cases_changed: usize,
    pub cases_skipped: usize,
    /// Cases whose extraction failed and were left untouched.
    pub cases_failed: usize,
    pub documents_fetched: usize,
    /// Documents stored on the recovery retry; included in `documents_fetched`.
    pub documents_recovered: usize,
    /// Documents pruned from their case because no blob could be stored.
    pub failed_documents: Vec<DocumentRef>,
}

impl SyncReport {
    pub fn documents_failed(&self) -> usize {
        self.failed_documents.len()
    }

    fn tally(&mut self, outcome: CaseOutcome) {
        match outcome {
            CaseOutcome::Unchanged { .. } => self.cases_skipped += 1,
            CaseOutcome::Written {
                rol,
                fetched,
                recovered,
                pruned,
                ..
            } => {
                self.cases_changed += 1;
                self.documents_fetched += fetched + recovered;
                self.documents_recovered += recovered;
                self.failed_documents
                    .extend(pruned.into_iter().map(|identity| DocumentRef {
                        case_id: rol.clone(),
                        identity,
                    }));
            }
        }
    }
}

/// Terminal condition of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(SyncReport),
    /// Some document or case could not be acquired.
    PartialFailure(SyncReport),
    /// Anchors were found but nothing changed upstream.
    NoNewData(SyncReport),
    /// Discovery returned nothing; no case was looked at.
    NoAnchors,
}

impl RunOutcome {
    fn from_report(report: SyncReport) -> Self {
        if report.anchors_discovered == 0 {
            Self::NoAnchors
        } else if !report.failed_documents.is_empty() || report.cases_failed > 0 {
            Self::PartialFailure(report)
        } else if report.cases_changed == 0 {
            Self::NoNewData(report)
        } else {
            Self::Completed(report)
        }
    }

    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(r) | Self::PartialFailure(r) | Self::NoNewData(r) => Some(r),
            Self::NoAnchors => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed(_) => "completed",
            Self::PartialFailure(_) => "partial failure",
            Self::NoNewData(_) => "no new data",
            Self::NoAnchors => "no anchors",
        }
    }
}

/// What happened to one case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaseOutcome {
    Unchanged {
        rol: String,
    },
    Written {
        rol: String,
        diff: Diff,
        fetched: usize,
        recovered: usize,
        pruned: Vec<String>,
    },
}

/// Result of checking a stored case's blobs and re-acquiring missing ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    pub rol: String,
    pub checked: usize,
    pub missing: usize,
    pub repaired: Vec<String>,
    /// Identities removed from the stored case.
    pub pulled: Vec<String>,
}

/// Drives discovery, diffing, ingestion and persistence.
pub struct Reconciler {
    source: Box<dyn CaseSource>,
    store: Arc<dyn CaseStore>,
    ingestor: DocumentIngestor,
    config: SyncConfig,
}

impl Reconciler {
    pub fn new(
        source: Box<dyn CaseSource>,
        store: Arc<dyn CaseStore>,
        ingestor: DocumentIngestor,
        config: SyncConfig,
    ) -> Self {
        Self {
            source,
            store,
            ingestor,
            config,
        }
    }

    /// Walk the listing feed until it catches up with the stored watermark,
    /// then reconcile every collected case.
    ///
    /// An extraction failure skips that case only.
    pub async fn sync_listing(&mut self) -> Result<RunOutcome, SyncError> {
        let cursor = PaginationCursor::new(self.store.watermark().await?);
        match cursor.watermark() {
            Some(wm) => info!(rol = %wm.rol, admission = %wm.admission, "listing sync from watermark"),
            None => info!("listing sync without watermark"),
        }

        let total = self
            .source
            .total_items()
            .await
            .map_err(SyncError::Discovery)?;
        let pages = page_indices(total, self.config.page_size);
        info!(total, pages = pages.len(), "listing size");

        let mut rows: Vec<ListedCase> = Vec::new();
        for page in pages {
            let batch = self
                .source
                .read_page(page, self.config.page_size)
                .await
                .map_err(SyncError::Discovery)?;
            let decision = cursor.decide(&batch);
            debug!(
                page,
                rows = batch.len(),
                continue_paging = decision.continue_paging,
                newer = decision.new_records.len(),
                "page read"
            );
            if decision.continue_paging {
                rows.extend(batch);
            } else {
                rows.extend(decision.new_records);
                info!(page, "listing caught up with watermark");
                break;
            }
        }

        let mut seen = HashSet::new();
        let anchors: Vec<Anchor> = rows
            .into_iter()
            .filter(|row| seen.insert(row.anchor.clone()))
            .map(|row| row.anchor)
            .collect();
        self.reconcile_all(anchors, true).await
    }

    /// Look up one docket code and reconcile what it resolves to.
    ///
    /// An extraction failure aborts the run.
    pub async fn sync_case(&mut self, rol: &str) -> Result<RunOutcome, SyncError> {
        let anchors = self
            .source
            .discover_anchors(rol)
            .await
            .map_err(SyncError::Discovery)?;
        self.reconcile_all(anchors, false).await
    }

    /// Check every document of a stored case against blob storage, re-fetch
    /// the missing ones from a fresh extraction and pull whatever cannot be
    /// acquired.
    pub async fn repair_case(&mut self, rol: &str) -> Result<RepairReport, SyncError> {
        let case = self
            .store
            .find(rol)
            .await?
            .ok_or_else(|| SyncError::UnknownCase(rol.to_string()))?;

        let keys = stored_keys(&case);
        let mut report = RepairReport {
            rol: rol.to_string(),
            checked: keys.len(),
            ..RepairReport::default()
        };
        let mut missing = Vec::new();
        for (identity, key) in keys {
            if !self.ingestor.blobs().exists(rol, &identity).await? {
                missing.push((identity, key));
            }
        }
        report.missing = missing.len();
        if missing.is_empty() {
            info!(rol, checked = report.checked, "all documents present");
            return Ok(report);
        }
        info!(rol, missing = report.missing, "repairing case");

        let anchors = self
            .source
            .discover_anchors(rol)
            .await
            .map_err(SyncError::Discovery)?;
        let (jobs, unresolved) = match anchors.first() {
            Some(anchor) => {
                match rederive(self.source.as_mut(), anchor, rol, missing.clone()).await {
                    Ok(r) => (r.jobs, r.missing),
                    Err(e) => {
                        warn!(rol, error = %e, "re-extraction failed, pulling missing documents");
                        (Vec::new(), missing)
                    }
                }
            }
            None => {
                warn!(rol, "case no longer listed upstream, pulling missing documents");
                (Vec::new(), missing)
            }
        };

        let handler = Arc::new(StorePull::new(Arc::clone(&self.store)));
        let ingest = self.ingestor.run(jobs, handler.clone()).await?;
        for (identity, _) in &unresolved {
            handler.on_failure(rol, identity).await?;
        }

        report.repaired = ingest.stored;
        report.pulled = ingest
            .failed
            .into_iter()
            .map(|f| f.job.identity)
            .chain(unresolved.into_iter().map(|(identity, _)| identity))
            .collect();
        info!(
            rol,
            repaired = report.repaired.len(),
            pulled = report.pulled.len(),
            "repair finished"
        );
        Ok(report)
    }

    async fn reconcile_all(
        &mut self,
        anchors: Vec<Anchor>,
        isolate_failures: bool,
    ) -> Result<RunOutcome, SyncError> {
        if anchors.is_empty() {
            info!("no anchors found, nothing to do");
            return Ok(RunOutcome::NoAnchors);
        }
        info!(anchors = anchors.len(), "anchors discovered");

        let mut report = SyncReport {
            anchors_discovered: anchors.len(),
            ..SyncReport::default()
        };
        for anchor in &anchors {
            match self.reconcile(anchor).await {
                Ok(outcome) => report.tally(outcome),
                Err(SyncError::Extraction { anchor, source }) if isolate_failures => {
                    warn!(anchor = %anchor, error = %source, "case extraction failed, skipping");
                    report.cases_failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let outcome = RunOutcome::from_report(report);
        if let Some(r) = outcome.report() {
            info!(
                outcome = outcome.as_str(),
                anchors = r.anchors_discovered,
                changed = r.cases_changed,
                skipped = r.cases_skipped,
                failed_cases = r.cases_failed,
                fetched = r.documents_fetched,
                failed_documents = r.documents_failed(),
                "run finished"
            );
        }
        Ok(outcome)
    }

    /// Take one anchor through to `Finalized`.
    async fn reconcile(&mut self, anchor: &Anchor) -> Result<CaseOutcome, SyncError> {
        let detail = self
            .source
            .materialize(anchor)
            .await
            .map_err(|e| SyncError::extraction(anchor, e))?;
        let rol = detail.summary.rol.clone();

        let persisted = self.store.find(&rol).await?;
        let diff = classify(persisted.as_ref(), &detail.movements, &detail.litigants);
        info!(rol = %rol, diff = diff.as_str(), "case diffed");
        if diff == Diff::Unchanged {
            return Ok(CaseOutcome::Unchanged { rol });
        }

        let Enumerated { mut case, jobs } = enumerate(self.source.as_mut(), detail)
            .await
            .map_err(|e| SyncError::extraction(anchor, e))?;

        let failures = Arc::new(FailureLog::new());
        let ingest = self.ingestor.run(jobs, failures.clone()).await?;
        let fetched = ingest.stored.len();

        let mut recovered = Vec::new();
        if self.config.recovery && !ingest.failed.is_empty() {
            let retry = recover(self.source.as_mut(), &self.ingestor, anchor, ingest.failed).await;
            for identity in &retry.recovered {
                failures.resolve(&rol, identity);
            }
            recovered = retry.recovered;
        }

        let pruned = failures.identities(&rol);
        for identity in &pruned {
            case.pull_document(identity);
            warn!(rol = %rol, identity = %identity, "pruned document without blob");
        }

        if persisted.is_some() {
            self.store.replace(&rol, &case).await?;
        } else {
            self.store.insert(&case).await?;
        }
        info!(
            rol = %rol,
            diff = diff.as_str(),
            documents = case.document_count(),
            fetched,
            recovered = recovered.len(),
            pruned = pruned.len(),
            "case finalized"
        );

        Ok(CaseOutcome::Written {
            rol,
            diff,
            fetched,
            recovered: recovered.len(),
            pruned,
        })
    }
}
