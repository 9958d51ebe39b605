//! Secondary acquisition path for documents whose first fetch failed.
//!
//! Document URLs expire with the extraction session, so a failed download is
//! retried against a fresh materialization of the same anchor: the document
//! is located again by its [`DocumentKey`] and fetched exactly once more.

use std::collections::HashMap;
use std::sync::Arc;

use docket_core::{Anchor, RawAnnex, RawCaseDetail, annex_name, document_name};
use tracing::{info, warn};

use crate::{
    CaseSource, DocumentIngestor, DocumentJob, DocumentKey, ExtractError, FailedDocument,
    FailureCause, FailureLog,
};

/// Jobs rebuilt from a fresh extraction.
#[derive(Debug, Default)]
pub struct Rederived {
    pub jobs: Vec<DocumentJob>,
    /// Wanted documents the fresh extraction no longer lists.
    pub missing: Vec<(String, DocumentKey)>,
}

#[derive(Debug, Default)]
pub struct RecoveryReport {
    pub recovered: Vec<String>,
    pub unresolved: Vec<FailedDocument>,
}

/// Materialize `anchor` again and rebuild a job for every wanted identity.
pub async fn rederive(
    source: &mut dyn CaseSource,
    anchor: &Anchor,
    case_id: &str,
    wanted: Vec<(String, DocumentKey)>,
) -> Result<Rederived, ExtractError> {
    let detail = source.materialize(anchor).await?;
    let mut resolver = Resolver::new(detail);
    let mut out = Rederived::default();
    for (identity, key) in wanted {
        match resolver.url_for(source, &identity, &key).await {
            Some(url) => out.jobs.push(DocumentJob {
                url,
                identity,
                case_id: case_id.to_string(),
                key,
            }),
            None => {
                warn!(
                    case = case_id,
                    identity = %identity,
                    procedure = key.procedure(),
                    description = key.description(),
                    "document no longer listed upstream"
                );
                out.missing.push((identity, key));
            }
        }
    }
    Ok(out)
}

/// Retry each failed document once through a fresh extraction.
///
/// Never fails: anything that cannot be re-derived or fetched again comes
/// back as unresolved with its latest cause.
pub async fn recover(
    source: &mut dyn CaseSource,
    ingestor: &DocumentIngestor,
    anchor: &Anchor,
    failed: Vec<FailedDocument>,
) -> RecoveryReport {
    let mut report = RecoveryReport::default();
    let Some(first) = failed.first() else {
        return report;
    };
    let case_id = first.job.case_id.clone();

    let wanted = failed
        .iter()
        .map(|f| (f.job.identity.clone(), f.job.key.clone()))
        .collect();
    let rederived = match rederive(source, anchor, &case_id, wanted).await {
        Ok(r) => r,
        Err(e) => {
            warn!(case = %case_id, anchor = %anchor, error = %e, "re-extraction failed, recovery skipped");
            report.unresolved = failed;
            return report;
        }
    };

    let mut previous: HashMap<String, FailedDocument> = failed
        .into_iter()
        .map(|f| (f.job.identity.clone(), f))
        .collect();
    for (identity, _) in &rederived.missing {
        if let Some(f) = previous.remove(identity) {
            report.unresolved.push(f);
        }
    }
    if rederived.jobs.is_empty() {
        return report;
    }

    // Retries go through the pool so they keep its batch pacing.
    let retried = rederived.jobs.clone();
    match ingestor.run(rederived.jobs, Arc::new(FailureLog::new())).await {
        Ok(ingest) => {
            for identity in &ingest.stored {
                info!(case = %case_id, identity = %identity, "document recovered");
            }
            for f in &ingest.failed {
                warn!(case = %case_id, identity = %f.job.identity, cause = %f.cause, "retry failed");
            }
            report.recovered = ingest.stored;
            report.unresolved.extend(ingest.failed);
        }
        Err(e) => {
            warn!(case = %case_id, error = %e, "retry pass failed");
            report
                .unresolved
                .extend(retried.into_iter().map(|job| FailedDocument {
                    job,
                    cause: FailureCause::Storage(e.to_string()),
                }));
        }
    }
    report
}

/// Locates documents in a fresh detail view.
struct Resolver {
    detail: RawCaseDetail,
    folders: HashMap<String, Vec<RawAnnex>>,
}

impl Resolver {
    fn new(detail: RawCaseDetail) -> Self {
        Self {
            detail,
            folders: HashMap::new(),
        }
    }

    async fn url_for(
        &mut self,
        source: &mut dyn CaseSource,
        identity: &str,
        key: &DocumentKey,
    ) -> Option<String> {
        match key {
            DocumentKey::Primary {
                procedure,
                description,
                index,
            } => self.primary(identity, procedure, description, *index),
            DocumentKey::Annex {
                procedure,
                description,
                reference,
            } => {
                self.annex(source, identity, procedure, description, reference)
                    .await
            }
        }
    }

    /// Prefer the movement whose derived name matches; movements sharing a
    /// procedure and description otherwise resolve to the first one.
    fn primary(
        &self,
        identity: &str,
        procedure: &str,
        description: &str,
        index: usize,
    ) -> Option<String> {
        let mut fallback = None;
        for m in &self.detail.movements {
            if m.procedure != procedure || m.description != description {
                continue;
            }
            let Some(url) = m.document_urls.get(index) else {
                continue;
            };
            if document_name(&m.procedure, &m.description, m.date, index) == identity {
                return Some(url.clone());
            }
            fallback.get_or_insert_with(|| url.clone());
        }
        fallback
    }

    async fn annex(
        &mut self,
        source: &mut dyn CaseSource,
        identity: &str,
        procedure: &str,
        description: &str,
        reference: &str,
    ) -> Option<String> {
        let folders: Vec<String> = self
            .detail
            .movements
            .iter()
            .filter(|m| m.procedure == procedure && m.description == description)
            .filter_map(|m| m.folder.clone())
            .collect();

        let mut fallback = None;
        for folder in folders {
            if !self.folders.contains_key(&folder) {
                match source.extract_annexes(&folder).await {
                    Ok(rows) => {
                        self.folders.insert(folder.clone(), rows);
                    }
                    Err(e) => {
                        warn!(folder = %folder, error = %e, "annex lookup failed during recovery");
                        continue;
                    }
                }
            }
            let Some(rows) = self.folders.get(&folder) else {
                continue;
            };
            for row in rows {
                if annex_name(procedure, description, row.date, &row.reference) == identity {
                    return Some(row.url.clone());
                }
                if row.reference == reference {
                    fallback.get_or_insert_with(|| row.url.clone());
                }
            }
        }
        fallback
    }
}
