//! Document enumeration: pair every source URL with its deterministic name.

use std::collections::HashSet;

use docket_core::{Annex, Case, Document, Movement, RawCaseDetail, annex_name, document_name};
use tracing::{debug, warn};

use crate::{CaseSource, ExtractError};

/// Logical position of a document within a case, stable across sessions.
///
/// URLs are session-scoped; the key is what lets a later extraction find the
/// same document again.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentKey {
    Primary {
        procedure: String,
        description: String,
        index: usize,
    },
    Annex {
        procedure: String,
        description: String,
        reference: String,
    },
}

impl DocumentKey {
    pub fn procedure(&self) -> &str {
        match self {
            Self::Primary { procedure, .. } | Self::Annex { procedure, .. } => procedure,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Primary { description, .. } | Self::Annex { description, .. } => description,
        }
    }
}

/// One artifact to fetch and store under `{case_id}/{identity}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentJob {
    pub url: String,
    pub identity: String,
    pub case_id: String,
    pub key: DocumentKey,
}

/// A case with document names substituted for URLs, plus the fetch work.
#[derive(Debug, Clone)]
pub struct Enumerated {
    pub case: Case,
    pub jobs: Vec<DocumentJob>,
}

/// Name every document and annex of a freshly extracted case.
///
/// Annexes are looked up through the movement's folder and attached to its
/// first document. Identities repeated within the case yield one job.
pub async fn enumerate(
    source: &mut dyn CaseSource,
    detail: RawCaseDetail,
) -> Result<Enumerated, ExtractError> {
    let rol = detail.summary.rol.clone();
    let book = detail.summary.book.clone();
    let mut jobs = Jobs::new(&rol);
    let mut movements = Vec::with_capacity(detail.movements.len());

    for raw in detail.movements {
        let mut documents = Vec::with_capacity(raw.document_urls.len());
        for (index, url) in raw.document_urls.iter().enumerate() {
            let name = document_name(&raw.procedure, &raw.description, raw.date, index);
            jobs.push(
                url,
                &name,
                DocumentKey::Primary {
                    procedure: raw.procedure.clone(),
                    description: raw.description.clone(),
                    index,
                },
            );
            documents.push(Document {
                name,
                index,
                annexes: Vec::new(),
            });
        }

        if let Some(folder) = raw.folder.as_deref() {
            match documents.first_mut() {
                None => warn!(
                    rol = %rol,
                    invoice = %raw.invoice,
                    folder,
                    "folder on a movement without documents, skipping annexes"
                ),
                Some(primary) => {
                    for annex in source.extract_annexes(folder).await? {
                        let name = annex_name(
                            &raw.procedure,
                            &raw.description,
                            annex.date,
                            &annex.reference,
                        );
                        jobs.push(
                            &annex.url,
                            &name,
                            DocumentKey::Annex {
                                procedure: raw.procedure.clone(),
                                description: raw.description.clone(),
                                reference: annex.reference.clone(),
                            },
                        );
                        primary.annexes.push(Annex {
                            name,
                            reference: annex.reference,
                            date: annex.date,
                        });
                    }
                }
            }
        }

        movements.push(Movement {
            invoice: raw.invoice,
            stage: raw.stage,
            procedure: raw.procedure,
            description: raw.description,
            date: raw.date,
            page: raw.page,
            book: book.clone(),
            documents,
        });
    }

    let case = Case::from_summary(detail.summary, movements, detail.litigants);
    debug!(rol = %rol, documents = jobs.jobs.len(), "documents enumerated");
    Ok(Enumerated {
        case,
        jobs: jobs.jobs,
    })
}

/// Keys of every document and annex referenced by a stored case.
pub fn stored_keys(case: &Case) -> Vec<(String, DocumentKey)> {
    let mut keys = Vec::new();
    for movement in &case.movements {
        for document in &movement.documents {
            keys.push((
                document.name.clone(),
                DocumentKey::Primary {
                    procedure: movement.procedure.clone(),
                    description: movement.description.clone(),
                    index: document.index,
                },
            ));
            for annex in &document.annexes {
                keys.push((
                    annex.name.clone(),
                    DocumentKey::Annex {
                        procedure: movement.procedure.clone(),
                        description: movement.description.clone(),
                        reference: annex.reference.clone(),
                    },
                ));
            }
        }
    }
    keys
}

struct Jobs<'a> {
    case_id: &'a str,
    seen: HashSet<String>,
    jobs: Vec<DocumentJob>,
}

impl<'a> Jobs<'a> {
    fn new(case_id: &'a str) -> Self {
        Self {
            case_id,
            seen: HashSet::new(),
            jobs: Vec::new(),
        }
    }

    fn push(&mut self, url: &str, identity: &str, key: DocumentKey) {
        if !self.seen.insert(identity.to_string()) {
            debug!(case = self.case_id, identity, "duplicate identity, fetching once");
            return;
        }
        self.jobs.push(DocumentJob {
            url: url.to_string(),
            identity: identity.to_string(),
            case_id: self.case_id.to_string(),
            key,
        });
    }
}
