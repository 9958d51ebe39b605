//! Case records shared between the sync pipeline and the stores.
//!
//! Two families of types live here: the persisted shape (`Case`, `Movement`,
//! `Document`, `Annex`, `Litigant`) and the raw shape handed over by the
//! extraction layer (`RawCaseDetail`, `RawMovement`, `RawAnnex`, `ListedCase`),
//! which still carries session-scoped document URLs.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Opaque handle from the extraction layer identifying one case's detail view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Anchor(String);

impl Anchor {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A civil case as persisted, keyed by its docket code (`rol`).
///
/// A case is written wholesale: created on first extraction, replaced when the
/// change detector reports a difference. The only partial update is
/// [`pull_document`](Self::pull_document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub rol: String,
    pub cover: String,
    pub admin_status: String,
    pub process: String,
    pub admission: NaiveDate,
    pub location: String,
    pub stage: String,
    pub process_state: String,
    pub court: String,
    pub movements: Vec<Movement>,
    pub litigants: Vec<Litigant>,
}

impl Case {
    /// Assemble a case from its header fields and an already-named history.
    pub fn from_summary(
        summary: CaseSummary,
        movements: Vec<Movement>,
        litigants: Vec<Litigant>,
    ) -> Self {
        Self {
            rol: summary.rol,
            cover: summary.cover,
            admin_status: summary.admin_status,
            process: summary.process,
            admission: summary.admission,
            location: summary.location,
            stage: summary.stage,
            process_state: summary.process_state,
            court: summary.court,
            movements,
            litigants,
        }
    }

    /// Every document and annex identity referenced by this case, in history order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.movements.iter().flat_map(|m| {
            m.documents.iter().flat_map(|d| {
                std::iter::once(d.name.as_str()).chain(d.annexes.iter().map(|a| a.name.as_str()))
            })
        })
    }

    /// Number of document and annex identities referenced by this case.
    pub fn document_count(&self) -> usize {
        self.identities().count()
    }

    /// Remove every document or annex named `identity`.
    ///
    /// Removing a document drops its annexes with it. Returns how many entries
    /// were removed; zero means the identity was not referenced. Applying the
    /// same pull twice is a no-op the second time.
    pub fn pull_document(&mut self, identity: &str) -> usize {
        let mut removed = 0;
        for movement in &mut self.movements {
            let before = movement.documents.len();
            movement.documents.retain(|d| d.name != identity);
            removed += before - movement.documents.len();

            for document in &mut movement.documents {
                let before = document.annexes.len();
                document.annexes.retain(|a| a.name != identity);
                removed += before - document.annexes.len();
            }
        }
        removed
    }
}

/// Header fields of a case detail view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseSummary {
    pub rol: String,
    pub cover: String,
    pub admin_status: String,
    pub process: String,
    #[serde(with = "crate::date::flexible")]
    pub admission: NaiveDate,
    pub location: String,
    pub stage: String,
    pub process_state: String,
    pub court: String,
    /// Sub-docket label selected when the detail was read; copied onto each movement.
    #[serde(default)]
    pub book: String,
}

/// One procedural entry in a case's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub invoice: String,
    pub stage: String,
    pub procedure: String,
    pub description: String,
    pub date: NaiveDate,
    pub page: u32,
    pub book: String,
    pub documents: Vec<Document>,
}

/// A filing attached to a movement, identified by its deterministic name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    /// Position of the source URL within the movement's document list.
    pub index: usize,
    #[serde(default)]
    pub annexes: Vec<Annex>,
}

/// A secondary filing discovered through a movement's folder lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annex {
    pub name: String,
    pub reference: String,
    pub date: NaiveDate,
}

/// A party to a case. Natural key is `(rut, participant)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Litigant {
    pub participant: String,
    pub rut: String,
    pub person: String,
    pub name: String,
}

/// Detail view materialized by the extraction layer for one anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCaseDetail {
    pub summary: CaseSummary,
    pub movements: Vec<RawMovement>,
    pub litigants: Vec<Litigant>,
}

/// A history row as read from the source, before document naming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMovement {
    pub invoice: String,
    pub stage: String,
    pub procedure: String,
    pub description: String,
    #[serde(with = "crate::date::flexible")]
    pub date: NaiveDate,
    pub page: u32,
    /// Session-scoped download URLs, in source order.
    #[serde(default)]
    pub document_urls: Vec<String>,
    /// Folder reference; present only when the row exposes nested annexes.
    #[serde(default)]
    pub folder: Option<String>,
}

/// An annex row returned by a folder lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnnex {
    pub url: String,
    #[serde(with = "crate::date::flexible")]
    pub date: NaiveDate,
    pub reference: String,
}

/// One row of a listing feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListedCase {
    pub anchor: Anchor,
    pub rol: String,
    #[serde(default)]
    pub court: String,
    #[serde(default)]
    pub cover: String,
    #[serde(with = "crate::date::flexible")]
    pub admission: NaiveDate,
    #[serde(default)]
    pub book: String,
}

/// Most recently admitted case already persisted for a listing feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWatermark {
    pub rol: String,
    pub admission: NaiveDate,
}

impl SyncWatermark {
    pub fn of(case: &Case) -> Self {
        Self {
            rol: case.rol.clone(),
            admission: case.admission,
        }
    }
}

/// Result of fetching one artifact. Never persisted directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Success(Vec<u8>),
    Failure(u16),
}

impl FetchOutcome {
    /// Classify a response: only status 200 counts as success.
    pub fn from_response(status: u16, bytes: Vec<u8>) -> Self {
        if status == 200 {
            Self::Success(bytes)
        } else {
            Self::Failure(status)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn case_with_documents() -> Case {
        Case {
            rol: "C-2622-2024".into(),
            cover: "BANCO / PEREZ".into(),
            admin_status: "Sin archivar".into(),
            process: "Ejecutivo".into(),
            admission: date(2024, 3, 4),
            location: "Digital".into(),
            stage: "Notificacion".into(),
            process_state: "Tramitacion".into(),
            court: "1 Juzgado Civil".into(),
            movements: vec![
                Movement {
                    invoice: "1".into(),
                    stage: "Ingreso".into(),
                    procedure: "Escrito".into(),
                    description: "Demanda".into(),
                    date: date(2024, 3, 4),
                    page: 1,
                    book: "Principal".into(),
                    documents: vec![
                        Document {
                            name: "escrito_demanda_240304_0".into(),
                            index: 0,
                            annexes: vec![Annex {
                                name: "escrito_demanda_240305_poder_anexo".into(),
                                reference: "Poder".into(),
                                date: date(2024, 3, 5),
                            }],
                        },
                        Document {
                            name: "escrito_demanda_240304_1".into(),
                            index: 1,
                            annexes: vec![],
                        },
                    ],
                },
                Movement {
                    invoice: "2".into(),
                    stage: "Ingreso".into(),
                    procedure: "Resolucion".into(),
                    description: "Provee demanda".into(),
                    date: date(2024, 3, 6),
                    page: 2,
                    book: "Principal".into(),
                    documents: vec![Document {
                        name: "resolucion_provee_demanda_240306_0".into(),
                        index: 0,
                        annexes: vec![],
                    }],
                },
            ],
            litigants: vec![],
        }
    }

    #[test]
    fn identities_include_annexes_in_history_order() {
        let case = case_with_documents();
        let ids: Vec<&str> = case.identities().collect();
        assert_eq!(
            ids,
            vec![
                "escrito_demanda_240304_0",
                "escrito_demanda_240305_poder_anexo",
                "escrito_demanda_240304_1",
                "resolucion_provee_demanda_240306_0",
            ]
        );
        assert_eq!(case.document_count(), 4);
    }

    #[test]
    fn pull_document_removes_primary_with_its_annexes() {
        let mut case = case_with_documents();
        assert_eq!(case.pull_document("escrito_demanda_240304_0"), 1);
        assert_eq!(case.document_count(), 2);
        assert!(!case.identities().any(|id| id.ends_with("_anexo")));
    }

    #[test]
    fn pull_document_removes_annex_only() {
        let mut case = case_with_documents();
        assert_eq!(case.pull_document("escrito_demanda_240305_poder_anexo"), 1);
        assert_eq!(case.movements[0].documents.len(), 2);
        assert!(case.movements[0].documents[0].annexes.is_empty());
    }

    #[test]
    fn pull_document_is_idempotent() {
        let mut case = case_with_documents();
        case.pull_document("resolucion_provee_demanda_240306_0");
        let after_first = case.clone();
        assert_eq!(case.pull_document("resolucion_provee_demanda_240306_0"), 0);
        assert_eq!(case, after_first);
    }

    #[test]
    fn case_json_keeps_dates_at_day_granularity() {
        let case = case_with_documents();
        let json = serde_json::to_string(&case).unwrap();
        assert!(json.contains("\"admission\":\"2024-03-04\""));
        let parsed: Case = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, case);
    }

    #[test]
    fn raw_movement_defaults_missing_documents_and_folder() {
        let json = r#"{
            "invoice": "3",
            "stage": "Prueba",
            "procedure": "Actuacion",
            "description": "Certificacion",
            "date": "01/04/2024 11:20",
            "page": 7
        }"#;
        let raw: RawMovement = serde_json::from_str(json).unwrap();
        assert!(raw.document_urls.is_empty());
        assert!(raw.folder.is_none());
        assert_eq!(raw.date, date(2024, 4, 1));
    }

    #[test]
    fn fetch_outcome_only_200_succeeds() {
        assert_eq!(
            FetchOutcome::from_response(200, vec![1, 2]),
            FetchOutcome::Success(vec![1, 2])
        );
        assert_eq!(
            FetchOutcome::from_response(204, vec![]),
            FetchOutcome::Failure(204)
        );
        assert_eq!(
            FetchOutcome::from_response(404, vec![]),
            FetchOutcome::Failure(404)
        );
    }

    #[test]
    fn watermark_of_case() {
        let case = case_with_documents();
        let wm = SyncWatermark::of(&case);
        assert_eq!(wm.rol, "C-2622-2024");
        assert_eq!(wm.admission, date(2024, 3, 4));
    }
}
