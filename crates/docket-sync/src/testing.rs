//! Scripted collaborators shared by the sync tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use docket_core::{
    Anchor, Annex, Case, CaseSummary, Document, ListedCase, Litigant, Movement, RawAnnex,
    RawCaseDetail, RawMovement,
};

use crate::{CaseSource, DocumentJob, DocumentKey, ExtractError, FetchError, FetchResponse, Fetcher};

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn movement(
    invoice: &str,
    stage: &str,
    procedure: &str,
    description: &str,
    date: NaiveDate,
    urls: &[&str],
) -> RawMovement {
    RawMovement {
        invoice: invoice.into(),
        stage: stage.into(),
        procedure: procedure.into(),
        description: description.into(),
        date,
        page: invoice.parse().unwrap_or(1),
        document_urls: urls.iter().map(|u| u.to_string()).collect(),
        folder: None,
    }
}

pub fn detail(rol: &str, movements: Vec<RawMovement>) -> RawCaseDetail {
    detail_admitted(rol, d(2024, 3, 4), movements)
}

pub fn detail_admitted(rol: &str, admission: NaiveDate, movements: Vec<RawMovement>) -> RawCaseDetail {
    RawCaseDetail {
        summary: CaseSummary {
            rol: rol.into(),
            cover: "BANCO / PEREZ".into(),
            admin_status: "Sin archivar".into(),
            process: "Ejecutivo".into(),
            admission,
            location: "Digital".into(),
            stage: "Ingreso".into(),
            process_state: "Tramitacion".into(),
            court: "1 Juzgado Civil de Santiago".into(),
            book: "Principal".into(),
        },
        movements,
        litigants: vec![Litigant {
            participant: "DTE.".into(),
            rut: "97.004.000-5".into(),
            person: "Juridica".into(),
            name: "BANCO".into(),
        }],
    }
}

pub fn listed(anchor: &str, rol: &str, admission: NaiveDate) -> ListedCase {
    ListedCase {
        anchor: Anchor::new(anchor),
        rol: rol.into(),
        court: "1 Juzgado Civil de Santiago".into(),
        cover: "BANCO / PEREZ".into(),
        admission,
        book: "Principal".into(),
    }
}

pub fn job(case_id: &str, identity: &str) -> DocumentJob {
    DocumentJob {
        url: format!("url/{identity}"),
        identity: identity.into(),
        case_id: case_id.into(),
        key: DocumentKey::Primary {
            procedure: "Escrito".into(),
            description: "Demanda".into(),
            index: 0,
        },
    }
}

pub fn stored_case_with_annex() -> Case {
    Case {
        rol: "C-1-2024".into(),
        cover: "BANCO / PEREZ".into(),
        admin_status: "Sin archivar".into(),
        process: "Ejecutivo".into(),
        admission: d(2024, 3, 4),
        location: "Digital".into(),
        stage: "Ingreso".into(),
        process_state: "Tramitacion".into(),
        court: "1 Juzgado Civil de Santiago".into(),
        movements: vec![Movement {
            invoice: "1".into(),
            stage: "Ingreso".into(),
            procedure: "Escrito".into(),
            description: "Demanda".into(),
            date: d(2024, 3, 4),
            page: 1,
            book: "Principal".into(),
            documents: vec![
                Document {
                    name: "escrito_demanda_240304_0".into(),
                    index: 0,
                    annexes: vec![Annex {
                        name: "escrito_demanda_240305_poder_anexo".into(),
                        reference: "Poder".into(),
                        date: d(2024, 3, 5),
                    }],
                },
                Document {
                    name: "escrito_demanda_240304_1".into(),
                    index: 1,
                    annexes: vec![],
                },
            ],
        }],
        litigants: vec![],
    }
}

/// In-memory extraction collaborator with call counters.
///
/// With `session_urls` set, every materialization tags document and annex
/// URLs with `?session=N`, mimicking the source's session-scoped links.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    pub listing: Vec<ListedCase>,
    pub details: HashMap<String, RawCaseDetail>,
    pub annexes: HashMap<String, Vec<RawAnnex>>,
    pub lookups: HashMap<String, Vec<Anchor>>,
    pub failing: HashSet<String>,
    pub session_urls: bool,
    pub pages_read: Vec<u32>,
    pub materializations: usize,
    pub annex_lookups: usize,
}

impl ScriptedSource {
    pub fn with_detail(mut self, anchor: &str, detail: RawCaseDetail) -> Self {
        self.details.insert(anchor.into(), detail);
        self
    }

    fn session(&self) -> String {
        format!("?session={}", self.materializations)
    }
}

#[async_trait]
impl CaseSource for ScriptedSource {
    async fn total_items(&mut self) -> Result<usize, ExtractError> {
        Ok(self.listing.len())
    }

    async fn read_page(
        &mut self,
        page: u32,
        page_size: usize,
    ) -> Result<Vec<ListedCase>, ExtractError> {
        self.pages_read.push(page);
        let start = (page as usize - 1) * page_size;
        Ok(self
            .listing
            .iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn discover_anchors(&mut self, rol: &str) -> Result<Vec<Anchor>, ExtractError> {
        Ok(self.lookups.get(rol).cloned().unwrap_or_default())
    }

    async fn materialize(&mut self, anchor: &Anchor) -> Result<RawCaseDetail, ExtractError> {
        self.materializations += 1;
        if self.failing.contains(anchor.as_str()) {
            return Err(ExtractError::Other(format!("detail view timed out for {anchor}")));
        }
        let mut detail = self
            .details
            .get(anchor.as_str())
            .cloned()
            .ok_or_else(|| ExtractError::UnknownAnchor(anchor.to_string()))?;
        if self.session_urls {
            let tag = self.session();
            for m in &mut detail.movements {
                for url in &mut m.document_urls {
                    url.push_str(&tag);
                }
            }
        }
        Ok(detail)
    }

    async fn extract_annexes(&mut self, folder: &str) -> Result<Vec<RawAnnex>, ExtractError> {
        self.annex_lookups += 1;
        let mut annexes =
            self.annexes
                .get(folder)
                .cloned()
                .ok_or_else(|| ExtractError::Annexes {
                    folder: folder.into(),
                    reason: "folder not found".into(),
                })?;
        if self.session_urls {
            let tag = self.session();
            for annex in &mut annexes {
                annex.url.push_str(&tag);
            }
        }
        Ok(annexes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scripted {
    Status(u16),
    Transport,
    Panic,
}

/// Fetcher answering 200 with the URL as body unless scripted otherwise.
///
/// Scripts match the exact URL first, then the URL without its query.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Scripted>>,
    calls: Mutex<Vec<String>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(&self, url: &str, response: Scripted) {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), response);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn scripted(&self, url: &str) -> Option<Scripted> {
        let scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        let base = url.split('?').next().unwrap_or(url);
        scripts.get(url).or_else(|| scripts.get(base)).copied()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
        let scripted = self.scripted(url);
        if scripted == Some(Scripted::Panic) {
            panic!("scripted panic for {url}");
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match scripted {
            Some(Scripted::Status(status)) => Ok(FetchResponse::status(status)),
            Some(Scripted::Transport) => Err(FetchError::Transport("connection reset".into())),
            _ => Ok(FetchResponse::ok(url.as_bytes().to_vec())),
        }
    }
}
