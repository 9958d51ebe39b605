//! Change detection between a persisted case and a fresh extraction.
//!
//! Movements are compared position by position (the source keeps invoice
//! order stable across runs); litigants are compared as a multiset keyed by
//! `rut`. Document URLs never take part: they are session-scoped, and
//! artifact identity is settled later by the naming scheme.
//!
//! A backdated entry inserted mid-history shifts every later position and is
//! reported as a change of the whole case.

use chrono::NaiveDate;

use crate::model::{Case, Litigant, Movement, RawMovement};

/// Fields of a history row that take part in change detection.
pub trait HistoryEntry {
    fn invoice(&self) -> &str;
    fn stage(&self) -> &str;
    fn procedure(&self) -> &str;
    fn description(&self) -> &str;
    fn date(&self) -> NaiveDate;
    fn page(&self) -> u32;
}

impl HistoryEntry for Movement {
    fn invoice(&self) -> &str {
        &self.invoice
    }
    fn stage(&self) -> &str {
        &self.stage
    }
    fn procedure(&self) -> &str {
        &self.procedure
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn page(&self) -> u32 {
        self.page
    }
}

impl HistoryEntry for RawMovement {
    fn invoice(&self) -> &str {
        &self.invoice
    }
    fn stage(&self) -> &str {
        &self.stage
    }
    fn procedure(&self) -> &str {
        &self.procedure
    }
    fn description(&self) -> &str {
        &self.description
    }
    fn date(&self) -> NaiveDate {
        self.date
    }
    fn page(&self) -> u32 {
        self.page
    }
}

/// Outcome of comparing a fresh extraction against the stored case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diff {
    /// No stored case for this docket code.
    New,
    /// Stored case exists and differs; it will be replaced wholesale.
    Changed,
    /// Stored case matches; no document or persistence work is needed.
    Unchanged,
}

impl Diff {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Changed => "changed",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Classify a fresh history and litigant list against the stored case.
pub fn classify<M: HistoryEntry>(
    persisted: Option<&Case>,
    movements: &[M],
    litigants: &[Litigant],
) -> Diff {
    let Some(case) = persisted else {
        return Diff::New;
    };
    if movements_differ(&case.movements, movements) || litigants_differ(&case.litigants, litigants)
    {
        Diff::Changed
    } else {
        Diff::Unchanged
    }
}

/// `true` when the case is new or differs from the stored one.
pub fn has_changes<M: HistoryEntry>(
    persisted: Option<&Case>,
    movements: &[M],
    litigants: &[Litigant],
) -> bool {
    classify(persisted, movements, litigants) != Diff::Unchanged
}

/// Positional comparison of two histories.
pub fn movements_differ<A: HistoryEntry, B: HistoryEntry>(stored: &[A], fresh: &[B]) -> bool {
    if stored.len() != fresh.len() {
        return true;
    }
    stored.iter().zip(fresh).any(|(a, b)| {
        a.invoice() != b.invoice()
            || a.stage() != b.stage()
            || a.procedure() != b.procedure()
            || a.description() != b.description()
            || a.date() != b.date()
            || a.page() != b.page()
    })
}

/// Order-independent comparison of two litigant lists, matched by `rut`.
///
/// Person type and name are compared; the participant role is not.
pub fn litigants_differ(stored: &[Litigant], fresh: &[Litigant]) -> bool {
    if stored.len() != fresh.len() {
        return true;
    }
    let key = |l: &&Litigant| (l.rut.clone(), l.person.clone(), l.name.clone());
    let mut a: Vec<&Litigant> = stored.iter().collect();
    let mut b: Vec<&Litigant> = fresh.iter().collect();
    a.sort_by_key(key);
    b.sort_by_key(key);

    a.iter()
        .zip(&b)
        .any(|(x, y)| x.rut != y.rut || x.person != y.person || x.name != y.name)
}
