//! Deterministic artifact names for case documents.
//!
//! Names are derived from movement metadata only, never from content or
//! randomness, so two syncs over the same source data agree on them. That is
//! what lets a re-run recognise already-stored files and lets a failed fetch
//! be repaired by pulling the name from the stored case.
//!
//! # Layout
//!
//! - Primary document: `{procedure}_{description}_{yyMMdd}_{index}`
//! - Annex: `{procedure}_{description}_{yyMMdd}_{reference}_anexo`
//!
//! Each label is normalised with [`normalize_label`].

use chrono::NaiveDate;

use crate::date::yymmdd;

/// Literal suffix distinguishing annexes from primary documents.
pub const ANNEX_SUFFIX: &str = "anexo";

/// Normalise a free-text label into a path-safe name segment.
///
/// 1. Trim and lowercase.
/// 2. Fold Latin diacritics onto their base letter (`á` → `a`, `ñ` → `n`, `ø` → `o`).
/// 3. Replace whitespace and anything outside `[a-z0-9._,()-]` with `_`.
///
/// Each whitespace character maps to its own `_`; runs are not collapsed.
pub fn normalize_label(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(fold_diacritic)
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | ',' | '(' | ')' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Fold accented Latin-1 and Latin Extended-A letters onto their base
/// letter. Anything else, ligatures included, is returned unchanged and
/// ends up as `_`.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' | 'ā' | 'ă' | 'ą' => 'a',
        'ç' | 'ć' | 'ĉ' | 'ċ' | 'č' => 'c',
        'ď' | 'đ' => 'd',
        'é' | 'è' | 'ë' | 'ê' | 'ē' | 'ĕ' | 'ė' | 'ę' | 'ě' => 'e',
        'ĝ' | 'ğ' | 'ġ' | 'ģ' => 'g',
        'ĥ' | 'ħ' => 'h',
        'í' | 'ì' | 'ï' | 'î' | 'ĩ' | 'ī' | 'ĭ' | 'į' | 'ı' => 'i',
        'ĵ' => 'j',
        'ķ' => 'k',
        'ĺ' | 'ļ' | 'ľ' | 'ŀ' | 'ł' => 'l',
        'ñ' | 'ń' | 'ņ' | 'ň' => 'n',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' | 'ø' | 'ō' | 'ŏ' | 'ő' => 'o',
        'ŕ' | 'ŗ' | 'ř' => 'r',
        'ś' | 'ŝ' | 'ş' | 'š' => 's',
        'ţ' | 'ť' | 'ŧ' => 't',
        'ú' | 'ù' | 'ü' | 'û' | 'ũ' | 'ū' | 'ŭ' | 'ů' | 'ű' | 'ų' => 'u',
        'ŵ' => 'w',
        'ý' | 'ÿ' | 'ŷ' => 'y',
        'ź' | 'ż' | 'ž' => 'z',
        other => other,
    }
}

/// Name of the `index`-th primary document of a movement.
pub fn document_name(procedure: &str, description: &str, date: NaiveDate, index: usize) -> String {
    format!(
        "{}_{}_{}_{}",
        normalize_label(procedure),
        normalize_label(description),
        yymmdd(date),
        index
    )
}

/// Name of an annex found under a movement's folder.
///
/// `date` is the annex's own date, `reference` its human-readable label.
pub fn annex_name(procedure: &str, description: &str, date: NaiveDate, reference: &str) -> String {
    format!(
        "{}_{}_{}_{}_{ANNEX_SUFFIX}",
        normalize_label(procedure),
        normalize_label(description),
        yymmdd(date),
        normalize_label(reference)
    )
}
