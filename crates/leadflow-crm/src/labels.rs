// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lookup tables mapping domain values to the board's label vocabulary.
//!
//! All mappings are explicit finite tables with a documented fallback, so
//! an unresolvable value lands on "undefined/unspecified" labels instead
//! of failing the sync.

use chrono::{Datelike, NaiveDate};

/// Fallback payment label when the contact has not stated a preference.
pub const PAYMENT_UNDEFINED: &str = "Por definir";

/// Board dropdown labels and the synonyms a contact may use for them.
///
/// Matching is scored by total matched synonym length, so "tunland g9"
/// beats the bare "tunland" when both appear.
const VEHICLE_SYNONYMS: &[(&str, &[&str])] = &[
    ("Tunland E5", &["e5", "tunland", "tunland e5"]),
    ("ESTA 6x4 11.8", &["esta 11.8", "6x4 11.8", "esta"]),
    ("ESTA 6x4 X13", &["esta x13", "6x4 x13"]),
    ("Miler", &["miler", "miller"]),
    ("Toano Panel", &["toano", "panel", "toano panel"]),
    ("Tunland G7", &["g7", "tunland g7"]),
    ("Tunland G9", &["g9", "tunland g9"]),
];

/// Resolve a detected vehicle interest (e.g. "Foton Tunland G9 2025") to
/// the exact board dropdown label. Returns `None` when nothing matches.
pub fn resolve_vehicle(interest: &str) -> Option<&'static str> {
    if interest.is_empty() {
        return None;
    }
    let needle = interest
        .to_lowercase()
        .replace("foton", "")
        .replace("diesel", "")
        .replace("4x4", "")
        .trim()
        .to_string();

    let mut best: Option<&'static str> = None;
    let mut best_score = 0usize;
    for (label, synonyms) in VEHICLE_SYNONYMS {
        let score: usize = synonyms
            .iter()
            .filter(|syn| needle.contains(**syn))
            .map(|syn| syn.len())
            .sum();
        if score > best_score {
            best_score = score;
            best = Some(label);
        }
    }
    best
}

/// Map the contact's stated payment preference to the exact board label.
pub fn resolve_payment(payment: Option<&str>) -> &'static str {
    let Some(payment) = payment else {
        return PAYMENT_UNDEFINED;
    };
    match payment.trim().to_lowercase().as_str() {
        "contado" | "de contado" | "cash" => "De Contado",
        "crédito" | "credito" | "financiamiento" | "financiación" => "Financiamiento",
        _ => PAYMENT_UNDEFINED,
    }
}

const SPANISH_MONTHS: [&str; 12] = [
    "ENERO",
    "FEBRERO",
    "MARZO",
    "ABRIL",
    "MAYO",
    "JUNIO",
    "JULIO",
    "AGOSTO",
    "SEPTIEMBRE",
    "OCTUBRE",
    "NOVIEMBRE",
    "DICIEMBRE",
];

/// Board group title for the month a lead is created in: "FEBRERO 2026".
pub fn month_group_name(date: NaiveDate) -> String {
    let month = SPANISH_MONTHS[date.month0() as usize];
    format!("{month} {}", date.year())
}

/// Spanish month name to number, for explicit-date appointment parsing.
pub fn month_number(name: &str) -> Option<u32> {
    let lowered = name.to_lowercase();
    let idx = match lowered.as_str() {
        "enero" => 1,
        "febrero" => 2,
        "marzo" => 3,
        "abril" => 4,
        "mayo" => 5,
        "junio" => 6,
        "julio" => 7,
        "agosto" => 8,
        "septiembre" => 9,
        "octubre" => 10,
        "noviembre" => 11,
        "diciembre" => 12,
        _ => return None,
    };
    Some(idx)
}
