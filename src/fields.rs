//! Structured fields extracted from a financial document.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Payee used when the model could not read one.
pub const UNKNOWN_PAYEE: &str = "DESCONHECIDO";

/// Amount used when the model could not read one.
pub const ZERO_AMOUNT: &str = "0,00";

/// Fields of a completed document. Every field the file name depends on is
/// always present; see [`ExtractedFields::from_raw`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedFields {
    /// `ddmmYYYY`.
    pub date: String,
    pub payee: String,
    /// Brazilian formatting, e.g. `1.234,56`.
    pub amount: String,
    /// Amount before discounts or fees, as printed.
    pub original_amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_number: Option<String>,
    /// Model's note on how it chose the values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Fields as returned by an extractor. Anything may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFields {
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payee: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub original_amount: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub document_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub explanation: Option<String>,
}

impl RawFields {
    /// True when the extractor returned nothing usable at all.
    pub fn is_empty(&self) -> bool {
        [
            &self.date,
            &self.payee,
            &self.amount,
            &self.original_amount,
            &self.document_number,
        ]
        .iter()
        .all(|f| f.is_none())
    }
}

/// Accept strings, numbers and null; blank strings become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => non_blank(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn non_blank(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

static RE_NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Normalise `25/12/2024`, `25-12-2024` or `25.12.2024` to `25122024`.
/// Anything that does not reduce to eight digits is returned trimmed.
pub fn normalize_date(raw: &str) -> String {
    let digits = RE_NON_DIGIT.replace_all(raw, "");
    if digits.len() == 8 {
        digits.into_owned()
    } else {
        raw.trim().to_string()
    }
}

/// Today in the pipeline's `ddmmYYYY` format.
pub fn today() -> String {
    chrono::Local::now().format("%d%m%Y").to_string()
}

impl ExtractedFields {
    /// Fill the gaps of a raw extraction: `date` defaults to `today`, payee
    /// to [`UNKNOWN_PAYEE`], amount to [`ZERO_AMOUNT`] and the original
    /// amount to the amount.
    pub fn from_raw(raw: RawFields, today: &str) -> Self {
        let amount = raw.amount.unwrap_or_else(|| ZERO_AMOUNT.to_string());
        Self {
            date: raw
                .date
                .map(|d| normalize_date(&d))
                .unwrap_or_else(|| today.to_string()),
            payee: raw.payee.unwrap_or_else(|| UNKNOWN_PAYEE.to_string()),
            original_amount: raw.original_amount.unwrap_or_else(|| amount.clone()),
            amount,
            document_number: raw.document_number,
            explanation: raw.explanation,
        }
    }

    /// Apply a manual correction.
    pub fn apply(&mut self, patch: FieldsPatch) {
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(payee) = patch.payee {
            self.payee = payee;
        }
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(original) = patch.original_amount {
            self.original_amount = original;
        }
        if let Some(number) = patch.document_number {
            self.document_number = non_blank(number);
        }
    }
}

/// Partial edit of [`ExtractedFields`]. `None` leaves a field unchanged; an
/// empty `document_number` removes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldsPatch {
    pub date: Option<String>,
    pub payee: Option<String>,
    pub amount: Option<String>,
    pub original_amount: Option<String>,
    pub document_number: Option<String>,
}
