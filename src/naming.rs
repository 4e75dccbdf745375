//! File-name projection for completed items.
//!
//! Every function here is pure and total: the same inputs always produce the
//! same name and nothing panics on odd input.

use crate::fields::{normalize_date, ExtractedFields};
use crate::item::Category;
use std::collections::HashMap;

/// Characters that are invalid in file names on at least one platform.
const FORBIDDEN: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Token used in page names when no due date was found.
pub const NO_DATE_TOKEN: &str = "SEM_DATA";

/// Strip forbidden characters, trim and uppercase.
pub fn sanitize_text(s: &str) -> String {
    s.chars()
        .filter(|c| !FORBIDDEN.contains(c))
        .collect::<String>()
        .trim()
        .to_uppercase()
}

/// Drop `.` grouping separators; the decimal comma stays.
pub fn sanitize_amount(s: &str) -> String {
    s.replace('.', "")
}

/// Label of a category inside a file name.
pub fn category_label(category: &Category) -> String {
    match category {
        Category::Invoice => "NOTA FISCAL".to_string(),
        other => other.as_str().to_uppercase(),
    }
}

/// `date_PAYEE[_DOCNUMBER]_amount_LABEL.ext`
///
/// `extension` is appended verbatim and should include its leading dot.
pub fn project_name(fields: &ExtractedFields, category: &Category, extension: &str) -> String {
    let date = sanitize_text(&normalize_date(&fields.date));
    let mut parts = vec![date, sanitize_text(&fields.payee)];
    if let Some(number) = fields.document_number.as_deref() {
        let number = sanitize_text(number);
        if !number.is_empty() {
            parts.push(number);
        }
    }
    parts.push(sanitize_amount(&fields.amount));
    parts.push(category_label(category));
    format!("{}{}", parts.join("_"), extension)
}

/// Name of a split page: its due date, or [`NO_DATE_TOKEN`] plus the page
/// label (normally the 1-based page number).
pub fn page_name(due_date: Option<&str>, page_label: &str) -> String {
    match due_date.map(sanitize_text).filter(|d| !d.is_empty()) {
        Some(date) => format!("{date}.pdf"),
        None => format!("{NO_DATE_TOKEN}_{page_label}.pdf"),
    }
}

/// Split `name` into stem and extension (with dot).
pub fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    }
}

/// Make names unique by suffixing repeats with `_2`, `_3`, … in order.
pub fn dedupe_names(names: &[String]) -> Vec<String> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    names
        .iter()
        .map(|name| {
            let count = seen.entry(name.as_str()).or_insert(0);
            *count += 1;
            if *count == 1 {
                name.clone()
            } else {
                let (stem, ext) = split_extension(name);
                format!("{stem}_{count}{ext}")
            }
        })
        .collect()
}
