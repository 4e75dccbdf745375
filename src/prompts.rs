//! Prompts sent to the vision model.
//!
//! Every prompt lives here so wording changes never touch retry or parsing
//! code, and tests can inspect prompts without a model.
//! [`crate::config::BatchConfig::system_prompt`] overrides the system prompt;
//! the per-category instructions always apply.

use crate::item::Category;

/// Default system prompt for field extraction.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You read Brazilian financial documents (payment receipts, bank slips, invoices) from images.

Reply with ONE JSON object and nothing else, using exactly these keys:

{
  "date": "ddmmYYYY",
  "payee": "who received the money",
  "amount": "1.234,56",
  "originalAmount": "1.234,56",
  "documentNumber": "number printed on the document, or null",
  "explanation": "one short sentence on which values you picked and why"
}

Rules:
- Dates use eight digits, day first, no separators (25122024).
- Amounts use Brazilian formatting: dot for thousands, comma for decimals.
- "amount" is the value actually paid or due; "originalAmount" is the value
  before discounts, fines or interest. Repeat "amount" when there is none.
- Use null for anything you cannot read. Never invent values.
- Do not wrap the JSON in markdown fences."#;

/// Category-specific instruction sent with the page images.
pub fn category_instruction(category: &Category) -> String {
    match category {
        Category::Receipt => "This is a payment receipt (comprovante). \"date\" is the payment date; \
\"payee\" is the beneficiary or merchant that received the payment."
            .to_string(),
        Category::BankSlip => "This is a bank slip (boleto). \"date\" is the DUE date (vencimento); \
\"payee\" is the beneficiary (beneficiário/cedente); \"documentNumber\" is the \
\"número do documento\" field."
            .to_string(),
        Category::Invoice => "This is an invoice (nota fiscal). \"date\" is the issue date \
(data de emissão); \"payee\" is the issuer (emitente); \"documentNumber\" is the invoice \
number; \"amount\" is the invoice total."
            .to_string(),
        Category::Other(kind) => format!(
            "This document is classified by the user as \"{kind}\". Extract the main date, \
the counterparty and the total amount."
        ),
    }
}

/// System prompt for reading the bar line of a boleto.
pub const BAR_LINE_SYSTEM_PROMPT: &str = r#"You read the typeable line (linha digitável) of Brazilian bank slips.

Reply with the digits of the line only: no spaces, dots or other characters.
If there is no typeable line, reply with NONE.
Ignore QR codes; they are decoded separately."#;

/// Instruction sent with the boleto images when reading the bar line.
pub const BAR_LINE_INSTRUCTION: &str = "Read the typeable line of this bank slip.";
