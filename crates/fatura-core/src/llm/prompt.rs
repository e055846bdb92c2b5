//! Instruction text sent to the extraction model.

/// System message. Also reported to callers for transparency.
pub const SYSTEM_INSTRUCTION: &str = "\
You are an invoice processing assistant.
You read invoice text and return structured JSON only.
You never store data and never call tools yourself.
Invoices vary in layout, language and format; do not assume fixed positions or templates.";

const EXTRACTION_TEMPLATE: &str = r#"Extract invoice fields from the text below.

The text may be Arabic, English, or a mix of both, may come from a right-to-left
layout, and may use Arabic-Indic digits (٠١٢٣٤٥٦٧٨٩).

Fields:
- biller_name: the issuing company (اسم الجهة / اسم الشركة), usually the most prominent name near the top
- biller_address: the issuer's address (العنوان), look for street, city or P.O. box (شارع, الرياض, ص.ب)
- total_amount: the final payable amount including tax (المبلغ الإجمالي)
- due_date: the payment due date (تاريخ الاستحقاق), not the invoice date

Rules:
- Write numbers with ASCII digits and a dot as decimal separator.
- Write dates as YYYY-MM-DD.
- Return null for any field not explicitly present in the text; never guess.
- Copy values as written. Do not infer, complete or invent them.

Answer with exactly this JSON object and nothing else:
{"biller_name": string | null, "biller_address": string | null, "total_amount": number | null, "due_date": string | null}

Invoice text:
"""
{raw_text}
""""#;

/// Build the user message for one invoice.
pub fn extraction_prompt(raw_text: &str) -> String {
    EXTRACTION_TEMPLATE.replace("{raw_text}", raw_text)
}
