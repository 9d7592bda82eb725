use crate::money::format_money;
use crate::record::InvoiceRecord;

/// Field names whose values never reach the console or the log.
const DEFAULT_SENSITIVE_FIELDS: &[&str] = &["senha", "password", "secret", "token"];

/// Mask a tax ID for display: first four and last two characters kept.
///
/// `12345678000190` → `1234****90`. Short values are fully masked.
pub fn mask_tax_id(tax_id: &str) -> String {
    let chars: Vec<char> = tax_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if chars.len() <= 6 {
        return "*".repeat(chars.len().max(4));
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{}****{}", head, tail)
}

pub fn mask_sensitive(value: &str, field_name: &str) -> String {
    let lower = field_name.to_lowercase();
    if DEFAULT_SENSITIVE_FIELDS.iter().any(|f| lower.contains(f)) {
        "••••••••".to_string()
    } else {
        value.to_string()
    }
}

/// One line of the pending-records listing.
pub fn pending_line(index: usize, record: &InvoiceRecord) -> String {
    format!(
        "{:>3}. [linha {}] {} | CNPJ {} | R$ {}",
        index,
        record.row,
        record.company(),
        mask_tax_id(&record.tax_id_text()),
        format_money(record.gross_value.clone())
    )
}

pub fn format_pending(records: &[&InvoiceRecord]) -> String {
    if records.is_empty() {
        return "Nenhuma nota pendente.\n".to_string();
    }
    let mut output = format!("{} nota(s) pendente(s):\n", records.len());
    for (i, record) in records.iter().enumerate() {
        output.push_str(&pending_line(i + 1, record));
        output.push('\n');
    }
    output
}

/// `[#####-----] 2/4`
pub fn progress_bar(done: usize, total: usize, width: usize) -> String {
    let filled = if total == 0 {
        width
    } else {
        (done.min(total) * width) / total
    };
    format!(
        "[{}{}] {}/{}",
        "#".repeat(filled),
        "-".repeat(width - filled),
        done,
        total
    )
}
