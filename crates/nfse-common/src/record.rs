//! Invoice rows read from the control spreadsheet.

use serde::{Deserialize, Serialize};

/// Untyped content of a spreadsheet cell.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Empty cell, NaN, whitespace-only text or a literal `nan`.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Empty => true,
            RawValue::Number(n) => n.is_nan(),
            RawValue::Text(s) => {
                let t = s.trim();
                t.is_empty() || t.eq_ignore_ascii_case("nan")
            }
        }
    }

    /// Cell content as display text. Whole numbers lose their `.0`.
    pub fn as_text(&self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        match self {
            RawValue::Empty => None,
            RawValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(n.to_string())
                }
            }
            RawValue::Text(s) => Some(s.trim().to_string()),
        }
    }

    /// Cell content truncated to an integer (`"05"` → 5, `7.0` → 7).
    pub fn as_integer(&self) -> Option<i64> {
        if self.is_blank() {
            return None;
        }
        let n = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => s.trim().replace(',', ".").parse::<f64>().ok()?,
            RawValue::Empty => return None,
        };
        if n.is_finite() {
            Some(n.trunc() as i64)
        } else {
            None
        }
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayerAddress {
    pub street: RawValue,
    pub number: RawValue,
    pub complement: RawValue,
    pub district: RawValue,
    pub city: RawValue,
    pub state: RawValue,
    pub postal_code: RawValue,
}

/// Federal withholding amounts as they appear in the sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithholdingTaxes {
    pub ir: RawValue,
    pub pis: RawValue,
    pub cofins: RawValue,
    pub csll: RawValue,
}

/// One data row of the control spreadsheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// 1-based sheet row the record was read from.
    pub row: u32,
    /// Emitted invoice number. Filled means already processed.
    pub invoice_number: RawValue,
    pub company_name: RawValue,
    pub tax_id: RawValue,
    pub address: PayerAddress,
    pub description: RawValue,
    pub gross_value: RawValue,
    pub taxes: WithholdingTaxes,
    pub net_value: RawValue,
    pub due_day: RawValue,
    pub due_month: RawValue,
    pub due_year: RawValue,
    pub installment: RawValue,
    pub purchase_order: RawValue,
}

impl InvoiceRecord {
    /// No invoice number yet, and enough payer data to emit one.
    pub fn is_pending(&self) -> bool {
        self.invoice_number.is_blank() && !(self.company_name.is_blank() && self.tax_id.is_blank())
    }

    pub fn company(&self) -> String {
        self.company_name.as_text().unwrap_or_default()
    }

    pub fn tax_id_text(&self) -> String {
        self.tax_id.as_text().unwrap_or_default()
    }

    /// Tax ID with punctuation removed, as typed into portal search boxes.
    pub fn tax_id_digits(&self) -> String {
        self.tax_id_text()
            .chars()
            .filter(|c| c.is_ascii_digit())
            .collect()
    }

    /// Due date as `DD/MM/YYYY` when all three components are readable.
    pub fn due_date(&self) -> Option<String> {
        let day = self.due_day.as_integer()?;
        let month = self.due_month.as_integer()?;
        let year = self.due_year.as_integer()?;
        Some(format!("{:02}/{:02}/{}", day, month, year))
    }

    /// Purchase-order number without a spurious decimal part (`4500.0` → `4500`).
    pub fn purchase_order_text(&self) -> Option<String> {
        let text = self.purchase_order.as_text()?;
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() && !text.contains(char::is_alphabetic) => {
                Some(format!("{}", n.trunc() as i64))
            }
            _ => Some(text),
        }
    }

    pub fn installment_text(&self) -> Option<String> {
        self.installment.as_text()
    }

    /// Text for the portal's service-description box.
    ///
    /// The service description is followed by a blank line and then, each
    /// only when present and each followed by a blank line: purchase order,
    /// due date, installment. Payment instruction lines close the text.
    pub fn compose_description(&self, default_description: &str, payment_lines: &[String]) -> String {
        let base = self
            .description
            .as_text()
            .unwrap_or_else(|| default_description.to_string());

        let mut lines = vec![base, String::new()];

        if let Some(po) = self.purchase_order_text() {
            lines.push(format!("Nº PEDIDO/ORDEM DE COMPRA: {}", po));
            lines.push(String::new());
        }
        if let Some(due) = self.due_date() {
            lines.push(format!("VENCIMENTO: {}", due));
            lines.push(String::new());
        }
        if let Some(installment) = self.installment_text() {
            lines.push(format!("PARCELA: {}", installment));
            lines.push(String::new());
        }
        lines.extend(payment_lines.iter().cloned());

        lines.join("\n")
    }

    /// Whether every mapped cell in the row is empty.
    pub fn is_blank_row(&self) -> bool {
        [
            &self.invoice_number,
            &self.company_name,
            &self.tax_id,
            &self.description,
            &self.gross_value,
        ]
        .iter()
        .all(|v| v.is_blank())
    }
}

/// Records still awaiting emission, in sheet order.
pub fn pending_records(records: &[InvoiceRecord]) -> Vec<&InvoiceRecord> {
    records.iter().filter(|r| r.is_pending()).collect()
}
