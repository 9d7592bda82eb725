//! Control spreadsheet: one invoice per row below a fixed header row.
//! Column 1 holds the emitted invoice number.

use crate::config::{ColumnNames, SpreadsheetConfig};
use chrono::Local;
use nfse_common::record::{
    InvoiceRecord, PayerAddress, RawValue, WithholdingTaxes, pending_records,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};
use umya_spreadsheet::{Cell, Worksheet};

/// Column of the invoice number (1-based).
pub const INVOICE_NUMBER_COLUMN: u32 = 1;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("Cannot read {path}: {message}")]
    Read { path: PathBuf, message: String },
    #[error("Cannot write {path}: {message}")]
    Write { path: PathBuf, message: String },
    #[error("{0} has no worksheet")]
    NoWorksheet(PathBuf),
    #[error("Backup of {path} failed: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where a failed write-back has to be done by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualRecovery {
    pub path: PathBuf,
    pub cell: String,
    pub value: String,
}

impl ManualRecovery {
    pub fn instructions(&self) -> String {
        format!(
            "Atualize manualmente a planilha:\n  1. Abra o arquivo: {}\n  2. Vá até a célula {}\n  3. Insira o número da nota: {}",
            self.path.display(),
            self.cell,
            self.value
        )
    }
}

pub struct InvoiceSheet {
    path: PathBuf,
    header_row: u32,
    columns: ColumnNames,
}

impl InvoiceSheet {
    pub fn new(path: impl Into<PathBuf>, header_row: u32, columns: ColumnNames) -> Self {
        Self {
            path: path.into(),
            header_row: header_row.max(1),
            columns,
        }
    }

    pub fn from_config(config: &SpreadsheetConfig) -> Self {
        Self::new(&config.path, config.header_row, config.columns.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every non-empty data row, in sheet order.
    pub fn load_records(&self) -> Result<Vec<InvoiceRecord>, SheetError> {
        let book = umya_spreadsheet::reader::xlsx::read(&self.path).map_err(|e| SheetError::Read {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        let sheet = book
            .get_sheet(&0)
            .ok_or_else(|| SheetError::NoWorksheet(self.path.clone()))?;

        let headers = header_index(sheet, self.header_row);
        let lookup = ColumnLookup::new(&headers, &self.columns);

        let first_data_row = self.header_row + 1;
        let last_row = sheet.get_highest_row();
        let mut records = Vec::new();

        for row in first_data_row..=last_row {
            let record = lookup.record(sheet, row);
            if record.is_blank_row() {
                continue;
            }
            records.push(record);
        }
        info!(
            "{} linha(s) lidas de {} (cabeçalho na linha {})",
            records.len(),
            self.path.display(),
            self.header_row
        );
        Ok(records)
    }

    /// Copy the workbook to `<stem>_backup_<YYYYmmdd_HHMMSS>.xlsx` next to
    /// the original.
    pub fn backup(&self) -> Result<PathBuf, SheetError> {
        let backup = backup_path(&self.path, &Local::now().format("%Y%m%d_%H%M%S").to_string());
        std::fs::copy(&self.path, &backup).map_err(|source| SheetError::Backup {
            path: self.path.clone(),
            source,
        })?;
        info!("Backup criado: {}", backup.display());
        Ok(backup)
    }

    /// Back up the workbook, then store `number` in column 1 of `row`.
    pub fn write_invoice_number(&self, row: u32, number: &str) -> Result<PathBuf, SheetError> {
        let backup = self.backup()?;

        let mut book =
            umya_spreadsheet::reader::xlsx::read(&self.path).map_err(|e| SheetError::Read {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        let sheet = book
            .get_sheet_mut(&0)
            .ok_or_else(|| SheetError::NoWorksheet(self.path.clone()))?;

        let cell = sheet.get_cell_mut((INVOICE_NUMBER_COLUMN, row));
        let previous = cell.get_value().to_string();
        match numeric_invoice_number(number) {
            Some(n) => {
                cell.set_value_number(n as f64);
            }
            None => {
                cell.set_value_string(number.trim());
            }
        }
        info!("Célula A{}: {:?} -> {}", row, previous, number);

        umya_spreadsheet::writer::xlsx::write(&book, &self.path).map_err(|e| SheetError::Write {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        Ok(backup)
    }

    pub fn manual_recovery(&self, row: u32, number: &str) -> ManualRecovery {
        ManualRecovery {
            path: self.path.clone(),
            cell: format!("A{}", row),
            value: number.to_string(),
        }
    }

    /// Write back, logging manual-recovery instructions on failure.
    pub fn record_emission(&self, row: u32, number: &str) -> Result<(), ManualRecovery> {
        match self.write_invoice_number(row, number) {
            Ok(_) => Ok(()),
            Err(e) => {
                let recovery = self.manual_recovery(row, number);
                error!("Falha ao atualizar planilha: {}", e);
                error!("{}", recovery.instructions());
                Err(recovery)
            }
        }
    }
}

/// Pending records in sheet order.
pub fn pending(records: &[InvoiceRecord]) -> Vec<&InvoiceRecord> {
    pending_records(records)
}

pub fn backup_path(path: &Path, stamp: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "planilha".to_string());
    path.with_file_name(format!("{}_backup_{}.xlsx", stem, stamp))
}

fn header_index(sheet: &Worksheet, header_row: u32) -> HashMap<String, u32> {
    let mut headers = HashMap::new();
    for col in 1..=sheet.get_highest_column() {
        let caption = sheet.get_value((col, header_row));
        let caption = caption.trim();
        if !caption.is_empty() {
            headers.entry(caption.to_string()).or_insert(col);
        }
    }
    headers
}

fn cell_value(cell: Option<&Cell>) -> RawValue {
    let Some(cell) = cell else {
        return RawValue::Empty;
    };
    let text = cell.get_value();
    if text.trim().is_empty() {
        return RawValue::Empty;
    }
    if cell.get_data_type() == "n" {
        if let Ok(n) = text.trim().parse::<f64>() {
            return RawValue::Number(n);
        }
    }
    RawValue::Text(text.to_string())
}

struct ColumnLookup {
    columns: HashMap<&'static str, u32>,
}

impl ColumnLookup {
    fn new(headers: &HashMap<String, u32>, names: &ColumnNames) -> Self {
        let wanted: [(&'static str, &str); 21] = [
            ("company_name", &names.company_name),
            ("tax_id", &names.tax_id),
            ("street", &names.street),
            ("number", &names.number),
            ("complement", &names.complement),
            ("district", &names.district),
            ("city", &names.city),
            ("state", &names.state),
            ("postal_code", &names.postal_code),
            ("description", &names.description),
            ("gross_value", &names.gross_value),
            ("ir", &names.ir),
            ("pis", &names.pis),
            ("cofins", &names.cofins),
            ("csll", &names.csll),
            ("net_value", &names.net_value),
            ("due_day", &names.due_day),
            ("due_month", &names.due_month),
            ("due_year", &names.due_year),
            ("installment", &names.installment),
            ("purchase_order", &names.purchase_order),
        ];

        let mut columns = HashMap::new();
        for (field, caption) in wanted {
            let found = headers.get(caption.trim()).copied().or_else(|| {
                headers
                    .iter()
                    .find(|(h, _)| h.to_lowercase() == caption.trim().to_lowercase())
                    .map(|(_, c)| *c)
            });
            match found {
                Some(col) => {
                    columns.insert(field, col);
                }
                None => warn!("Coluna {:?} não encontrada na planilha", caption),
            }
        }
        Self { columns }
    }

    fn get(&self, sheet: &Worksheet, field: &str, row: u32) -> RawValue {
        match self.columns.get(field) {
            Some(col) => cell_value(sheet.get_cell((*col, row))),
            None => RawValue::Empty,
        }
    }

    fn record(&self, sheet: &Worksheet, row: u32) -> InvoiceRecord {
        let get = |field: &str| self.get(sheet, field, row);
        InvoiceRecord {
            row,
            invoice_number: cell_value(sheet.get_cell((INVOICE_NUMBER_COLUMN, row))),
            company_name: get("company_name"),
            tax_id: get("tax_id"),
            address: PayerAddress {
                street: get("street"),
                number: get("number"),
                complement: get("complement"),
                district: get("district"),
                city: get("city"),
                state: get("state"),
                postal_code: get("postal_code"),
            },
            description: get("description"),
            gross_value: get("gross_value"),
            taxes: WithholdingTaxes {
                ir: get("ir"),
                pis: get("pis"),
                cofins: get("cofins"),
                csll: get("csll"),
            },
            net_value: get("net_value"),
            due_day: get("due_day"),
            due_month: get("due_month"),
            due_year: get("due_year"),
            installment: get("installment"),
            purchase_order: get("purchase_order"),
        }
    }
}

/// Invoice numbers that survive a trip through a numeric cell. Leading
/// zeros would be lost, so those stay text.
fn numeric_invoice_number(number: &str) -> Option<u64> {
    let number = number.trim();
    if number.len() > 1 && number.starts_with('0') {
        return None;
    }
    if !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    number.parse().ok()
}
