use nfse_engine::config::ColumnNames;
use nfse_engine::spreadsheet::{InvoiceSheet, pending};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADER_ROW: u32 = 3;

/// Control sheet with a title block above the header row, like the real one.
fn write_sheet(dir: &Path) -> PathBuf {
    let columns = ColumnNames::default();
    let mut book = umya_spreadsheet::new_file();
    let sheet = book.get_sheet_mut(&0).unwrap();

    sheet.get_cell_mut((1, 1)).set_value("Controle de Notas 2025");
    let headers = [
        "Nº NF",
        columns.company_name.as_str(),
        columns.tax_id.as_str(),
        columns.gross_value.as_str(),
        columns.ir.as_str(),
        columns.net_value.as_str(),
    ];
    for (i, header) in headers.iter().enumerate() {
        sheet.get_cell_mut((i as u32 + 1, HEADER_ROW)).set_value(*header);
    }

    // Row 4: already emitted.
    sheet.get_cell_mut((1, 4)).set_value_number(101);
    sheet.get_cell_mut((2, 4)).set_value("Alfa Ltda");
    sheet.get_cell_mut((3, 4)).set_value("11.111.111/0001-11");
    sheet.get_cell_mut((4, 4)).set_value_number(500);

    // Row 5: already emitted.
    sheet.get_cell_mut((1, 5)).set_value_number(102);
    sheet.get_cell_mut((2, 5)).set_value("Beta SA");
    sheet.get_cell_mut((3, 5)).set_value("22.222.222/0001-22");
    sheet.get_cell_mut((4, 5)).set_value_number(750.5);

    // Row 6: pending.
    sheet.get_cell_mut((2, 6)).set_value("Gama ME");
    sheet.get_cell_mut((3, 6)).set_value("33.333.333/0001-33");
    sheet.get_cell_mut((4, 6)).set_value_number(1000);
    sheet.get_cell_mut((5, 6)).set_value_number(15);
    sheet.get_cell_mut((6, 6)).set_value_number(985);

    let path = dir.join("notas.xlsx");
    umya_spreadsheet::writer::xlsx::write(&book, &path).unwrap();
    path
}

fn open(path: &Path) -> InvoiceSheet {
    InvoiceSheet::new(path, HEADER_ROW, ColumnNames::default())
}

#[test]
fn test_exactly_one_pending_record() {
    let dir = TempDir::new().unwrap();
    let path = write_sheet(dir.path());

    let records = open(&path).load_records().unwrap();
    assert_eq!(records.len(), 3);

    let waiting = pending(&records);
    assert_eq!(waiting.len(), 1);
    let record = waiting[0];
    assert_eq!(record.row, 6);
    assert_eq!(record.company(), "Gama ME");
    assert_eq!(record.tax_id_digits(), "33333333000133");
    assert_eq!(nfse_common::money::format_money(record.gross_value.clone()), "1000,00");
    assert_eq!(nfse_common::money::format_money(record.taxes.ir.clone()), "15,00");
}

#[test]
fn test_written_back_row_is_no_longer_pending() {
    let dir = TempDir::new().unwrap();
    let path = write_sheet(dir.path());
    let sheet = open(&path);

    let backup = sheet.write_invoice_number(6, "2025").unwrap();
    assert!(backup.exists());
    let backup_name = backup.file_name().unwrap().to_string_lossy().into_owned();
    assert!(backup_name.starts_with("notas_backup_"));
    assert!(backup_name.ends_with(".xlsx"));

    let records = sheet.load_records().unwrap();
    assert!(pending(&records).is_empty());
    let row = records.iter().find(|r| r.row == 6).unwrap();
    assert_eq!(row.invoice_number.as_text().as_deref(), Some("2025"));
    assert_eq!(row.company(), "Gama ME");

    // The backup still holds the sheet as it was.
    let before = open(&backup).load_records().unwrap();
    assert_eq!(pending(&before).len(), 1);
}

#[test]
fn test_leading_zeros_are_kept_on_write_back() {
    let dir = TempDir::new().unwrap();
    let path = write_sheet(dir.path());
    let sheet = open(&path);

    sheet.write_invoice_number(6, "000123").unwrap();

    let records = sheet.load_records().unwrap();
    let row = records.iter().find(|r| r.row == 6).unwrap();
    assert_eq!(row.invoice_number.as_text().as_deref(), Some("000123"));
    assert!(pending(&records).is_empty());
}

#[test]
fn test_failed_write_returns_manual_recovery() {
    let dir = TempDir::new().unwrap();
    let sheet = open(&dir.path().join("ausente.xlsx"));

    let recovery = sheet.record_emission(9, "777").unwrap_err();
    assert_eq!(recovery.cell, "A9");
    assert_eq!(recovery.value, "777");
    assert!(recovery.instructions().contains("ausente.xlsx"));
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(open(&dir.path().join("nada.xlsx")).load_records().is_err());
}
