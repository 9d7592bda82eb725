use nfse_common::money::{format_money, is_canonical, parse_brl};
use nfse_common::record::{pending_records, InvoiceRecord, RawValue};
use rust_decimal::Decimal;
use std::str::FromStr;

const SAMPLES: &[&str] = &[
    "1234.5",
    "1.234,56",
    "1234,56",
    "R$ 15,00",
    "R$1.000.000,01",
    "0",
    "0,5",
    "12.345.678",
    "lixo",
    "",
    "   ",
    "-3,00",
    "9.999,995",
    "NaN",
];

#[test]
fn test_format_is_idempotent() {
    for s in SAMPLES {
        let once = format_money(*s);
        assert_eq!(format_money(once.as_str()), once, "input {:?}", s);
    }
    for n in [0.0, 0.1, 1234.5, 999999.999, 1e-9, f64::NAN, -1.0] {
        let once = format_money(n);
        assert_eq!(format_money(once.as_str()), once, "input {}", n);
    }
}

#[test]
fn test_output_always_canonical() {
    for s in SAMPLES {
        assert!(is_canonical(&format_money(*s)), "input {:?}", s);
    }
    for n in [f64::INFINITY, f64::NEG_INFINITY, f64::MAX, 0.004, 0.005] {
        assert!(is_canonical(&format_money(n)), "input {}", n);
    }
}

#[test]
fn test_parse_brl_matches_format() {
    assert_eq!(parse_brl("938,50"), Some(Decimal::from_str("938.50").unwrap()));
    assert_eq!(parse_brl("R$ 1.000,00"), Some(Decimal::from_str("1000").unwrap()));
    assert_eq!(parse_brl("sem valor"), None);
}

#[test]
fn test_written_back_row_is_no_longer_pending() {
    let mut records = vec![
        InvoiceRecord {
            row: 4,
            invoice_number: RawValue::Number(101.0),
            company_name: "A".into(),
            ..Default::default()
        },
        InvoiceRecord {
            row: 5,
            company_name: "B".into(),
            tax_id: "11222333000144".into(),
            ..Default::default()
        },
    ];
    assert_eq!(pending_records(&records).len(), 1);

    records[1].invoice_number = RawValue::Number(102.0);
    assert!(pending_records(&records).is_empty());
}
