//! Cross-check of the net value the portal computes against the one
//! derived from the spreadsheet.

use crate::error::EngineError;
use crate::session::Session;
use nfse_common::money::{ZERO, format_decimal, parse_brl, parse_raw};
use nfse_common::record::WithholdingTaxes;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Largest difference accepted as rounding noise.
pub const TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaxAmounts {
    pub ir: Decimal,
    pub pis: Decimal,
    pub cofins: Decimal,
    pub csll: Decimal,
}

impl TaxAmounts {
    /// Blank or unreadable cells count as zero.
    pub fn from_record(taxes: &WithholdingTaxes) -> Self {
        let read = |v| parse_raw(v).unwrap_or(Decimal::ZERO);
        Self {
            ir: read(&taxes.ir),
            pis: read(&taxes.pis),
            cofins: read(&taxes.cofins),
            csll: read(&taxes.csll),
        }
    }

    pub fn total(&self) -> Decimal {
        self.ir + self.pis + self.cofins + self.csll
    }
}

pub fn expected_net(gross: Decimal, taxes: &TaxAmounts) -> Decimal {
    gross - taxes.total()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCheck {
    ExactMatch,
    WithinTolerance { difference: Decimal },
    Mismatch {
        expected: String,
        portal: String,
        difference: Option<Decimal>,
    },
}

impl NetCheck {
    pub fn passed(&self) -> bool {
        !matches!(self, NetCheck::Mismatch { .. })
    }
}

/// Compare the expected net with the text shown by the portal.
///
/// Both sides are normalised to the canonical `digits,two-decimals` form
/// first; an identical string passes, otherwise a numeric difference of at
/// most [`TOLERANCE`] passes.
/// A negative expected net never matches: withholdings above the gross
/// value point at a spreadsheet error.
pub fn compare_net(expected: Decimal, portal_text: &str) -> NetCheck {
    let expected_text = signed_text(expected);
    let portal_value = parse_brl(portal_text);
    let portal_canonical = portal_value.map(format_decimal);

    if expected.is_sign_negative() && !expected.is_zero() {
        return NetCheck::Mismatch {
            expected: expected_text,
            portal: portal_text.trim().to_string(),
            difference: portal_value.map(|p| (p - expected).abs()),
        };
    }

    if portal_canonical.as_deref() == Some(expected_text.as_str()) {
        return NetCheck::ExactMatch;
    }

    let difference = portal_value.map(|p| (p - expected).abs());
    match difference {
        Some(diff) if diff <= TOLERANCE => NetCheck::WithinTolerance { difference: diff },
        _ => NetCheck::Mismatch {
            expected: expected_text,
            portal: portal_text.trim().to_string(),
            difference,
        },
    }
}

/// `format_decimal` clamps at zero; keep the sign for reporting.
fn signed_text(value: Decimal) -> String {
    if value.is_sign_negative() && !value.is_zero() {
        format!("-{}", format_decimal(-value))
    } else {
        format_decimal(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Passed(NetCheck),
    /// Net field not found on the page; nothing to compare against.
    Skipped { expected: String },
    ConfirmedByOperator(NetCheck),
    Declined(NetCheck),
}

impl Reconciliation {
    pub fn may_continue(&self) -> bool {
        !matches!(self, Reconciliation::Declined(_))
    }
}

/// Read the portal's net value and compare it with `gross - taxes`.
/// Mismatches are shown to the operator, who decides whether to go on.
pub async fn reconcile(
    session: &mut Session,
    gross: Decimal,
    taxes: &TaxAmounts,
) -> Result<Reconciliation, EngineError> {
    let expected = expected_net(gross, taxes);
    let expected_text = signed_text(expected);
    info!(
        "Valor líquido esperado: {} (bruto {} - retenções {})",
        expected_text,
        format_decimal(gross),
        format_decimal(taxes.total())
    );

    let config = session.config.clone();
    let portal_text = session
        .locator()
        .read_value(&config.portal.targets.net_value)
        .await?;

    let Some(portal_text) = portal_text else {
        warn!(
            "Campo de valor líquido não encontrado; verificação ignorada. Líquido calculado: {}",
            expected_text
        );
        return Ok(Reconciliation::Skipped {
            expected: expected_text,
        });
    };

    let check = compare_net(expected, &portal_text);
    match &check {
        NetCheck::ExactMatch => {
            info!("Valor líquido confere: {}", expected_text);
            return Ok(Reconciliation::Passed(check));
        }
        NetCheck::WithinTolerance { difference } => {
            info!(
                "Valor líquido dentro da tolerância: portal {} esperado {} (diferença {})",
                portal_text.trim(),
                expected_text,
                difference
            );
            return Ok(Reconciliation::Passed(check));
        }
        NetCheck::Mismatch {
            expected,
            portal,
            difference,
        } => {
            warn!(
                "Divergência no valor líquido: portal {:?} esperado {} (diferença {})",
                portal,
                expected,
                difference.map(format_decimal).unwrap_or_else(|| ZERO.to_string())
            );
        }
    }

    session.capture("divergencia_valor_liquido").await;
    let question = format!(
        "Valor líquido no portal ({}) difere do calculado ({}). Continuar mesmo assim?",
        portal_text.trim(),
        expected_text
    );
    if session.operator.confirm(&question, false).await {
        Ok(Reconciliation::ConfirmedByOperator(check))
    } else {
        Ok(Reconciliation::Declined(check))
    }
}
