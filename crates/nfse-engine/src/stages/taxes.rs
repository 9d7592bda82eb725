use super::{FormStage, FormStageResult, StageKind};
use crate::error::EngineError;
use crate::reconcile::{Reconciliation, TaxAmounts, reconcile};
use crate::session::Session;
use async_trait::async_trait;
use nfse_common::money::{format_money, parse_raw};
use nfse_common::protocol::SubmitKey;
use nfse_common::record::InvoiceRecord;
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Federal withholding fields (IR, PIS, COFINS, CSLL) followed by the net
/// value check.
pub struct TaxesStage;

#[async_trait]
impl FormStage for TaxesStage {
    fn kind(&self) -> StageKind {
        StageKind::Taxes
    }

    async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        let config = session.config.clone();
        let targets = &config.portal.targets;
        let taxes = &record.taxes;
        let mut result = FormStageResult::ok(self.kind());

        let fields = [
            ("IR", &targets.tax_ir, format_money(taxes.ir.clone())),
            ("PIS", &targets.tax_pis, format_money(taxes.pis.clone())),
            ("COFINS", &targets.tax_cofins, format_money(taxes.cofins.clone())),
            ("CSLL", &targets.tax_csll, format_money(taxes.csll.clone())),
        ];

        for (name, target, value) in fields {
            info!("Tributo {}: {}", name, value);
            let outcome = session
                .locator()
                .fill(target, &value, Some(SubmitKey::Tab))
                .await?;
            if !result.absorb(outcome) {
                warn!("Campo do tributo {} não preenchido", name);
                return Ok(result);
            }
        }

        let gross = parse_raw(&record.gross_value).unwrap_or(Decimal::ZERO);
        let amounts = TaxAmounts::from_record(taxes);
        match reconcile(session, gross, &amounts).await? {
            Reconciliation::Declined(_) => {
                warn!("Operador recusou continuar com valor líquido divergente");
                result.success = false;
            }
            other => info!("Reconciliação: {:?}", other),
        }
        Ok(result)
    }
}
