use super::{FormStage, FormStageResult, StageKind};
use crate::error::EngineError;
use crate::session::Session;
use async_trait::async_trait;
use nfse_common::record::InvoiceRecord;
use tracing::{info, warn};

/// Advance to the summary page, then press the emit button.
pub struct ConfirmStage;

#[async_trait]
impl FormStage for ConfirmStage {
    fn kind(&self) -> StageKind {
        StageKind::Confirm
    }

    async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        let config = session.config.clone();
        let targets = &config.portal.targets;
        let mut result = FormStageResult::ok(self.kind());

        if !result.absorb(session.locator().click(&targets.next).await?) {
            warn!("Botão Próximo não encontrado antes da emissão");
            return Ok(result);
        }

        if config.service.confirm_before_emit {
            let question = format!(
                "Formulário da linha {} ({}) pronto. Emitir a nota?",
                record.row,
                record.company()
            );
            if !session.operator.confirm(&question, true).await {
                info!("Emissão cancelada pelo operador");
                result.success = false;
                return Ok(result);
            }
        }

        if result.absorb(session.locator().click(&targets.emit).await?) {
            info!("Botão Emitir acionado");
        } else {
            warn!("Botão Emitir não encontrado");
        }
        Ok(result)
    }
}
