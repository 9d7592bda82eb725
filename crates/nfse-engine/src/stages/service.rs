use super::{FormStage, FormStageResult, StageKind};
use crate::error::EngineError;
use crate::session::Session;
use async_trait::async_trait;
use nfse_common::money::format_money;
use nfse_common::protocol::SubmitKey;
use nfse_common::record::InvoiceRecord;
use tracing::{error, info};

/// Local-of-service code, submitted with Enter so the portal loads the
/// service list for that municipality.
pub struct LocalOfServiceStage;

#[async_trait]
impl FormStage for LocalOfServiceStage {
    fn kind(&self) -> StageKind {
        StageKind::LocalOfService
    }

    async fn run(
        &self,
        session: &mut Session,
        _record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        let config = session.config.clone();
        let code = &config.service.local_code;
        info!("Local da prestação: {}", code);

        let outcome = session
            .locator()
            .fill(&config.portal.targets.local_of_service, code, Some(SubmitKey::Enter))
            .await?;
        Ok(FormStageResult::from_outcome(self.kind(), outcome))
    }
}

/// Service classification code: open the list and pick the option that
/// carries the code.
pub struct ServiceCodeStage;

#[async_trait]
impl FormStage for ServiceCodeStage {
    fn kind(&self) -> StageKind {
        StageKind::ServiceCode
    }

    async fn run(
        &self,
        session: &mut Session,
        _record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        let config = session.config.clone();
        let targets = &config.portal.targets;
        let code = &config.service.service_code;
        info!("Código de serviço: {}", code);

        let mut result = FormStageResult::ok(self.kind());
        let mut locator = session.locator();

        if !result.absorb(locator.click(&targets.service_code).await?) {
            return Ok(result);
        }
        let option = targets.service_option.substitute("code", code);
        result.absorb(locator.click(&option).await?);
        Ok(result)
    }
}

pub struct ValueStage;

#[async_trait]
impl FormStage for ValueStage {
    fn kind(&self) -> StageKind {
        StageKind::Value
    }

    async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        if record.gross_value.is_blank() {
            error!("Linha {}: valor do serviço não informado", record.row);
            return Ok(FormStageResult::failed(self.kind()));
        }
        let value = format_money(record.gross_value.clone());
        info!("Valor do serviço: {}", value);

        let config = session.config.clone();
        let outcome = session
            .locator()
            .fill(&config.portal.targets.value, &value, Some(SubmitKey::Tab))
            .await?;
        Ok(FormStageResult::from_outcome(self.kind(), outcome))
    }
}

pub struct DescriptionStage;

#[async_trait]
impl FormStage for DescriptionStage {
    fn kind(&self) -> StageKind {
        StageKind::Description
    }

    async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        let config = session.config.clone();
        let text = record.compose_description(
            &config.service.default_description,
            &config.service.payment_lines,
        );
        info!("Discriminação do serviço ({} caracteres)", text.chars().count());

        let outcome = session
            .locator()
            .fill(&config.portal.targets.description, &text, None)
            .await?;
        Ok(FormStageResult::from_outcome(self.kind(), outcome))
    }
}
