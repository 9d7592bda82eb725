use crate::error::EngineError;
use crate::session::Session;
use crate::stages::{
    AddressStage, ConfirmStage, DescriptionStage, FormStage, FormStageResult,
    LocalOfServiceStage, ServiceCodeStage, StageKind, TaxesStage, ValueStage,
};
use nfse_common::record::InvoiceRecord;
use tracing::{error, info};

/// Runs form stages strictly in order and stops at the first failure.
pub struct FormSequencer {
    stages: Vec<Box<dyn FormStage>>,
}

impl Default for FormSequencer {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormSequencer {
    /// Local of service, service code, value, description, address,
    /// taxes, confirm.
    pub fn standard() -> Self {
        Self::with_stages(vec![
            Box::new(LocalOfServiceStage),
            Box::new(ServiceCodeStage),
            Box::new(ValueStage),
            Box::new(DescriptionStage),
            Box::new(AddressStage),
            Box::new(TaxesStage),
            Box::new(ConfirmStage),
        ])
    }

    pub fn with_stages(stages: Vec<Box<dyn FormStage>>) -> Self {
        Self { stages }
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(|s| s.kind()).collect()
    }

    /// Results of every stage that ran. The last one is the failure, if
    /// any; later stages are not attempted.
    pub async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<Vec<FormStageResult>, EngineError> {
        let config = session.config.clone();
        let mut results = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let kind = stage.kind();
            info!("Linha {}: etapa {}", record.row, kind);

            let mut result = stage.run(session, record).await?;

            if result.success && config.portal.advance_after.contains(&kind) {
                let outcome = session.locator().click(&config.portal.targets.next).await?;
                result.absorb(outcome);
            }

            if !result.success {
                error!("Linha {}: etapa {} falhou", record.row, kind);
                let saved = session.capture(&format!("etapa_{}_falhou", kind)).await;
                result.artifacts.extend(saved);
                results.push(result);
                return Ok(results);
            }
            results.push(result);
        }
        Ok(results)
    }
}

pub fn all_succeeded(results: &[FormStageResult]) -> bool {
    !results.is_empty() && results.iter().all(|r| r.success)
}

/// First failing stage, if any.
pub fn failed_stage(results: &[FormStageResult]) -> Option<StageKind> {
    results.iter().find(|r| !r.success).map(|r| r.stage)
}
