//! Steps of the emission form, one per logical group of fields.

pub mod address;
pub mod confirm;
pub mod service;
pub mod taxes;

use crate::error::EngineError;
use crate::locator::LocateOutcome;
use crate::session::Session;
use async_trait::async_trait;
use nfse_common::record::InvoiceRecord;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use address::AddressStage;
pub use confirm::ConfirmStage;
pub use service::{DescriptionStage, LocalOfServiceStage, ServiceCodeStage, ValueStage};
pub use taxes::TaxesStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    LocalOfService,
    ServiceCode,
    Value,
    Description,
    Address,
    Taxes,
    Confirm,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::LocalOfService => "local_of_service",
            StageKind::ServiceCode => "service_code",
            StageKind::Value => "value",
            StageKind::Description => "description",
            StageKind::Address => "address",
            StageKind::Taxes => "taxes",
            StageKind::Confirm => "confirm",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone)]
pub struct FormStageResult {
    pub stage: StageKind,
    pub success: bool,
    /// Screenshots and saved markup produced while running the stage.
    pub artifacts: Vec<PathBuf>,
}

impl FormStageResult {
    pub fn ok(stage: StageKind) -> Self {
        Self {
            stage,
            success: true,
            artifacts: Vec::new(),
        }
    }

    pub fn failed(stage: StageKind) -> Self {
        Self {
            stage,
            success: false,
            artifacts: Vec::new(),
        }
    }

    pub fn from_outcome(stage: StageKind, outcome: LocateOutcome) -> Self {
        Self {
            stage,
            success: outcome.success,
            artifacts: outcome.artifacts,
        }
    }

    /// Fold a sub-step into this result: artifacts accumulate and any
    /// failure sticks.
    pub fn absorb(&mut self, outcome: LocateOutcome) -> bool {
        self.artifacts.extend(outcome.artifacts);
        if !outcome.success {
            self.success = false;
        }
        outcome.success
    }
}

#[async_trait]
pub trait FormStage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Run the stage against the current page. `Err` is reserved for
    /// failures that are not about the form itself (browser gone).
    async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError>;
}
