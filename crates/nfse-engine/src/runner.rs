//! Whole-batch driver: one browser session, pending records one at a time.

use crate::error::EngineError;
use crate::operator::{CountChoice, FailureAction};
use crate::portal::{
    Credentials, access_fiscal_area, await_captcha, dismiss_notice, extract_invoice_number, login,
    open_emission_form, open_portal, return_to_home, wait_for_destination,
};
use crate::sequencer::{FormSequencer, all_succeeded, failed_stage};
use crate::session::Session;
use crate::spreadsheet::{InvoiceSheet, pending};
use chrono::{DateTime, Local};
use nfse_common::formatter::{format_pending, progress_bar};
use nfse_common::record::InvoiceRecord;
use std::path::PathBuf;
use tracing::{error, info, warn};

const PROGRESS_WIDTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordStatus {
    /// Emitted. `number` is `None` when it could not be read nor was typed;
    /// `written` tells whether the spreadsheet was updated.
    Emitted { number: Option<String>, written: bool },
    Skipped,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub row: u32,
    pub company: String,
    pub status: RecordStatus,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub pending: usize,
    pub outcomes: Vec<RecordOutcome>,
    pub aborted: bool,
    pub finished_at: Option<DateTime<Local>>,
    pub log_file: Option<PathBuf>,
}

impl RunReport {
    pub fn processed(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, RecordStatus::Emitted { .. }))
            .count()
    }

    /// Percentage of processed records that were emitted.
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.succeeded() as f64 * 100.0 / self.processed() as f64
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            "===== RESUMO =====".to_string(),
            format!("Notas processadas: {}", self.processed()),
            format!("Notas emitidas: {}", self.succeeded()),
            format!("Taxa de sucesso: {:.1}%", self.success_rate()),
        ];
        if self.aborted {
            lines.push("Execução interrompida pelo operador".to_string());
        }
        if let Some(at) = self.finished_at {
            lines.push(format!("Finalizado em: {}", at.format("%d/%m/%Y %H:%M:%S")));
        }
        if let Some(log) = &self.log_file {
            lines.push(format!("Log: {}", log.display()));
        }
        lines.join("\n")
    }
}

pub struct BatchRunner {
    sheet: InvoiceSheet,
    sequencer: FormSequencer,
    credentials: Credentials,
    limit: Option<usize>,
    log_file: Option<PathBuf>,
}

impl BatchRunner {
    pub fn new(sheet: InvoiceSheet, credentials: Credentials) -> Self {
        Self {
            sheet,
            sequencer: FormSequencer::standard(),
            credentials,
            limit: None,
            log_file: None,
        }
    }

    pub fn with_sequencer(mut self, sequencer: FormSequencer) -> Self {
        self.sequencer = sequencer;
        self
    }

    /// Process at most `limit` records without asking.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_log_file(mut self, log_file: Option<PathBuf>) -> Self {
        self.log_file = log_file;
        self
    }

    pub async fn run(&self, session: &mut Session) -> Result<RunReport, EngineError> {
        let mut report = RunReport {
            log_file: self.log_file.clone(),
            ..RunReport::default()
        };

        let records = self.sheet.load_records()?;
        let selected: Vec<InvoiceRecord> = {
            let waiting = pending(&records);
            report.pending = waiting.len();
            if waiting.is_empty() {
                info!("Nenhuma nota pendente em {}", self.sheet.path().display());
                session.operator.say("Nenhuma nota pendente encontrada.");
                return Ok(self.finish(session, report));
            }
            session.operator.say(&format_pending(&waiting));

            let count = match self.limit {
                Some(limit) => limit.clamp(1, waiting.len()),
                None => match session.operator.ask_count(waiting.len()).await {
                    CountChoice::Process(n) => n,
                    CountChoice::Cancel => {
                        info!("Processamento cancelado pelo operador");
                        return Ok(self.finish(session, report));
                    }
                },
            };
            waiting.into_iter().take(count).cloned().collect()
        };
        info!("Processando {} nota(s)", selected.len());

        session.backend.launch().await?;
        let driven = self.drive(session, &selected, &mut report).await;

        if session.operator.confirm("Fechar o navegador?", true).await {
            if let Err(e) = session.backend.close().await {
                warn!("Falha ao fechar o navegador: {}", e);
            }
        }

        match driven {
            Ok(()) => {}
            Err(EngineError::Aborted) | Err(EngineError::InputClosed) => report.aborted = true,
            Err(e) => return Err(e),
        }
        Ok(self.finish(session, report))
    }

    fn finish(&self, session: &mut Session, mut report: RunReport) -> RunReport {
        report.finished_at = Some(Local::now());
        let summary = report.summary();
        info!(
            "Processadas {}, emitidas {} ({:.1}%)",
            report.processed(),
            report.succeeded(),
            report.success_rate()
        );
        session.operator.say(&summary);
        report
    }

    /// Portal entry, then the per-record loop.
    async fn drive(
        &self,
        session: &mut Session,
        records: &[InvoiceRecord],
        report: &mut RunReport,
    ) -> Result<(), EngineError> {
        self.enter_portal(session).await?;

        let total = records.len();
        for (index, record) in records.iter().enumerate() {
            session.operator.say(&format!(
                "\n{} Linha {}: {}",
                progress_bar(index, total, PROGRESS_WIDTH),
                record.row,
                record.company()
            ));

            let status = match self.process_record(session, record).await {
                Ok(status) => status,
                Err(EngineError::Aborted) => {
                    report.outcomes.push(outcome(record, RecordStatus::Skipped));
                    return Err(EngineError::Aborted);
                }
                Err(EngineError::InputClosed) => return Err(EngineError::InputClosed),
                Err(e) => {
                    error!("Erro inesperado na linha {}: {}", record.row, e);
                    session.capture(&format!("erro_linha_{}", record.row)).await;
                    report
                        .outcomes
                        .push(outcome(record, RecordStatus::Failed(e.to_string())));
                    let question = format!("Erro na linha {}: {}. Prosseguir com a próxima nota?", record.row, e);
                    if !session.operator.confirm(&question, false).await {
                        return Err(EngineError::Aborted);
                    }
                    continue;
                }
            };
            report.outcomes.push(outcome(record, status));

            if index + 1 < total
                && !session
                    .operator
                    .confirm("Processar a próxima nota?", true)
                    .await
            {
                info!("Operador encerrou o lote após a linha {}", record.row);
                break;
            }
        }
        session
            .operator
            .say(&progress_bar(report.processed(), total, PROGRESS_WIDTH));
        Ok(())
    }

    async fn enter_portal(&self, session: &mut Session) -> Result<(), EngineError> {
        if !open_portal(session).await? {
            warn!("Portal não terminou de carregar");
        }
        if self.credentials.is_complete() {
            if !login(session, &self.credentials).await? {
                warn!("Login automático incompleto; conclua no navegador");
            }
        } else {
            warn!("Credenciais não configuradas; faça o login no navegador");
        }
        access_fiscal_area(session).await?;
        await_captcha(session).await?;

        if !wait_for_destination(session).await?
            && !session
                .operator
                .confirm("Página de destino não alcançada. Continuar mesmo assim?", false)
                .await
        {
            return Err(EngineError::Aborted);
        }
        dismiss_notice(session).await?;
        Ok(())
    }

    async fn process_record(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<RecordStatus, EngineError> {
        if !return_to_home(session).await? {
            warn!("Página inicial não estabilizou");
        }

        let completed = if open_emission_form(session, record).await? {
            let results = self.sequencer.run(session, record).await?;
            if let Some(stage) = failed_stage(&results) {
                warn!("Linha {}: formulário parou na etapa {}", record.row, stage);
            }
            all_succeeded(&results)
        } else {
            warn!("Linha {}: formulário de emissão não abriu", record.row);
            false
        };

        if !completed {
            let context = format!(
                "Falha no preenchimento automático da linha {} ({}).",
                record.row,
                record.company()
            );
            match session.operator.failure_action(&context).await {
                FailureAction::ContinueManually => {
                    if !session
                        .operator
                        .wait_enter("Conclua a emissão no navegador e pressione ENTER...")
                        .await
                    {
                        return Err(EngineError::InputClosed);
                    }
                }
                FailureAction::Skip => {
                    info!("Linha {} pulada", record.row);
                    return Ok(RecordStatus::Skipped);
                }
                FailureAction::Abort => return Err(EngineError::Aborted),
            }
        }

        let number = match extract_invoice_number(session).await? {
            Some(number) => Some(number),
            None => session.operator.ask_invoice_number().await,
        };
        let Some(number) = number else {
            warn!("Linha {}: número da nota não informado; planilha não atualizada", record.row);
            return Ok(RecordStatus::Emitted {
                number: None,
                written: false,
            });
        };

        let written = match self.sheet.record_emission(record.row, &number) {
            Ok(()) => {
                info!("Linha {}: nota {} registrada na planilha", record.row, number);
                true
            }
            Err(recovery) => {
                session.operator.say(&recovery.instructions());
                false
            }
        };
        Ok(RecordStatus::Emitted {
            number: Some(number),
            written,
        })
    }
}

fn outcome(record: &InvoiceRecord, status: RecordStatus) -> RecordOutcome {
    RecordOutcome {
        row: record.row,
        company: record.company(),
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome_with(status: RecordStatus) -> RecordOutcome {
        RecordOutcome {
            row: 4,
            company: "ACME".to_string(),
            status,
        }
    }

    #[test]
    fn test_success_rate() {
        let report = RunReport {
            outcomes: vec![
                outcome_with(RecordStatus::Emitted {
                    number: Some("10".into()),
                    written: true,
                }),
                outcome_with(RecordStatus::Skipped),
                outcome_with(RecordStatus::Failed("x".into())),
                outcome_with(RecordStatus::Emitted {
                    number: None,
                    written: false,
                }),
            ],
            ..RunReport::default()
        };
        assert_eq!(report.processed(), 4);
        assert_eq!(report.succeeded(), 2);
        assert!((report.success_rate() - 50.0).abs() < f64::EPSILON);
        assert!(report.summary().contains("Taxa de sucesso: 50.0%"));
    }

    #[test]
    fn test_empty_report() {
        let report = RunReport::default();
        assert_eq!(report.success_rate(), 0.0);
    }
}
