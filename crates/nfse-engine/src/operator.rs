//! Console decision points.
//!
//! All prompts block until the operator answers; there is no timeout.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io::{self, Write};
use tokio::io::{AsyncBufReadExt, BufReader};

/// What to do with a record whose form pipeline failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Operator finishes the form by hand; the flow then continues as if
    /// the pipeline had succeeded.
    ContinueManually,
    Skip,
    Abort,
}

/// Answer to "how many records?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountChoice {
    Process(usize),
    Cancel,
}

#[async_trait]
pub trait Operator: Send {
    /// Show a message.
    fn say(&mut self, message: &str);

    /// Show `prompt` and read one line. `None` once input is closed.
    async fn ask(&mut self, prompt: &str) -> Option<String>;

    /// Block until the operator presses ENTER.
    async fn wait_enter(&mut self, prompt: &str) -> bool {
        self.ask(prompt).await.is_some()
    }

    /// Yes/no question. An empty answer or closed input yields `default`.
    async fn confirm(&mut self, question: &str, default: bool) -> bool {
        let suffix = if default { "(S/n)" } else { "(s/N)" };
        match self.ask(&format!("{} {}: ", question, suffix)).await {
            Some(answer) => parse_yes_no(&answer).unwrap_or(default),
            None => default,
        }
    }

    async fn failure_action(&mut self, context: &str) -> FailureAction {
        self.say(context);
        loop {
            let answer = self
                .ask("[1] Terminar manualmente  [2] Pular nota  [3] Abortar execução: ")
                .await;
            let Some(answer) = answer else {
                return FailureAction::Abort;
            };
            if let Some(action) = parse_failure_action(&answer) {
                return action;
            }
            self.say("Opção inválida.");
        }
    }

    async fn ask_count(&mut self, available: usize) -> CountChoice {
        let prompt = "Quantas notas você deseja processar? (Digite um número, 'todas' ou 'cancelar'): ";
        match self.ask(prompt).await {
            Some(answer) => parse_count(&answer, available),
            None => CountChoice::Cancel,
        }
    }

    /// Invoice number typed by hand; blank means "skip".
    async fn ask_invoice_number(&mut self) -> Option<String> {
        let answer = self
            .ask("Digite o número da nota fiscal emitida (deixe em branco para pular): ")
            .await?;
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

pub fn parse_yes_no(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "s" | "sim" | "y" | "yes" => Some(true),
        "n" | "nao" | "não" | "no" => Some(false),
        _ => None,
    }
}

pub fn parse_failure_action(answer: &str) -> Option<FailureAction> {
    match answer.trim().to_lowercase().as_str() {
        "1" | "m" | "manual" => Some(FailureAction::ContinueManually),
        "2" | "p" | "pular" => Some(FailureAction::Skip),
        "3" | "a" | "abortar" => Some(FailureAction::Abort),
        _ => None,
    }
}

/// Numbers are clamped to `1..=available`; anything unreadable means one.
pub fn parse_count(answer: &str, available: usize) -> CountChoice {
    let answer = answer.trim().to_lowercase();
    match answer.as_str() {
        "cancelar" => CountChoice::Cancel,
        "todas" | "todos" => CountChoice::Process(available),
        _ => match answer.parse::<i64>() {
            Ok(n) if n < 1 => CountChoice::Process(1.min(available)),
            Ok(n) => CountChoice::Process((n as usize).min(available)),
            Err(_) => CountChoice::Process(1.min(available)),
        },
    }
}

/// Operator on stdin/stdout.
pub struct ConsoleOperator {
    reader: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
}

impl ConsoleOperator {
    pub fn new() -> Self {
        Self {
            reader: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

impl Default for ConsoleOperator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    fn say(&mut self, message: &str) {
        println!("{}", message);
    }

    async fn ask(&mut self, prompt: &str) -> Option<String> {
        print!("{}", prompt);
        let _ = io::stdout().flush();
        match self.reader.next_line().await {
            Ok(Some(line)) => Some(line.trim().to_string()),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Failed to read operator input: {}", e);
                None
            }
        }
    }
}

/// Operator that replays canned answers. Used by tests and unattended
/// runs; records everything it was shown.
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    answers: VecDeque<String>,
    pub transcript: Vec<String>,
}

impl ScriptedOperator {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            transcript: Vec::new(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

#[async_trait]
impl Operator for ScriptedOperator {
    fn say(&mut self, message: &str) {
        self.transcript.push(message.to_string());
    }

    async fn ask(&mut self, prompt: &str) -> Option<String> {
        self.transcript.push(prompt.to_string());
        self.answers.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count("todas", 4), CountChoice::Process(4));
        assert_eq!(parse_count("CANCELAR", 4), CountChoice::Cancel);
        assert_eq!(parse_count("2", 4), CountChoice::Process(2));
        assert_eq!(parse_count("10", 4), CountChoice::Process(4));
        assert_eq!(parse_count("0", 4), CountChoice::Process(1));
        assert_eq!(parse_count("duas", 4), CountChoice::Process(1));
    }

    #[test]
    fn test_parse_yes_no() {
        assert_eq!(parse_yes_no(" S "), Some(true));
        assert_eq!(parse_yes_no("não"), Some(false));
        assert_eq!(parse_yes_no("talvez"), None);
    }

    #[tokio::test]
    async fn test_failure_action_reprompts() {
        let mut operator = ScriptedOperator::new(["x", "2"]);
        assert_eq!(operator.failure_action("Falhou").await, FailureAction::Skip);
        assert_eq!(operator.remaining(), 0);
    }

    #[tokio::test]
    async fn test_closed_input_aborts() {
        let mut operator = ScriptedOperator::new(Vec::<String>::new());
        assert_eq!(operator.failure_action("Falhou").await, FailureAction::Abort);
        assert!(!operator.confirm("Continuar?", false).await);
    }
}
