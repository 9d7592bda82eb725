mod logging;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nfse_common::formatter::{format_pending, mask_tax_id};
use nfse_e::backend::WebDriverBackend;
use nfse_e::chromedriver::default_chromedriver_url;
use nfse_engine::config::{ConfigLoader, NfseConfig};
use nfse_engine::mail::prepare_drafts;
use nfse_engine::operator::ConsoleOperator;
use nfse_engine::portal::Credentials;
use nfse_engine::runner::BatchRunner;
use nfse_engine::session::Session;
use nfse_engine::spreadsheet::{InvoiceSheet, pending};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "nfse", version, about = "Emissão assistida de NFS-e a partir da planilha de controle")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: ./nfse.yaml, then ~/.nfse/config.yaml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Emit the pending invoices through the municipal portal
    Emit {
        /// Process at most N pending invoices without asking
        #[arg(short, long)]
        limit: Option<usize>,

        /// External WebDriver URL (chromedriver is launched if not provided)
        #[arg(long)]
        webdriver_url: Option<String>,

        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },
    /// List the invoices still waiting for emission
    Pending,
    /// Prepare e-mail drafts with the emitted PDF/XML files attached
    Drafts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ConfigLoader::load_dotenv();
    let config = ConfigLoader::load(args.config.as_deref())
        .await
        .context("Falha ao carregar a configuração")?;

    let log = logging::init(&config.logging.log_dir, args.verbose);
    info!("Starting nfse v{}", env!("CARGO_PKG_VERSION"));

    let result = match args.command {
        Command::Emit {
            limit,
            webdriver_url,
            headless,
        } => emit(config, limit, webdriver_url, headless, log.path.clone()).await,
        Command::Pending => list_pending(&config),
        Command::Drafts => drafts(&config).await,
    };

    if let Err(e) = &result {
        error!("Command failed: {:#}", e);
    }
    result
}

async fn emit(
    mut config: NfseConfig,
    limit: Option<usize>,
    webdriver_url: Option<String>,
    headless: bool,
    log_file: Option<PathBuf>,
) -> anyhow::Result<()> {
    if headless {
        config.portal.headless = true;
    }

    // A configured server other than the local default is used as is.
    let explicit_url = webdriver_url.or_else(|| {
        (config.portal.webdriver_url != default_chromedriver_url())
            .then(|| config.portal.webdriver_url.clone())
    });
    let backend = match explicit_url {
        Some(url) => WebDriverBackend::with_url(url),
        None => WebDriverBackend::new().with_fallback_url(config.portal.webdriver_url.clone()),
    }
    .headless(config.portal.headless);

    let credentials = Credentials {
        tax_id: config.portal.tax_id.clone(),
        password: config.portal.password.clone(),
    };
    if credentials.is_complete() {
        info!("Login configurado para {}", mask_tax_id(&credentials.tax_id));
    } else {
        warn!("CPF_CNPJ/SENHA não configurados; o login será manual");
    }

    let sheet = InvoiceSheet::from_config(&config.spreadsheet);
    let runner = BatchRunner::new(sheet, credentials)
        .with_limit(limit)
        .with_log_file(log_file);

    let mut session = Session::new(
        Box::new(backend),
        Arc::new(config),
        Box::new(ConsoleOperator::new()),
    );
    let report = runner.run(&mut session).await?;

    // Closing the session ends chromedriver and the browser with it.
    session
        .release_browser("Navegador mantido aberto. Pressione ENTER para encerrar...")
        .await?;

    if report.aborted {
        warn!("Execução interrompida após {} nota(s)", report.processed());
    }
    Ok(())
}

fn list_pending(config: &NfseConfig) -> anyhow::Result<()> {
    let sheet = InvoiceSheet::from_config(&config.spreadsheet);
    let records = sheet
        .load_records()
        .with_context(|| format!("Falha ao ler {}", sheet.path().display()))?;
    print!("{}", format_pending(&pending(&records)));
    Ok(())
}

async fn drafts(config: &NfseConfig) -> anyhow::Result<()> {
    let report = prepare_drafts(&config.mail).await?;
    for path in &report.created {
        println!("Rascunho criado: {}", path.display());
    }
    for (number, reason) in &report.failed {
        println!("Nota {}: {}", number, reason);
    }
    println!(
        "{} rascunho(s) criado(s), {} falha(s) em {}",
        report.created.len(),
        report.failed.len(),
        config.mail.drafts_dir.display()
    );
    Ok(())
}
