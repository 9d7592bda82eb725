//! E-mail drafts carrying the emitted invoice files.
//!
//! Drafts are complete MIME messages written as `.eml` files; sending is
//! left to the operator's mail client.

use crate::config::MailConfig;
use chrono::{Datelike, FixedOffset, Local, Timelike, Utc};
use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{debug, info, warn};

static INVOICE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{4})_(\d+)(?: - .+)?\.(pdf|xml)$").unwrap());
static PDF_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)n[uú]mero da nfs-?e[:\s]*([0-9]+)").unwrap());

/// Brasília time, used for the greeting.
const BRT_OFFSET_SECS: i32 = 3 * 3600;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid address {address:?}: {message}")]
    Address { address: String, message: String },
    #[error("No sender configured (mail.sender)")]
    MissingSender,
    #[error("Cannot build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("Contacts sheet {path}: {message}")]
    Contacts { path: PathBuf, message: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> MailError + '_ {
    move |source| MailError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub number: u64,
    pub email: String,
    pub company: String,
}

/// Group `<year>_<number>[ - suffix].pdf|.xml` files by invoice number.
pub async fn collect_invoice_files(dir: &Path) -> Result<BTreeMap<u64, Vec<PathBuf>>, MailError> {
    let mut files: BTreeMap<u64, Vec<PathBuf>> = BTreeMap::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error(dir))?;

    while let Some(entry) = entries.next_entry().await.map_err(io_error(dir))? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(caps) = INVOICE_FILE.captures(&name) else {
            debug!("Ignorando {}", name);
            continue;
        };
        match caps[2].parse::<u64>() {
            Ok(number) => files.entry(number).or_default().push(path),
            Err(_) => warn!("Número inválido em {}", name),
        }
    }

    for paths in files.values_mut() {
        paths.sort();
    }
    info!("{} nota(s) com arquivos em {}", files.len(), dir.display());
    Ok(files)
}

/// Invoice number from the `numero_nfse` element of a portal XML.
pub fn number_from_xml(content: &str) -> Option<u64> {
    let doc = roxmltree::Document::parse(content).ok()?;
    doc.descendants()
        .find(|node| node.tag_name().name() == "numero_nfse")
        .and_then(|node| node.text())
        .map(str::trim)
        .filter(|text| !text.is_empty() && text.chars().all(|c| c.is_ascii_digit()))
        .and_then(|text| text.parse().ok())
}

/// Invoice number printed after "Número da NFS-e" in the PDF text.
pub fn number_from_pdf_text(text: &str) -> Option<u64> {
    PDF_NUMBER
        .captures(text)
        .and_then(|caps| caps[1].parse().ok())
}

/// `<year>_<number>[ - <company>].<ext>`
pub fn invoice_file_name(year: i32, number: u64, company: Option<&str>, ext: &str) -> String {
    let company = company
        .map(|c| c.replace(['/', '\\', ':'], "-"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    match company {
        Some(company) => format!("{}_{} - {}.{}", year, number, company, ext),
        None => format!("{}_{}.{}", year, number, ext),
    }
}

async fn number_from_file(path: &Path, ext: &str) -> Option<u64> {
    match ext {
        "xml" => {
            let content = tokio::fs::read_to_string(path).await.ok()?;
            number_from_xml(&content)
        }
        "pdf" => {
            let owned = path.to_path_buf();
            let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text(&owned))
                .await
                .ok()?
                .map_err(|e| debug!("Texto do PDF {} ilegível: {}", path.display(), e))
                .ok()?;
            number_from_pdf_text(&text)
        }
        _ => None,
    }
}

/// Rename invoice files as downloaded from the portal to
/// `<year>_<number> - <company>.<ext>`, then group them like
/// [`collect_invoice_files`].
///
/// The number comes from the `numero_nfse` tag of XMLs and from the
/// "Número da NFS-e" text of PDFs. Files already named that way are left
/// alone; files without a readable number are skipped with a warning.
pub async fn rename_invoice_files(
    dir: &Path,
    companies: &HashMap<u64, String>,
) -> Result<BTreeMap<u64, Vec<PathBuf>>, MailError> {
    let year = Local::now().year();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_error(dir))?;

    while let Some(entry) = entries.next_entry().await.map_err(io_error(dir))? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if INVOICE_FILE.is_match(&name) {
            continue;
        }
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if ext != "xml" && ext != "pdf" {
            continue;
        }
        let Some(number) = number_from_file(&path, &ext).await else {
            warn!("Número da nota não encontrado em {}", name);
            continue;
        };

        let target_name = invoice_file_name(
            year,
            number,
            companies.get(&number).map(String::as_str),
            &ext,
        );
        let target = free_file_path(dir, &target_name);
        tokio::fs::rename(&path, &target)
            .await
            .map_err(io_error(&path))?;
        info!("{} renomeado para {}", name, target.display());
    }

    collect_invoice_files(dir).await
}

/// `dir/name`, or `dir/<stem>_N.<ext>` when that is taken.
fn free_file_path(dir: &Path, name: &str) -> PathBuf {
    let first = dir.join(name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name, ""));
    (2..)
        .map(|n| dir.join(format!("{}_{}.{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Read `Numero`, `Email` and `Empresa (reduzido)` from the first sheet,
/// header on row 1. Rows without a numeric invoice number are dropped.
pub fn load_contacts(path: &Path) -> Result<Vec<Contact>, MailError> {
    let contacts_error = |message: String| MailError::Contacts {
        path: path.to_path_buf(),
        message,
    };
    let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|e| contacts_error(e.to_string()))?;
    let sheet = book
        .get_sheet(&0)
        .ok_or_else(|| contacts_error("no worksheet".to_string()))?;

    let column = |caption: &str| {
        (1..=sheet.get_highest_column()).find(|col| sheet.get_value((*col, 1)).trim() == caption)
    };
    let (Some(number_col), Some(email_col), Some(company_col)) =
        (column("Numero"), column("Email"), column("Empresa (reduzido)"))
    else {
        return Err(contacts_error(
            "expected columns Numero, Email, Empresa (reduzido)".to_string(),
        ));
    };

    let mut contacts = Vec::new();
    for row in 2..=sheet.get_highest_row() {
        let raw_number = sheet.get_value((number_col, row));
        let Some(number) = parse_invoice_number(&raw_number) else {
            continue;
        };
        contacts.push(Contact {
            number,
            email: sheet.get_value((email_col, row)).trim().to_string(),
            company: sheet.get_value((company_col, row)).trim().to_string(),
        });
    }
    Ok(contacts)
}

fn parse_invoice_number(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|n| n.is_finite() && *n >= 0.0 && n.fract() == 0.0)
            .map(|n| n as u64)
    })
}

pub fn greeting(hour: u32) -> &'static str {
    match hour {
        0..=11 => "Bom dia",
        12..=17 => "Boa tarde",
        _ => "Boa noite",
    }
}

fn current_greeting() -> &'static str {
    let hour = FixedOffset::west_opt(BRT_OFFSET_SECS)
        .map(|tz| Utc::now().with_timezone(&tz).hour())
        .unwrap_or_else(|| Local::now().hour());
    greeting(hour)
}

/// Values substituted into the subject and body templates.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars<'a> {
    pub company: &'a str,
    pub number: u64,
    pub greeting: &'a str,
    pub files: &'a [PathBuf],
}

/// Replace `{empresa}`, `{numero}`, `{saudacao}` and `{arquivos}`. The
/// uppercase `{{SAUDACAO}}`, `{{NUMERO_NOTA}}` and `{{ARQUIVO}}` forms are
/// accepted too.
pub fn render_template(template: &str, vars: &TemplateVars<'_>) -> String {
    let number = vars.number.to_string();
    let files = vars
        .files
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(", ");

    template
        .replace("{{SAUDACAO}}", vars.greeting)
        .replace("{{NUMERO_NOTA}}", &number)
        .replace("{{ARQUIVO}}", &files)
        .replace("{empresa}", vars.company)
        .replace("{numero}", &number)
        .replace("{saudacao}", vars.greeting)
        .replace("{arquivos}", &files)
}

fn content_type_for(path: &Path) -> ContentType {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "pdf" => "application/pdf",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    };
    ContentType::parse(mime).unwrap_or(ContentType::TEXT_PLAIN)
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "rascunho".to_string()
    } else {
        trimmed.chars().take(80).collect()
    }
}

/// Writes MIME drafts into a folder.
pub struct DraftComposer {
    drafts_dir: PathBuf,
    sender: Option<Mailbox>,
}

impl DraftComposer {
    pub fn new(drafts_dir: impl Into<PathBuf>, sender: &str) -> Result<Self, MailError> {
        let sender = if sender.trim().is_empty() {
            None
        } else {
            Some(parse_mailbox(sender)?)
        };
        Ok(Self {
            drafts_dir: drafts_dir.into(),
            sender,
        })
    }

    pub fn drafts_dir(&self) -> &Path {
        &self.drafts_dir
    }

    /// Build an HTML message with the given attachments and save it as
    /// `<subject>.eml`. Existing drafts are never overwritten.
    pub async fn create_draft(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        attachments: &[PathBuf],
    ) -> Result<PathBuf, MailError> {
        let from = self.sender.clone().ok_or(MailError::MissingSender)?;
        let to = parse_mailbox(to)?;

        let mut body = MultiPart::mixed().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(html_body.to_string()),
        );
        for path in attachments {
            let content = tokio::fs::read(path).await.map_err(io_error(path))?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "anexo".to_string());
            body = body.singlepart(Attachment::new(name).body(content, content_type_for(path)));
        }

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(body)?;

        tokio::fs::create_dir_all(&self.drafts_dir)
            .await
            .map_err(io_error(&self.drafts_dir))?;
        let path = self.free_path(&sanitize_file_name(subject));
        tokio::fs::write(&path, message.formatted())
            .await
            .map_err(io_error(&path))?;
        info!("Rascunho salvo: {}", path.display());
        Ok(path)
    }

    fn free_path(&self, stem: &str) -> PathBuf {
        let first = self.drafts_dir.join(format!("{}.eml", stem));
        if !first.exists() {
            return first;
        }
        (2..)
            .map(|n| self.drafts_dir.join(format!("{}_{}.eml", stem, n)))
            .find(|p| !p.exists())
            .unwrap_or(first)
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.trim().parse::<Mailbox>().map_err(|e| MailError::Address {
        address: address.to_string(),
        message: e.to_string(),
    })
}

#[derive(Debug, Default)]
pub struct DraftReport {
    pub created: Vec<PathBuf>,
    /// Invoice number and reason.
    pub failed: Vec<(u64, String)>,
}

/// One draft per contact whose invoice files are present in the input
/// folder.
pub async fn prepare_drafts(config: &MailConfig) -> Result<DraftReport, MailError> {
    let template = tokio::fs::read_to_string(&config.template_path)
        .await
        .map_err(io_error(&config.template_path))?;
    let contacts = load_contacts(&config.contacts_path)?;
    let companies: HashMap<u64, String> = contacts
        .iter()
        .filter(|c| !c.company.is_empty())
        .map(|c| (c.number, c.company.clone()))
        .collect();
    let files = rename_invoice_files(&config.input_dir, &companies).await?;
    let composer = DraftComposer::new(&config.drafts_dir, &config.sender)?;
    let greeting = current_greeting();

    let mut report = DraftReport::default();
    for contact in contacts {
        if !contact.email.contains('@') {
            warn!("E-mail inválido para nota {}: {:?}", contact.number, contact.email);
            report.failed.push((contact.number, "e-mail inválido".to_string()));
            continue;
        }
        let Some(attachments) = files.get(&contact.number) else {
            warn!("Nenhum arquivo para nota {}", contact.number);
            report.failed.push((contact.number, "sem arquivos".to_string()));
            continue;
        };

        let vars = TemplateVars {
            company: &contact.company,
            number: contact.number,
            greeting,
            files: attachments,
        };
        let subject = render_template(&config.subject, &vars);
        let body = render_template(&template, &vars);
        match composer
            .create_draft(&contact.email, &subject, &body, attachments)
            .await
        {
            Ok(path) => report.created.push(path),
            Err(MailError::MissingSender) => return Err(MailError::MissingSender),
            Err(e) => {
                warn!("Falha no rascunho da nota {}: {}", contact.number, e);
                report.failed.push((contact.number, e.to_string()));
            }
        }
    }
    info!(
        "Rascunhos criados: {}, falhas: {}",
        report.created.len(),
        report.failed.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_file_pattern() {
        let caps = INVOICE_FILE.captures("2025_123 - ACME.pdf").unwrap();
        assert_eq!(&caps[2], "123");
        assert!(INVOICE_FILE.is_match("2025_77.XML"));
        assert!(!INVOICE_FILE.is_match("nota_77.pdf"));
        assert!(!INVOICE_FILE.is_match("2025_77.docx"));
    }

    #[test]
    fn test_number_from_xml() {
        let xml = r#"<?xml version="1.0"?>
<nfse xmlns="http://www.abrasf.org.br/nfse">
  <dados><numero_nfse> 345 </numero_nfse></dados>
</nfse>"#;
        assert_eq!(number_from_xml(xml), Some(345));
        assert_eq!(number_from_xml("<nfse><numero_nfse>A1</numero_nfse></nfse>"), None);
        assert_eq!(number_from_xml("<nfse><numero>1</numero></nfse>"), None);
        assert_eq!(number_from_xml("nao e xml"), None);
    }

    #[test]
    fn test_number_from_pdf_text() {
        assert_eq!(number_from_pdf_text("Prefeitura\nNúmero da NFS-e: 2025\n"), Some(2025));
        assert_eq!(number_from_pdf_text("NUMERO DA NFSE 77"), Some(77));
        assert_eq!(number_from_pdf_text("Nota sem número"), None);
    }

    #[test]
    fn test_invoice_file_name() {
        assert_eq!(invoice_file_name(2025, 12, Some("ACME"), "pdf"), "2025_12 - ACME.pdf");
        assert_eq!(invoice_file_name(2025, 12, Some("A/B"), "xml"), "2025_12 - A-B.xml");
        assert_eq!(invoice_file_name(2025, 12, Some("  "), "xml"), "2025_12.xml");
        assert_eq!(invoice_file_name(2025, 12, None, "pdf"), "2025_12.pdf");
        assert!(INVOICE_FILE.is_match(&invoice_file_name(2025, 12, Some("ACME"), "pdf")));
    }

    #[test]
    fn test_greeting() {
        assert_eq!(greeting(8), "Bom dia");
        assert_eq!(greeting(12), "Boa tarde");
        assert_eq!(greeting(19), "Boa noite");
    }

    #[test]
    fn test_render_template() {
        let files = vec![PathBuf::from("/x/2025_12 - ACME.pdf")];
        let vars = TemplateVars {
            company: "ACME",
            number: 12,
            greeting: "Bom dia",
            files: &files,
        };
        assert_eq!(
            render_template("{saudacao}, {empresa}: nota {numero} ({arquivos})", &vars),
            "Bom dia, ACME: nota 12 (2025_12 - ACME.pdf)"
        );
        assert_eq!(
            render_template("{{SAUDACAO}} {{NUMERO_NOTA}}", &vars),
            "Bom dia 12"
        );
    }

    #[test]
    fn test_parse_invoice_number() {
        assert_eq!(parse_invoice_number("12"), Some(12));
        assert_eq!(parse_invoice_number("12.0"), Some(12));
        assert_eq!(parse_invoice_number("abc"), None);
        assert_eq!(parse_invoice_number("1.5"), None);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Nota Fiscal ACME - NFS-e 12"), "Nota_Fiscal_ACME_-_NFS-e_12");
        assert_eq!(sanitize_file_name("///"), "rascunho");
    }
}
