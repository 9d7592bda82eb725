use crate::stages::StageKind;
use nfse_common::protocol::TargetSpec;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NfseConfig {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub spreadsheet: SpreadsheetConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_portal_url")]
    pub url: String,
    /// Page the operator lands on after login and CAPTCHA.
    #[serde(default = "default_home_url")]
    pub home_url: String,
    /// Fragment of `home_url` that identifies the logged-in area.
    #[serde(default = "default_destination_fragment")]
    pub destination_fragment: String,
    #[serde(default)]
    pub tax_id: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub headless: bool,
    /// Stages after which the wizard's "Próximo" button is pressed.
    #[serde(default)]
    pub advance_after: Vec<StageKind>,
    #[serde(default)]
    pub targets: PortalTargets,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: default_portal_url(),
            home_url: default_home_url(),
            destination_fragment: default_destination_fragment(),
            tax_id: String::new(),
            password: String::new(),
            webdriver_url: default_webdriver_url(),
            headless: false,
            advance_after: Vec::new(),
            targets: PortalTargets::default(),
        }
    }
}

fn default_portal_url() -> String {
    "https://nfse-cachoeirinha.atende.net/autoatendimento/servicos/nfse?redirected=1".to_string()
}

fn default_home_url() -> String {
    "https://nfse-cachoeirinha.atende.net/?rot=1&aca=1#!/sistema/66".to_string()
}

fn default_destination_fragment() -> String {
    "#!/sistema/66".to_string()
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".to_string()
}

/// Selector strategies for every logical field the flow touches.
///
/// Targets containing `{code}`, `{tax_id}` or `{company}` are filled in at
/// run time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalTargets {
    pub login_tax_id: TargetSpec,
    pub login_password: TargetSpec,
    pub login_button: TargetSpec,
    pub login_error: TargetSpec,
    pub access_fiscal: TargetSpec,
    pub notice_close: TargetSpec,
    pub emit_invoice: TargetSpec,
    pub next: TargetSpec,
    pub payer_type: TargetSpec,
    pub payer_search: TargetSpec,
    pub payer_result: TargetSpec,
    pub local_of_service: TargetSpec,
    pub service_code: TargetSpec,
    pub service_option: TargetSpec,
    pub value: TargetSpec,
    pub description: TargetSpec,
    pub alt_address_toggle: TargetSpec,
    pub postal_code: TargetSpec,
    pub street: TargetSpec,
    pub street_number: TargetSpec,
    pub complement: TargetSpec,
    pub district: TargetSpec,
    pub tax_ir: TargetSpec,
    pub tax_pis: TargetSpec,
    pub tax_cofins: TargetSpec,
    pub tax_csll: TargetSpec,
    pub net_value: TargetSpec,
    pub emit: TargetSpec,
    pub invoice_number: TargetSpec,
}

impl Default for PortalTargets {
    fn default() -> Self {
        Self {
            login_tax_id: TargetSpec::new()
                .css("input[name='login_usuario']")
                .css("input[type='text'][name*='login']")
                .css("input[type='text'][id*='cpf']"),
            login_password: TargetSpec::new()
                .css("input[name='senha_usuario']")
                .css("input[type='password']"),
            login_button: TargetSpec::new()
                .css("button.btn-login")
                .css("#btnLogin")
                .css("button[type='submit']")
                .text("Entrar"),
            login_error: TargetSpec::new()
                .css(".mensagem-erro")
                .css("[role='alert']")
                .css(".toast-error"),
            access_fiscal: TargetSpec::new()
                .css("a.link_acesso_fiscal")
                .css("a[onclick*='onClickAcessoFiscal']")
                .css("[title='Acessar']")
                .xpath("//a[contains(text(), 'Acessar')] | //button[contains(text(), 'Acessar')]")
                .text("Acessar"),
            notice_close: TargetSpec::new()
                .css("button[name='fechar']")
                .css("button[myaccesskey='f']")
                .xpath("//button[contains(text(), 'Fechar')]"),
            emit_invoice: TargetSpec::new()
                .css("a[onclick*='emitirNota']")
                .css("button[name='emitirNota']")
                .css("a[title='Emitir Nota Fiscal']")
                .css("button[title='Emitir Nota Fiscal']")
                .text("Emitir Nota Fiscal"),
            next: TargetSpec::new()
                .css("button[name='botao_proximo']")
                .css("button.estrutura_botao_janela_proximo")
                .css("button[myaccesskey='p']")
                .css("button[title*='Próximo']")
                .xpath("//button[normalize-space()='Próximo']")
                .text("Próximo")
                .exact_text("Próximo"),
            payer_type: TargetSpec::new()
                .xpath("//select[@name='tipoTomador']/option[contains(., 'Pessoa Jurídica')]")
                .xpath("//select[@aria-label='Tipo do Tomador']/option[contains(., 'Pessoa Jurídica')]"),
            payer_search: TargetSpec::new()
                .css("input[name='Tomador.nomeRazao']")
                .css("input[placeholder*='Pesquisar por nome ou CNPJ']")
                .css("input[name*='Tomador'][name*='nomeRazao']"),
            payer_result: TargetSpec::new()
                .xpath("//tr[contains(., '{tax_id}')]")
                .xpath("//td[@name='nomeRazao'][contains(., '{company}')]")
                .text("{company}")
                .text_scope("table.tabela-resultado tr, div.resultado-pesquisa, td[name='nomeRazao'], tr[onclick*='selecionar']"),
            local_of_service: TargetSpec::new()
                .css("input[name='LocalPrestacao.codigoReceita']")
                .css("input[aria-label='Local da Prestação']")
                .css("input[name*='LocalPrestacao']")
                .xpath("//label[contains(text(), 'Local')]/following::input[1]"),
            service_code: TargetSpec::new()
                .css("select[name='ListaServico.codigo']")
                .css("select[aria-label='Lista de Serviço']")
                .css("select[name*='servico']")
                .xpath("//label[contains(text(), 'Serviço')]/following::select[1]"),
            service_option: TargetSpec::new()
                .css("select[name='ListaServico.codigo'] option[value='{code}']")
                .xpath("//select[contains(@name, 'ervico')]/option[contains(., '{code}')]"),
            value: TargetSpec::new()
                .css("input[name='valorServico']")
                .css("input[aria-label='Valor do Serviço']")
                .xpath("//label[contains(text(), 'Valor')]/following::input[1]"),
            description: TargetSpec::new()
                .css("textarea[aria-label='Discriminação do Serviço']")
                .css("textarea[name*='discriminacao']")
                .css("textarea[name*='descricao']")
                .xpath("//label[contains(text(), 'Discriminação')]/following::textarea[1]"),
            alt_address_toggle: TargetSpec::new()
                .css("input[name='usaEnderecoAlternativo']")
                .css("input[aria-label='Endereço Alternativo']")
                .xpath("//label[contains(., 'Endereço Alternativo')]//input"),
            postal_code: TargetSpec::new()
                .css("input[name='InformacoesTomador.cep']")
                .css("input[aria-label='CEP']"),
            street: TargetSpec::new()
                .css("input[name='InformacoesTomador.logradouro']")
                .css("input[aria-label='Logradouro']"),
            street_number: TargetSpec::new()
                .css("input[name='InformacoesTomador.numero']")
                .css("input[aria-label='Número']"),
            complement: TargetSpec::new()
                .css("input[name='InformacoesTomador.complemento']")
                .css("input[aria-label='Complemento']"),
            district: TargetSpec::new()
                .css("input[name='InformacoesTomador.bairro']")
                .css("input[aria-label='Bairro']"),
            tax_ir: TargetSpec::new()
                .css("input[name='Valores.tributoFederalIr']")
                .css("input[aria-label*='IR']"),
            tax_pis: TargetSpec::new()
                .css("input[name='Valores.tributoFederalPis']")
                .css("input[aria-label*='PIS']"),
            tax_cofins: TargetSpec::new()
                .css("input[name='Valores.tributoFederalCofins']")
                .css("input[aria-label*='COFINS']"),
            tax_csll: TargetSpec::new()
                .css("input[name='Valores.tributoFederalContribuicaoSocial']")
                .css("input[aria-label*='Contribuição Social']"),
            net_value: TargetSpec::new()
                .css("input[name='Valores.valorLiquido']")
                .css("input[aria-label='Valor Líquido']"),
            emit: TargetSpec::new()
                .css("button[name='confirmar']")
                .css("button.estrutura_botao_colorido")
                .css("button[myaccesskey='e']")
                .css("button[name='emitir']")
                .text("Emitir")
                .exact_text("Emitir"),
            invoice_number: TargetSpec::new()
                .css("input[name*='numero']")
                .css("span[id*='numero']")
                .css("div[id*='numero']")
                .css("span[class*='numero']")
                .xpath("//span[contains(text(), 'Número da nota')]//following-sibling::*")
                .xpath("//div[contains(text(), 'NFS-e:')]//following-sibling::*"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpreadsheetConfig {
    #[serde(default = "default_sheet_path")]
    pub path: PathBuf,
    /// 1-based row holding the column headers.
    #[serde(default = "default_header_row")]
    pub header_row: u32,
    #[serde(default)]
    pub columns: ColumnNames,
}

impl Default for SpreadsheetConfig {
    fn default() -> Self {
        Self {
            path: default_sheet_path(),
            header_row: default_header_row(),
            columns: ColumnNames::default(),
        }
    }
}

fn default_sheet_path() -> PathBuf {
    PathBuf::from("notas.xlsx")
}

fn default_header_row() -> u32 {
    3
}

/// Header captions used to find each column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub company_name: String,
    pub tax_id: String,
    pub street: String,
    pub number: String,
    pub complement: String,
    pub district: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub description: String,
    pub gross_value: String,
    pub ir: String,
    pub pis: String,
    pub cofins: String,
    pub csll: String,
    pub net_value: String,
    pub due_day: String,
    pub due_month: String,
    pub due_year: String,
    pub installment: String,
    pub purchase_order: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            company_name: "Empresa - Razão Social".to_string(),
            tax_id: "CNPJ".to_string(),
            street: "Endereço".to_string(),
            number: "Número".to_string(),
            complement: "Complemento".to_string(),
            district: "BAIRRO".to_string(),
            city: "Município".to_string(),
            state: "Estado".to_string(),
            postal_code: "CEP".to_string(),
            description: "Descrição".to_string(),
            gross_value: "Total".to_string(),
            ir: "IRRF(1,5%) ou (4,8%)".to_string(),
            pis: "PIS (0,65%)".to_string(),
            cofins: "Cofins (3%)".to_string(),
            csll: "Contr. Social - CSLL (1%)".to_string(),
            net_value: "Líquido".to_string(),
            due_day: "Dia Venc.".to_string(),
            due_month: "Mês Venc.".to_string(),
            due_year: "Ano Venc.".to_string(),
            installment: "Parcela".to_string(),
            purchase_order: "Pedido".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_local_code")]
    pub local_code: String,
    #[serde(default = "default_service_code")]
    pub service_code: String,
    #[serde(default = "default_description")]
    pub default_description: String,
    #[serde(default = "default_payment_lines")]
    pub payment_lines: Vec<String>,
    /// Ask the operator before pressing the final emit button.
    #[serde(default = "default_confirm_before_emit")]
    pub confirm_before_emit: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            local_code: default_local_code(),
            service_code: default_service_code(),
            default_description: default_description(),
            payment_lines: default_payment_lines(),
            confirm_before_emit: default_confirm_before_emit(),
        }
    }
}

fn default_local_code() -> String {
    "8561".to_string()
}

fn default_service_code() -> String {
    "1701".to_string()
}

fn default_description() -> String {
    "Serviços de consultoria empresarial.".to_string()
}

fn default_payment_lines() -> Vec<String> {
    vec!["DADOS PARA PIX OU DEPÓSITO:".to_string()]
}

fn default_confirm_before_emit() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Attempts per click method before falling through.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_retry_pause_ms")]
    pub retry_pause_ms: u64,
    /// How long a target may take to appear before the cascade gives up.
    #[serde(default = "default_find_timeout_ms")]
    pub find_timeout_ms: u64,
    #[serde(default = "default_settle_timeout_ms")]
    pub settle_timeout_ms: u64,
    #[serde(default = "default_poll_initial_ms")]
    pub poll_initial_ms: u64,
    #[serde(default = "default_poll_max_ms")]
    pub poll_max_ms: u64,
    #[serde(default = "default_poll_factor")]
    pub poll_factor: f64,
    #[serde(default = "default_keystroke_min_ms")]
    pub keystroke_min_ms: u64,
    #[serde(default = "default_keystroke_max_ms")]
    pub keystroke_max_ms: u64,
    #[serde(default = "default_typing_pause_min_ms")]
    pub typing_pause_min_ms: u64,
    #[serde(default = "default_typing_pause_max_ms")]
    pub typing_pause_max_ms: u64,
    #[serde(default = "default_destination_timeout_secs")]
    pub destination_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_pause_ms: default_retry_pause_ms(),
            find_timeout_ms: default_find_timeout_ms(),
            settle_timeout_ms: default_settle_timeout_ms(),
            poll_initial_ms: default_poll_initial_ms(),
            poll_max_ms: default_poll_max_ms(),
            poll_factor: default_poll_factor(),
            keystroke_min_ms: default_keystroke_min_ms(),
            keystroke_max_ms: default_keystroke_max_ms(),
            typing_pause_min_ms: default_typing_pause_min_ms(),
            typing_pause_max_ms: default_typing_pause_max_ms(),
            destination_timeout_secs: default_destination_timeout_secs(),
        }
    }
}

impl TimingConfig {
    pub fn retry_pause(&self) -> Duration {
        Duration::from_millis(self.retry_pause_ms)
    }

    pub fn find_timeout(&self) -> Duration {
        Duration::from_millis(self.find_timeout_ms)
    }

    pub fn settle_timeout(&self) -> Duration {
        Duration::from_millis(self.settle_timeout_ms)
    }

    pub fn destination_timeout(&self) -> Duration {
        Duration::from_secs(self.destination_timeout_secs)
    }

    /// Near-zero pauses. Missing elements fail on the first pass and a
    /// settle check still gets a few polls.
    pub fn fast() -> Self {
        Self {
            retry_pause_ms: 0,
            find_timeout_ms: 0,
            settle_timeout_ms: 200,
            poll_initial_ms: 1,
            poll_max_ms: 5,
            keystroke_min_ms: 0,
            keystroke_max_ms: 0,
            typing_pause_min_ms: 0,
            typing_pause_max_ms: 0,
            destination_timeout_secs: 0,
            ..Self::default()
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_pause_ms() -> u64 {
    1000
}

fn default_find_timeout_ms() -> u64 {
    10000
}

fn default_settle_timeout_ms() -> u64 {
    10000
}

fn default_poll_initial_ms() -> u64 {
    100
}

fn default_poll_max_ms() -> u64 {
    2000
}

fn default_poll_factor() -> f64 {
    2.0
}

fn default_keystroke_min_ms() -> u64 {
    50
}

fn default_keystroke_max_ms() -> u64 {
    150
}

fn default_typing_pause_min_ms() -> u64 {
    200
}

fn default_typing_pause_max_ms() -> u64 {
    500
}

fn default_destination_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Folder holding the emitted PDF/XML files.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_drafts_dir")]
    pub drafts_dir: PathBuf,
    #[serde(default = "default_template_path")]
    pub template_path: PathBuf,
    #[serde(default = "default_contacts_path")]
    pub contacts_path: PathBuf,
    #[serde(default)]
    pub sender: String,
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            drafts_dir: default_drafts_dir(),
            template_path: default_template_path(),
            contacts_path: default_contacts_path(),
            sender: String::new(),
            subject: default_subject(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("entrada")
}

fn default_drafts_dir() -> PathBuf {
    PathBuf::from("rascunhos")
}

fn default_template_path() -> PathBuf {
    PathBuf::from("layout_email.txt")
}

fn default_contacts_path() -> PathBuf {
    PathBuf::from("informacoes_notas.xlsx")
}

fn default_subject() -> String {
    "Nota Fiscal {empresa} - NFS-e {numero}".to_string()
}
