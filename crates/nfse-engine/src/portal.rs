//! Portal navigation around the emission form: login, landing page and
//! reading the emitted invoice number.

use crate::error::EngineError;
use crate::session::Session;
use crate::wait::{Backoff, Poller};
use nfse_common::formatter::mask_tax_id;
use nfse_common::protocol::{LocatorKind, SubmitKey, TargetSpec};
use nfse_common::record::InvoiceRecord;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, error, info, warn};

static INVOICE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3,}\b").unwrap());

static BODY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)Número da nota[:\s]+(\d{3,})",
        r"(?i)NFS-e[:\s]+(\d{3,})",
        r"(?i)Nota Fiscal[:\s]+(\d{3,})",
        r"(?i)Número[:\s]+(\d{3,})",
        r"(?i)emitida com sucesso[.\s]*(\d{3,})",
        r"(?i)gerada com sucesso[.\s]*(\d{3,})",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

/// Short bound for optional elements such as the landing notice.
const OPTIONAL_WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct Credentials {
    pub tax_id: String,
    pub password: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.tax_id.trim().is_empty() && !self.password.is_empty()
    }
}

pub async fn open_portal(session: &mut Session) -> Result<bool, EngineError> {
    let url = session.config.portal.url.clone();
    info!("Acessando {}", url);
    let nav = session.backend.navigate(&url).await?;
    debug!("Página: {} ({})", nav.title, nav.url);
    Ok(session.locator().settle(None).await?)
}

/// Fill tax ID and password, press the login button and look for an
/// error banner.
pub async fn login(session: &mut Session, credentials: &Credentials) -> Result<bool, EngineError> {
    let config = session.config.clone();
    let targets = &config.portal.targets;
    info!("Login com {}", mask_tax_id(&credentials.tax_id));

    let mut locator = session.locator();
    if !locator
        .fill(&targets.login_tax_id, &credentials.tax_id, None)
        .await?
        .success
    {
        error!("Campo de CPF/CNPJ não encontrado");
        return Ok(false);
    }
    if !locator
        .fill(&targets.login_password, &credentials.password, None)
        .await?
        .success
    {
        error!("Campo de senha não encontrado");
        return Ok(false);
    }
    if !locator.click(&targets.login_button).await?.success {
        error!("Botão de login não encontrado");
        return Ok(false);
    }

    if let Some(banner) = locator
        .find_visible_within(&targets.login_error, Duration::ZERO)
        .await?
    {
        let message = session.backend.text(&banner).await.unwrap_or_default();
        let message = message.trim();
        if !message.is_empty() {
            error!("Portal recusou o login: {}", message);
            return Err(EngineError::Login(message.to_string()));
        }
    }
    info!("Login enviado");
    Ok(true)
}

pub async fn access_fiscal_area(session: &mut Session) -> Result<bool, EngineError> {
    let config = session.config.clone();
    let outcome = session
        .locator()
        .click(&config.portal.targets.access_fiscal)
        .await?;
    if !outcome.success {
        warn!("Botão Acessar não encontrado");
    }
    Ok(outcome.success)
}

/// Hand the browser to the operator until the CAPTCHA is solved.
pub async fn await_captcha(session: &mut Session) -> Result<(), EngineError> {
    session
        .operator
        .say("\nResolva o CAPTCHA no navegador e faça o login, se necessário.");
    if session
        .operator
        .wait_enter("Pressione ENTER depois de resolver o CAPTCHA para continuar...")
        .await
    {
        Ok(())
    } else {
        Err(EngineError::InputClosed)
    }
}

/// Poll the current URL until it contains the destination fragment.
pub async fn wait_for_destination(session: &mut Session) -> Result<bool, EngineError> {
    let config = session.config.clone();
    let fragment = &config.portal.destination_fragment;
    let timing = &config.timing;
    info!(
        "Aguardando página de destino ({}), até {}s",
        fragment, timing.destination_timeout_secs
    );

    let backoff = Backoff {
        initial: Duration::from_millis(timing.poll_initial_ms),
        max: Duration::from_secs(5).max(Duration::from_millis(timing.poll_max_ms)),
        factor: timing.poll_factor.max(1.0),
    };
    let mut poller = Poller::new(timing.destination_timeout(), backoff);
    loop {
        match session.backend.current_url().await {
            Ok(url) if url.contains(fragment.as_str()) => {
                info!("Página de destino alcançada: {}", url);
                return Ok(true);
            }
            Ok(url) => debug!("URL atual: {}", url),
            Err(e) if e.is_recoverable() => debug!("URL indisponível: {}", e),
            Err(e) => return Err(e.into()),
        }
        if !poller.wait().await {
            error!("Tempo esgotado aguardando {}", fragment);
            session.capture("timeout_pagina_destino").await;
            return Ok(false);
        }
    }
}

/// Close the landing notice if one shows up.
pub async fn dismiss_notice(session: &mut Session) -> Result<bool, EngineError> {
    let config = session.config.clone();
    let target = &config.portal.targets.notice_close;
    let mut locator = session.locator();
    if locator.find_visible_within(target, OPTIONAL_WAIT).await?.is_none() {
        debug!("Nenhum aviso para fechar");
        return Ok(false);
    }
    let closed = locator.click(target).await?.success;
    if closed {
        info!("Aviso fechado");
    }
    Ok(closed)
}

/// From the logged-in area to a blank emission form with the payer
/// selected.
pub async fn open_emission_form(
    session: &mut Session,
    record: &InvoiceRecord,
) -> Result<bool, EngineError> {
    let config = session.config.clone();
    let targets = &config.portal.targets;

    let steps: [(&str, &TargetSpec); 3] = [
        ("Emitir Nota Fiscal", &targets.emit_invoice),
        ("Próximo", &targets.next),
        ("Pessoa Jurídica", &targets.payer_type),
    ];
    for (name, target) in steps {
        if !session.locator().click(target).await?.success {
            error!("Falha ao acionar {}", name);
            return Ok(false);
        }
    }

    let tax_id = record.tax_id_digits();
    info!("Buscando tomador {}", mask_tax_id(&tax_id));
    if !session
        .locator()
        .fill(&targets.payer_search, &tax_id, Some(SubmitKey::Enter))
        .await?
        .success
    {
        error!("Campo de busca do tomador não encontrado");
        return Ok(false);
    }

    let company = record.company().to_uppercase();
    let result_target = targets
        .payer_result
        .substitute("tax_id", &tax_id)
        .substitute("company", &company);
    if session.locator().click(&result_target).await?.success {
        info!("Tomador selecionado");
        Ok(true)
    } else {
        warn!("Tomador {} não encontrado nos resultados", mask_tax_id(&tax_id));
        Ok(false)
    }
}

/// Navigate back to the logged-in area when the browser has left it.
pub async fn return_to_home(session: &mut Session) -> Result<bool, EngineError> {
    let config = session.config.clone();
    let url = session.backend.current_url().await?;
    if url.contains(config.portal.destination_fragment.as_str()) {
        return Ok(true);
    }
    info!("Voltando para a página inicial");
    session.backend.navigate(&config.portal.home_url).await?;
    let settled = session.locator().settle(None).await?;
    dismiss_notice(session).await?;
    Ok(settled)
}

/// Look for the emitted invoice number: first in the configured targets,
/// then by pattern in the page text.
pub async fn extract_invoice_number(session: &mut Session) -> Result<Option<String>, EngineError> {
    let config = session.config.clone();
    let target = &config.portal.targets.invoice_number;

    for selector in target.selectors() {
        let elements = match session
            .backend
            .find_elements(selector.kind, &selector.value)
            .await
        {
            Ok(elements) => elements,
            Err(e) if e.is_recoverable() => continue,
            Err(e) => return Err(e.into()),
        };
        for element in elements {
            if !session.backend.is_displayed(&element).await.unwrap_or(false) {
                continue;
            }
            let value = match session.backend.attribute(&element, "value").await {
                Ok(Some(v)) if !v.trim().is_empty() => v,
                _ => session.backend.text(&element).await.unwrap_or_default(),
            };
            if let Some(m) = INVOICE_DIGITS.find(&value) {
                info!("Número da nota encontrado via {}: {}", selector.value, m.as_str());
                return Ok(Some(m.as_str().to_string()));
            }
        }
    }

    let body = match session.backend.find_elements(LocatorKind::Css, "body").await {
        Ok(elements) => match elements.first() {
            Some(body) => session.backend.text(body).await.unwrap_or_default(),
            None => String::new(),
        },
        Err(e) if e.is_recoverable() => String::new(),
        Err(e) => return Err(e.into()),
    };
    if let Some(number) = number_from_text(&body) {
        info!("Número da nota encontrado no texto da página: {}", number);
        return Ok(Some(number));
    }

    warn!("Não foi possível extrair o número da nota automaticamente");
    session.capture("falha_extrair_numero_nota").await;
    Ok(None)
}

/// First match of the invoice-number patterns over free text.
pub fn number_from_text(text: &str) -> Option<String> {
    BODY_PATTERNS
        .iter()
        .find_map(|re| re.captures(text).map(|c| c[1].to_string()))
}
