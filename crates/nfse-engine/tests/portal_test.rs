mod common;

use common::{MockBackend, count_files, session_with, test_config};
use nfse_common::protocol::SubmitKey;
use nfse_common::record::InvoiceRecord;
use nfse_engine::config::NfseConfig;
use nfse_engine::error::EngineError;
use nfse_engine::portal::{
    Credentials, await_captcha, extract_invoice_number, login, open_emission_form, open_portal,
    wait_for_destination,
};
use tempfile::TempDir;

fn credentials() -> Credentials {
    Credentials {
        tax_id: "12345678000190".to_string(),
        password: "segredo".to_string(),
    }
}

fn payer() -> InvoiceRecord {
    InvoiceRecord {
        row: 5,
        company_name: "Acme Ltda".into(),
        tax_id: "12.345.678/0001-90".into(),
        ..Default::default()
    }
}

/// Login form with the default selectors.
fn login_page(config: &NfseConfig) -> MockBackend {
    let targets = config.portal.targets.clone();
    MockBackend::new().with(move |dom| {
        dom.add(&targets.login_tax_id.css[0], "login-id");
        dom.add(&targets.login_password.css[0], "login-password");
        dom.add(&targets.login_button.css[0], "login-button");
    })
}

#[tokio::test]
async fn test_login_captcha_and_destination() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let backend = login_page(&config);
    let dom = backend.dom.clone();
    let mut session = session_with(backend, config.clone(), &[""]);

    assert!(open_portal(&mut session).await.unwrap());
    assert_eq!(dom.lock().unwrap().navigations, vec![config.portal.url.clone()]);

    assert!(login(&mut session, &credentials()).await.unwrap());
    {
        let dom = dom.lock().unwrap();
        assert_eq!(dom.typed("login-id"), Some("12345678000190"));
        assert_eq!(dom.typed("login-password"), Some("segredo"));
        assert_eq!(dom.clicks_on("login-button").len(), 1);
    }

    await_captcha(&mut session).await.unwrap();

    // The operator finished in the browser and landed on the home page.
    dom.lock().unwrap().url = config.portal.home_url.clone();
    assert!(wait_for_destination(&mut session).await.unwrap());
}

#[tokio::test]
async fn test_destination_timeout_keeps_a_capture() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let backend = login_page(&config);
    let mut session = session_with(backend, config.clone(), &[]);

    open_portal(&mut session).await.unwrap();
    assert!(!wait_for_destination(&mut session).await.unwrap());
    assert_eq!(count_files(&dir.path().join("images"), "png"), 1);
    assert_eq!(count_files(&dir.path().join("html"), "html"), 1);
}

#[tokio::test]
async fn test_closed_console_during_captcha() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut session = session_with(MockBackend::new(), config, &[]);

    assert!(matches!(
        await_captcha(&mut session).await,
        Err(EngineError::InputClosed)
    ));
}

#[tokio::test]
async fn test_login_error_banner_is_reported() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let banner = config.portal.targets.login_error.css[0].clone();
    let backend = login_page(&config).with(move |dom| {
        dom.add(&banner, "banner").set_text("banner", " Senha inválida ");
    });
    let mut session = session_with(backend, config, &[]);

    match login(&mut session, &credentials()).await {
        Err(EngineError::Login(message)) => assert_eq!(message, "Senha inválida"),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_emission_form_selects_the_payer_row() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let targets = config.portal.targets.clone();
    let row = targets
        .payer_result
        .substitute("tax_id", "12345678000190")
        .xpath[0]
        .clone();
    assert_eq!(row, "//tr[contains(., '12345678000190')]");

    let backend = MockBackend::new().with(|dom| {
        dom.add(&targets.emit_invoice.css[0], "emit-invoice");
        dom.add(&targets.next.css[0], "next");
        dom.add(&targets.payer_type.xpath[0], "payer-pj");
        dom.add(&targets.payer_search.css[0], "payer-search");
        dom.add(&row, "payer-row");
    });
    let dom = backend.dom.clone();
    let mut session = session_with(backend, config, &[]);

    assert!(open_emission_form(&mut session, &payer()).await.unwrap());

    let dom = dom.lock().unwrap();
    assert_eq!(dom.typed("payer-search"), Some("12345678000190"));
    assert!(
        dom.keys
            .contains(&("payer-search".to_string(), SubmitKey::Enter))
    );
    let order: Vec<&str> = dom.clicks.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(
        order,
        vec!["emit-invoice", "next", "payer-pj", "payer-search", "payer-row"]
    );
}

#[tokio::test]
async fn test_emission_form_without_matching_payer() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let targets = config.portal.targets.clone();
    let other_row = targets
        .payer_result
        .substitute("tax_id", "99999999000199")
        .xpath[0]
        .clone();

    let backend = MockBackend::new().with(|dom| {
        dom.add(&targets.emit_invoice.css[0], "emit-invoice");
        dom.add(&targets.next.css[0], "next");
        dom.add(&targets.payer_type.xpath[0], "payer-pj");
        dom.add(&targets.payer_search.css[0], "payer-search");
        dom.add(&other_row, "other-row");
    });
    let dom = backend.dom.clone();
    let mut session = session_with(backend, config, &[]);

    assert!(!open_emission_form(&mut session, &payer()).await.unwrap());
    assert!(dom.lock().unwrap().clicks_on("other-row").is_empty());
}

#[tokio::test]
async fn test_invoice_number_from_configured_target() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let targets = config.portal.targets.clone();

    let backend = MockBackend::new().with(|dom| {
        // Hidden matches are skipped.
        dom.add_hidden(&targets.invoice_number.css[0], "stale-input")
            .set_text("stale-input", "111");
        dom.add(&targets.invoice_number.css[1], "number")
            .set_text("number", "NFS-e nº 000987");
        dom.add("body", "body")
            .set_text("body", "Número da nota: 5555");
    });
    let mut session = session_with(backend, config, &[]);

    assert_eq!(
        extract_invoice_number(&mut session).await.unwrap().as_deref(),
        Some("000987")
    );
}

#[tokio::test]
async fn test_invoice_number_falls_back_to_page_text() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let backend = MockBackend::new().with(|dom| {
        dom.add("body", "body")
            .set_text("body", "Nota emitida com sucesso. 4567");
    });
    let mut session = session_with(backend, config, &[]);

    assert_eq!(
        extract_invoice_number(&mut session).await.unwrap().as_deref(),
        Some("4567")
    );
}

#[tokio::test]
async fn test_missing_invoice_number_is_captured() {
    let dir = TempDir::new().unwrap();
    let config = test_config(dir.path());
    let mut session = session_with(MockBackend::new(), config, &[]);

    assert_eq!(extract_invoice_number(&mut session).await.unwrap(), None);
    assert_eq!(count_files(&dir.path().join("images"), "png"), 1);
}

#[tokio::test]
async fn test_release_browser_closes_after_enter() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let dom = backend.dom.clone();
    let mut session = session_with(backend, test_config(dir.path()), &[""]);

    assert!(session.release_browser("ENTER para encerrar").await.unwrap());
    assert!(dom.lock().unwrap().closed);
}

#[tokio::test]
async fn test_release_browser_reports_closed_console() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new();
    let dom = backend.dom.clone();
    let mut session = session_with(backend, test_config(dir.path()), &[]);

    assert!(!session.release_browser("ENTER para encerrar").await.unwrap());
    assert!(dom.lock().unwrap().closed);
}
