use nfse_engine::config::{ConfigError, ConfigLoader, NfseConfig};
use nfse_engine::stages::StageKind;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_defaults() {
    let config = NfseConfig::default();
    assert_eq!(config.spreadsheet.header_row, 3);
    assert_eq!(config.spreadsheet.path, PathBuf::from("notas.xlsx"));
    assert_eq!(config.service.local_code, "8561");
    assert_eq!(config.service.service_code, "1701");
    assert_eq!(config.timing.max_attempts, 3);
    assert_eq!(config.timing.destination_timeout_secs, 300);
    assert_eq!(config.portal.destination_fragment, "#!/sistema/66");
    assert!(config.portal.advance_after.is_empty());
    assert!(config.service.confirm_before_emit);
    assert!(!config.portal.targets.next.is_empty());
    assert!(!config.portal.targets.net_value.is_empty());
}

#[tokio::test]
async fn test_load_partial_file_keeps_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r##"
spreadsheet:
  path: /dados/controle.xlsx
  header_row: 1
  columns:
    tax_id: "CPF/CNPJ"
service:
  payment_lines:
    - "PIX: 123"
portal:
  advance_after: [local_of_service, description]
  targets:
    emit:
      css: ["#emitir"]
      text: Emitir
timing:
  max_attempts: 5
"##
    )
    .unwrap();

    let config = ConfigLoader::load_from(file.path()).await.unwrap();

    assert_eq!(config.spreadsheet.path, PathBuf::from("/dados/controle.xlsx"));
    assert_eq!(config.spreadsheet.header_row, 1);
    assert_eq!(config.spreadsheet.columns.tax_id, "CPF/CNPJ");
    assert_eq!(config.spreadsheet.columns.company_name, "Empresa - Razão Social");
    assert_eq!(config.service.payment_lines, vec!["PIX: 123".to_string()]);
    assert_eq!(config.service.local_code, "8561");
    assert_eq!(
        config.portal.advance_after,
        vec![StageKind::LocalOfService, StageKind::Description]
    );
    assert_eq!(config.portal.targets.emit.css, vec!["#emitir".to_string()]);
    assert_eq!(config.portal.targets.emit.text.as_deref(), Some("Emitir"));
    // Targets not mentioned keep their defaults.
    assert!(!config.portal.targets.next.css.is_empty());
    assert_eq!(config.timing.max_attempts, 5);
    assert_eq!(config.timing.retry_pause_ms, 1000);
}

#[tokio::test]
async fn test_explicit_missing_file_is_an_error() {
    let result = ConfigLoader::load(Some(std::path::Path::new("/nao/existe.yaml"))).await;
    assert!(matches!(result, Err(ConfigError::NotFound(_))));
}

#[tokio::test]
async fn test_invalid_yaml_is_a_parse_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "timing: [nao, e, um, mapa").unwrap();
    let result = ConfigLoader::load_from(file.path()).await;
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_env_overrides() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("NFS_URL", "https://nfse.example/login"),
        ("CPF_CNPJ", "12345678000190"),
        ("SENHA", "segredo"),
        ("NFSE_EXCEL_PATH", "/tmp/notas.xlsx"),
        ("NFSE_WEBDRIVER_URL", ""),
    ]);
    let mut config = NfseConfig::default();
    ConfigLoader::apply_env(&mut config, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.portal.url, "https://nfse.example/login");
    assert_eq!(config.portal.tax_id, "12345678000190");
    assert_eq!(config.portal.password, "segredo");
    assert_eq!(config.spreadsheet.path, PathBuf::from("/tmp/notas.xlsx"));
    // Empty values leave the configured one alone.
    assert_eq!(config.portal.webdriver_url, "http://localhost:9515");
}
