use super::{FormStage, FormStageResult, StageKind};
use crate::error::EngineError;
use crate::session::Session;
use async_trait::async_trait;
use nfse_common::protocol::TargetSpec;
use nfse_common::record::InvoiceRecord;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{info, warn};

static TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*\D)\s+(\d+)\s*$").unwrap());
static FIRST_NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d+\b").unwrap());

/// Placeholder the portal accepts for addresses without a number.
pub const NO_NUMBER: &str = "S/N";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreetAddress {
    pub street: String,
    pub number: String,
    pub complement: String,
}

/// Split the spreadsheet address into street, number and complement.
///
/// * an explicit number wins and is removed from the street text;
/// * `"Rua X, 123 sala 4"`: number after the first comma, rest goes to the
///   complement;
/// * `"Rua X 123"`: trailing number;
/// * otherwise the number is [`NO_NUMBER`].
pub fn split_street_number(street: &str, number: &str, complement: &str) -> StreetAddress {
    let street = street.trim();
    let mut number = number.trim().to_string();
    let mut complement = complement.trim().to_string();
    let mut street_only = street.to_string();

    if !number.is_empty() {
        let (head, rest) = strip_explicit_number(street, &number);
        street_only = head;
        if !rest.is_empty() {
            complement = join_words(&complement, &rest);
        }
    } else if let Some((head, tail)) = street.split_once(',') {
        street_only = head.trim().to_string();
        let tail = tail.trim();
        if let Some(m) = FIRST_NUMBER.find(tail) {
            number = m.as_str().to_string();
            let rest = format!("{}{}", &tail[..m.start()], &tail[m.end()..]);
            let rest = rest.trim().trim_matches(',').trim();
            if !rest.is_empty() {
                complement = join_words(&complement, rest);
            }
        } else if !tail.is_empty() {
            complement = join_words(&complement, tail);
        }
    } else if let Some(caps) = TRAILING_NUMBER.captures(street) {
        street_only = caps[1].trim().to_string();
        number = caps[2].to_string();
    }

    if number.is_empty() {
        warn!("Número não encontrado no endereço {:?}, usando {}", street, NO_NUMBER);
        number = NO_NUMBER.to_string();
    }

    StreetAddress {
        street: street_only.trim_end_matches(',').trim().to_string(),
        number,
        complement,
    }
}

/// Remove an explicit house number from the street text: either trailing
/// (`"Rua 15 de Novembro, 1"`) or right after the first comma with extra
/// text following (`"Rua X, 12 sala 3"`, which yields `"sala 3"` as rest).
/// A number that only occurs inside the street name is left alone.
fn strip_explicit_number(street: &str, number: &str) -> (String, String) {
    let escaped = regex::escape(number);
    let trailing = Regex::new(&format!(r"^(.*?)(?:,\s*|\s+){}\s*,?\s*$", escaped));
    if let Ok(re) = trailing
        && let Some(caps) = re.captures(street)
    {
        return (caps[1].trim().to_string(), String::new());
    }

    let after_comma = Regex::new(&format!(r"^([^,]*),\s*{}\b\s*,?\s*(.*)$", escaped));
    if let Ok(re) = after_comma
        && let Some(caps) = re.captures(street)
    {
        return (caps[1].trim().to_string(), caps[2].trim().to_string());
    }

    (street.to_string(), String::new())
}

fn join_words(a: &str, b: &str) -> String {
    if a.is_empty() {
        b.to_string()
    } else {
        format!("{} {}", a, b)
    }
}

/// Payer address. Skipped when the portal already uses an alternate
/// address for this payer.
pub struct AddressStage;

#[async_trait]
impl FormStage for AddressStage {
    fn kind(&self) -> StageKind {
        StageKind::Address
    }

    async fn run(
        &self,
        session: &mut Session,
        record: &InvoiceRecord,
    ) -> Result<FormStageResult, EngineError> {
        let config = session.config.clone();
        let targets = &config.portal.targets;
        let mut result = FormStageResult::ok(self.kind());

        if session.locator().is_checked(&targets.alt_address_toggle).await? == Some(true) {
            info!("Endereço alternativo já ativo, pulando preenchimento de endereço");
            return Ok(result);
        }

        let text = |v: &nfse_common::record::RawValue| v.as_text().unwrap_or_default();
        let address = &record.address;
        let parts = split_street_number(
            &text(&address.street),
            &text(&address.number),
            &text(&address.complement),
        );
        info!(
            "Endereço: logradouro={:?} número={:?} complemento={:?}",
            parts.street, parts.number, parts.complement
        );

        let fields: [(&str, &TargetSpec, String, bool); 5] = [
            ("cep", &targets.postal_code, text(&address.postal_code), true),
            ("logradouro", &targets.street, parts.street, true),
            ("numero", &targets.street_number, parts.number, true),
            ("complemento", &targets.complement, parts.complement, false),
            ("bairro", &targets.district, text(&address.district), false),
        ];

        for (name, target, value, required) in fields {
            if value.is_empty() && !required {
                info!("Campo {} vazio e opcional, pulando", name);
                continue;
            }
            let outcome = session.locator().fill(target, &value, None).await?;
            if outcome.success {
                info!("Campo {} preenchido", name);
                result.artifacts.extend(outcome.artifacts);
            } else if required {
                warn!("Campo obrigatório {} não preenchido", name);
                result.absorb(outcome);
                return Ok(result);
            } else {
                warn!("Campo opcional {} não encontrado", name);
                result.artifacts.extend(outcome.artifacts);
            }
        }
        Ok(result)
    }
}
