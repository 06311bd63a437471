use crate::commands::utils::normalize_phone;
use crate::db::LeadStatus;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Phrases that signal purchase intent in a conversation.
pub const HIGH_INTEREST_KEYWORDS: [&str; 12] = [
    "quiero comprar",
    "necesito instalar",
    "cuánto cuesta",
    "precio",
    "agendar",
    "programar instalación",
    "me interesa",
    "quiero cotizar",
    "listo para",
    "puedo pagar",
    "disponibilidad",
    "cuando pueden",
];

/// Checked in order; the first group with a hit names the product.
pub const PRODUCT_KEYWORDS: [(&str, &[&str]); 4] = [
    ("OS566F", &["os566f", "os 566", "os566", "huella", "biométrica"]),
    ("OS505", &["os505", "os 505", "manija", "básica"]),
    ("OS600", &["os600", "os 600", "premium", "wifi"]),
    ("CERRADURA", &["cerradura", "chapa", "lock", "candado"]),
];

static PHONE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\b3\d{9}\b",
        r"\b\+57\s*3\d{9}\b",
        r"\b57\s*3\d{9}\b",
        r"\b\d{3}[\s.-]?\d{3}[\s.-]?\d{4}\b",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:mi nombre es|me llamo|soy)\s+([a-záéíóúñ]+(?:\s+[a-záéíóúñ]+)?)",
        r"(?i)(?:nombre[:\s]+)([a-záéíóúñ]+(?:\s+[a-záéíóúñ]+)?)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterestLevel {
    High,
    Medium,
    Low,
}

impl InterestLevel {
    fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "high" | "alto" | "alta" => InterestLevel::High,
            "low" | "bajo" | "baja" => InterestLevel::Low,
            _ => InterestLevel::Medium,
        }
    }
}

/// Structured extraction the voice platform may already have done.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConversationAnalysis {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub product_interest: Option<String>,
    pub interest_level: Option<String>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoiceConversationPayload {
    pub conversation_id: String,
    pub agent_id: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub transcript: Value,
    pub analysis: Option<ConversationAnalysis>,
    pub collected_data: Option<Map<String, Value>>,
    pub data_collection: Option<Map<String, Value>>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub product_interest: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeadAnalysis {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub product_interest: Option<String>,
    pub interest_level: InterestLevel,
    pub notes: Option<String>,
}

/// Renders any transcript shape the platform sends as plain text.
pub fn format_transcript(transcript: &Value) -> String {
    match transcript {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(messages) => messages
            .iter()
            .filter_map(|msg| match msg {
                Value::Object(obj) => {
                    let speaker = match obj.get("role").and_then(Value::as_str) {
                        Some("agent") => "Ana",
                        _ => "Cliente",
                    };
                    let text = obj
                        .get("message")
                        .or_else(|| obj.get("text"))
                        .and_then(Value::as_str)
                        .unwrap_or("");
                    Some(format!("{}: {}", speaker, text))
                }
                Value::String(s) => Some(s.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(obj) => obj
            .get("messages")
            .map(format_transcript)
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

pub fn extract_phone(text: &str) -> Option<String> {
    let compact = text.replace(' ', "");
    PHONE_PATTERNS
        .iter()
        .find_map(|re| re.find(&compact))
        .map(|m| normalize_phone(m.as_str()))
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn extract_name(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    NAME_PATTERNS.iter().find_map(|re| {
        let captured = re.captures(&lower)?.get(1)?;
        let name = title_case(captured.as_str().trim());
        (name.chars().count() > 2).then_some(name)
    })
}

pub fn detect_product_interest(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    PRODUCT_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(product, _)| product.to_string())
}

pub fn score_interest(text: &str) -> InterestLevel {
    let lower = text.to_lowercase();
    let hits = HIGH_INTEREST_KEYWORDS
        .iter()
        .filter(|k| lower.contains(*k))
        .count();
    match hits {
        n if n >= 3 => InterestLevel::High,
        n if n >= 1 => InterestLevel::Medium,
        _ => InterestLevel::Low,
    }
}

pub fn initial_lead_status(interest: InterestLevel, has_contact: bool) -> LeadStatus {
    match (interest, has_contact) {
        (InterestLevel::High, true) => LeadStatus::Potential,
        (InterestLevel::Medium, _) | (_, true) => LeadStatus::InConversation,
        _ => LeadStatus::New,
    }
}

fn collected_str(collected: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| collected.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn present(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Merges every source of customer data, most trusted first, and falls back
/// to heuristics over the transcript for whatever is still missing.
pub fn analyze(payload: &VoiceConversationPayload) -> LeadAnalysis {
    let mut result = LeadAnalysis {
        name: None,
        phone: None,
        email: None,
        address: None,
        product_interest: None,
        interest_level: InterestLevel::Low,
        notes: None,
    };

    if let Some(analysis) = &payload.analysis {
        result.name = present(&analysis.customer_name);
        result.phone = present(&analysis.customer_phone);
        result.email = present(&analysis.customer_email);
        result.address = present(&analysis.customer_address);
        result.product_interest = present(&analysis.product_interest);
        result.interest_level = analysis
            .interest_level
            .as_deref()
            .map(InterestLevel::parse_lenient)
            .unwrap_or(InterestLevel::Medium);
        result.notes = present(&analysis.summary);
    }

    if let Some(collected) = payload
        .collected_data
        .as_ref()
        .filter(|m| !m.is_empty())
        .or(payload.data_collection.as_ref())
    {
        result.name = result.name.or_else(|| collected_str(collected, &["customer_name", "name"]));
        result.phone = result.phone.or_else(|| collected_str(collected, &["customer_phone", "phone"]));
        result.email = result.email.or_else(|| collected_str(collected, &["customer_email", "email"]));
        result.address = result
            .address
            .or_else(|| collected_str(collected, &["customer_address", "address"]));
        result.product_interest = result
            .product_interest
            .or_else(|| collected_str(collected, &["product_interest", "product"]));
    }

    result.name = result.name.or_else(|| present(&payload.customer_name));
    result.phone = result.phone.or_else(|| present(&payload.customer_phone));
    result.email = result.email.or_else(|| present(&payload.customer_email));
    result.address = result.address.or_else(|| present(&payload.customer_address));
    result.product_interest = result
        .product_interest
        .or_else(|| present(&payload.product_interest));
    result.notes = result.notes.or_else(|| present(&payload.notes));

    let text = format_transcript(&payload.transcript);
    if !text.is_empty() {
        if result.phone.is_none() {
            result.phone = extract_phone(&text);
        }
        if result.name.is_none() {
            result.name = extract_name(&text);
        }
        if result.product_interest.is_none() {
            result.product_interest = detect_product_interest(&text);
        }
        if result.interest_level == InterestLevel::Low {
            result.interest_level = score_interest(&text);
        }
    }

    result.phone = result.phone.map(|p| normalize_phone(&p));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload_with_transcript(transcript: Value) -> VoiceConversationPayload {
        VoiceConversationPayload {
            conversation_id: "conv_01HZX8".to_string(),
            transcript,
            ..Default::default()
        }
    }

    #[test]
    fn test_juan_conversation() {
        let payload = payload_with_transcript(json!(
            "mi nombre es Juan... 3001234567... quiero comprar, necesito instalar, precio"
        ));
        let result = analyze(&payload);
        assert_eq!(result.name.as_deref(), Some("Juan"));
        assert_eq!(result.phone.as_deref(), Some("+573001234567"));
        assert_eq!(result.interest_level, InterestLevel::High);
        assert_eq!(
            initial_lead_status(result.interest_level, result.phone.is_some()),
            LeadStatus::Potential
        );
    }

    #[test]
    fn test_format_transcript_shapes() {
        let messages = json!([
            {"role": "agent", "message": "Hola, soy Ana"},
            {"role": "user", "text": "Quiero una cerradura"},
            "linea suelta"
        ]);
        let expected = "Ana: Hola, soy Ana\nCliente: Quiero una cerradura\nlinea suelta";
        assert_eq!(format_transcript(&messages), expected);
        assert_eq!(format_transcript(&json!({ "messages": messages })), expected);
        assert_eq!(format_transcript(&Value::Null), "");
    }

    #[test]
    fn test_phone_extraction_variants() {
        assert_eq!(
            extract_phone("mi celular: 300 123 4567").as_deref(),
            Some("+573001234567")
        );
        assert_eq!(
            extract_phone("número: 57 310 987 6543.").as_deref(),
            Some("+573109876543")
        );
        assert_eq!(extract_phone("no tengo número"), None);
    }

    #[test]
    fn test_landline_extracts_to_digits() {
        assert_eq!(
            extract_phone("Cliente: mi fijo: 601-234-5678.").as_deref(),
            Some("6012345678")
        );
        assert_eq!(
            extract_phone("Cliente: mi fijo es 601 234 5678").as_deref(),
            Some("6012345678")
        );
    }

    #[test]
    fn test_name_extraction() {
        assert_eq!(extract_name("Hola, me llamo maría lópez").as_deref(), Some("María López"));
        assert_eq!(extract_name("nombre: carlos").as_deref(), Some("Carlos"));
        assert_eq!(extract_name("soy yo"), None);
    }

    #[test]
    fn test_product_groups_checked_in_order() {
        assert_eq!(
            detect_product_interest("quiero una cerradura con huella").as_deref(),
            Some("OS566F")
        );
        assert_eq!(detect_product_interest("algo premium").as_deref(), Some("OS600"));
        assert_eq!(detect_product_interest("un candado").as_deref(), Some("CERRADURA"));
        assert_eq!(detect_product_interest("hola"), None);
    }

    #[test]
    fn test_interest_thresholds() {
        assert_eq!(score_interest("buenas tardes"), InterestLevel::Low);
        assert_eq!(score_interest("Me interesa"), InterestLevel::Medium);
        assert_eq!(
            score_interest("me interesa, cuál es el precio, quiero agendar"),
            InterestLevel::High
        );
    }

    #[test]
    fn test_status_rule() {
        assert_eq!(initial_lead_status(InterestLevel::High, true), LeadStatus::Potential);
        assert_eq!(initial_lead_status(InterestLevel::High, false), LeadStatus::New);
        assert_eq!(initial_lead_status(InterestLevel::Medium, false), LeadStatus::InConversation);
        assert_eq!(initial_lead_status(InterestLevel::Low, true), LeadStatus::InConversation);
        assert_eq!(initial_lead_status(InterestLevel::Low, false), LeadStatus::New);
    }

    #[test]
    fn test_structured_fields_take_precedence() {
        let payload: VoiceConversationPayload = serde_json::from_value(json!({
            "conversation_id": "conv_9",
            "transcript": "me llamo pedro, mi número es 3005556677, quiero comprar",
            "analysis": {"customer_name": "Laura Gómez", "summary": "Pide visita"},
            "collected_data": {"phone": "3112223344", "product": "OS505"},
            "customer_email": "laura@example.com"
        }))
        .unwrap();

        let result = analyze(&payload);
        assert_eq!(result.name.as_deref(), Some("Laura Gómez"));
        assert_eq!(result.phone.as_deref(), Some("+573112223344"));
        assert_eq!(result.product_interest.as_deref(), Some("OS505"));
        assert_eq!(result.email.as_deref(), Some("laura@example.com"));
        assert_eq!(result.notes.as_deref(), Some("Pide visita"));
        // analysis present without a level means medium, transcript is not rescored
        assert_eq!(result.interest_level, InterestLevel::Medium);
    }
}
