use serde::Deserialize;
use serde_json::Value;

pub const MAX_SOURCE_CHARS: usize = 40;
pub const MAX_TARGET_CHARS: usize = 40;
pub const MAX_VARIANT_CHARS: usize = 20;
pub const MAX_HOOK_CHARS: usize = 200;
pub const MAX_CTA_CHARS: usize = 200;

pub const SYSTEM_PROMPT: &str = "You are an enterprise-safe writing assistant. \
    Rewrite the source text into a copy-ready post for the target platform. \
    Keep it concise and clear. Do not invent facts. \
    Return only the final formatted output.";

#[derive(Debug, Default, Deserialize)]
pub struct GenerateReqInput {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub cta: Option<String>,
}

/// The request after clamping, the only form the upstream call ever sees.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptInput {
    pub source: String,
    pub target: String,
    pub variant: String,
    pub text: String,
    pub hook: String,
    pub cta: String,
}

pub fn clamp(value: Option<&str>, max_chars: usize) -> String {
    let value = value.unwrap_or("");
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        value.chars().take(max_chars).collect()
    }
}

impl PromptInput {
    pub fn from_request(req: &GenerateReqInput, max_text_chars: usize) -> Self {
        PromptInput {
            source: clamp(req.source.as_deref(), MAX_SOURCE_CHARS),
            target: clamp(req.target.as_deref(), MAX_TARGET_CHARS),
            variant: clamp(req.variant.as_deref(), MAX_VARIANT_CHARS),
            text: clamp(req.text.as_deref(), max_text_chars),
            hook: clamp(req.hook.as_deref(), MAX_HOOK_CHARS),
            cta: clamp(req.cta.as_deref(), MAX_CTA_CHARS),
        }
    }

    /// Empty fields are left out entirely rather than rendered as blank lines.
    pub fn user_prompt(&self) -> String {
        let mut prompt = String::new();
        for (label, value) in [
            ("Source platform", &self.source),
            ("Target platform", &self.target),
            ("Variation", &self.variant),
            ("Goal/CTA", &self.cta),
            ("Hook", &self.hook),
        ] {
            if !value.is_empty() {
                prompt.push_str(&format!("{}: {}\n", label, value));
            }
        }
        prompt.push_str("\n---\nSOURCE TEXT:\n");
        prompt.push_str(&self.text);
        prompt
    }
}

pub fn temperature_for(variant: &str) -> f64 {
    match variant {
        "spicy" => 0.9,
        "minimal" => 0.3,
        _ => 0.6,
    }
}

/// Pulls `choices[0].message.content` out of a chat-completion response,
/// trimmed. A well-formed response with no text yields an empty string.
pub fn extract_output(response: &Value) -> String {
    response
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or("")
        .to_string()
}

/// Best-effort detail for a failed upstream call: the error message if the
/// body carries one, otherwise the bare status.
pub fn upstream_detail(body: Option<&Value>, status: u16) -> String {
    body.and_then(|data| {
        data.pointer("/error/message")
            .or_else(|| data.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
    .unwrap_or_else(|| format!("HTTP {}", status))
}
