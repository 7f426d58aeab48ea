use std::{fmt, str::FromStr};

use anyhow::{anyhow, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/**
 * \brief 价格档位，对应网关的 plan 参数。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    Ultra,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Pro, Tier::Ultra];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Pro => "pro",
            Tier::Ultra => "ultra",
        }
    }

    /**
     * \brief 筛选栏显示用的标签。
     */
    pub fn label(&self) -> &'static str {
        match self {
            Tier::Free => "Free Tier",
            Tier::Basic => "Basic Tier",
            Tier::Pro => "Pro Tier",
            Tier::Ultra => "Ultra Tier",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| anyhow!("unknown tier '{}', expected one of free|basic|pro|ultra", s))
    }
}

/**
 * \brief 模型用途分类。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Text,
    Image,
    Audio,
    Video,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Text,
        Category::Image,
        Category::Audio,
        Category::Video,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Text => "text",
            Category::Image => "image",
            Category::Audio => "audio",
            Category::Video => "video",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Category::Text => "Chat & Completion",
            Category::Image => "Images & Generation",
            Category::Audio => "Audio & Speech",
            Category::Video => "Video",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                anyhow!(
                    "unknown category '{}', expected one of text|image|audio|video",
                    s
                )
            })
    }
}

/**
 * \brief 解析筛选栏的取值，`all` 表示不筛选。
 */
pub fn parse_choice<T>(raw: &str) -> Result<Option<T>>
where
    T: FromStr<Err = anyhow::Error>,
{
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    trimmed.parse().map(Some)
}

/**
 * \brief Provider 的性能指标，数值以展示字符串为主。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /** \brief 延迟区间（秒），如 "2-4" */
    #[serde(default, deserialize_with = "display_string")]
    pub latency: String,
    /** \brief 吞吐量（tokens/s），上游可能给字符串或 null */
    #[serde(default, deserialize_with = "lenient_f64")]
    pub throughput: f64,
    /** \brief 可用率百分比，如 "99.5" */
    #[serde(default, deserialize_with = "display_string")]
    pub uptime_percentage: String,
}

/**
 * \brief 上游供应商提供的具体模型，`id` 即调用时发送的模型名。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owned_by: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_metrics: Option<PerformanceMetrics>,
}

/**
 * \brief 目录中的一条模型记录。
 * \details `proxy_providers` 的第一项视为规范 Provider，展示与调用都以它为准。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub base_model: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    /** \brief 上游类型字符串，如 "chat/completion"、"audio/transcription" */
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(default, rename = "logoUrl", skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    pub category: Category,
    pub tier: Tier,
    /** \brief 上下文窗口，0 表示不适用 */
    #[serde(default, deserialize_with = "null_as_default")]
    pub context_window: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub features: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub proxy_providers: Vec<ProviderRecord>,
}

impl ModelDescriptor {
    pub fn canonical_provider(&self) -> Option<&ProviderRecord> {
        self.proxy_providers.first()
    }

    /**
     * \brief 调用时使用的模型 ID：优先第一个 Provider 的 id，否则退回 base_model。
     */
    pub fn model_id(&self) -> &str {
        self.canonical_provider()
            .map(|p| p.id.as_str())
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.base_model)
    }

    pub fn is_transcription(&self) -> bool {
        self.model_type
            .as_deref()
            .map(|t| t.to_ascii_lowercase().contains("transcription"))
            .unwrap_or(false)
    }

    pub fn context_window_label(&self) -> String {
        if self.context_window == 0 {
            "N/A".to_string()
        } else {
            format!("{} tokens", group_thousands(self.context_window))
        }
    }

    pub fn feature_labels(&self) -> Vec<String> {
        self.features.iter().map(|f| f.replacen('_', " ", 1)).collect()
    }
}

/**
 * \brief 会话角色。
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/**
 * \brief 消息结构，与 OpenAI Chat 消息格式对齐。
 */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// 上游有时把指标写成数字，有时写成字符串。
fn display_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/**
 * \brief 数字或数字字符串；null 与无法解析的值记为 0。
 */
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_model_id_prefers_first_provider() {
        let model = gpt4o();
        assert_eq!(model.proxy_providers.len(), 2);
        assert_eq!(model.model_id(), "provider-1/gpt-4o");
    }

    #[test]
    fn test_model_id_falls_back_to_base_model() {
        let model = dalle();
        assert!(model.canonical_provider().is_none());
        assert_eq!(model.model_id(), "dall-e-3");
    }

    #[test]
    fn test_metrics_accept_numbers_and_strings() {
        let model = gpt4o();
        let second = model.proxy_providers[1]
            .performance_metrics
            .as_ref()
            .expect("metrics");
        assert_eq!(second.uptime_percentage, "99.9");
        assert_eq!(second.throughput, 80.0);
    }

    #[test]
    fn test_descriptor_labels() {
        let model = gpt4o();
        assert_eq!(model.context_window_label(), "128,000 tokens");
        assert_eq!(model.feature_labels(), vec!["vision", "function calling"]);
        assert_eq!(dalle().context_window_label(), "N/A");
        assert!(whisper().is_transcription());
        assert!(!model.is_transcription());
    }

    #[test]
    fn test_parse_choice_treats_all_as_none() {
        assert_eq!(parse_choice::<Tier>("all").expect("all"), None);
        assert_eq!(parse_choice::<Tier>("Pro").expect("pro"), Some(Tier::Pro));
        assert_eq!(
            parse_choice::<Category>("audio").expect("audio"),
            Some(Category::Audio)
        );
        assert!(parse_choice::<Category>("music").is_err());
    }

    #[test]
    fn test_serialize_keeps_wire_names() {
        let v = serde_json::to_value(gpt4o()).expect("serialize");
        assert_eq!(v["type"], "chat/completion");
        assert_eq!(v["logoUrl"], "https://api.a4f.co/v1/logos/openai.svg");
        assert_eq!(v["tier"], "pro");
        assert_eq!(
            serde_json::to_value(Message::user("hi")).expect("msg")["role"],
            "user"
        );
    }
}
