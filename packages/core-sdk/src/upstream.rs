use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::{
    header::AUTHORIZATION,
    multipart::{Form, Part},
};
use serde_json::{json, Value};

use crate::{
    config::UpstreamConfig,
    models::{Category, ModelDescriptor, Tier},
    playground::AudioFile,
    telemetry,
};

const DISPLAY_TIMEOUT: Duration = Duration::from_secs(10);
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);
const MEDIA_TIMEOUT: Duration = Duration::from_secs(120);

/**
 * \brief 上游网关客户端：模型展示目录与 OpenAI 兼容接口。
 */
#[derive(Debug, Clone)]
pub struct Upstream {
    http: reqwest::Client,
    config: UpstreamConfig,
}

impl Upstream {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            config,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /**
     * \brief 拉取某一档位的展示模型，并补上 tier / category。
     */
    pub async fn display_models(&self, tier: Tier) -> Result<Vec<ModelDescriptor>> {
        let url = format!(
            "{}/get-display-models",
            self.config.display_base.trim_end_matches('/')
        );
        let resp = self
            .http
            .get(url)
            .query(&[("plan", tier.as_str())])
            .timeout(DISPLAY_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("display models failed: {} -> {}", status, text));
        }
        let v: Value = resp.json().await?;
        Ok(parse_display_models(v, tier))
    }

    /**
     * \brief 汇总目录：指定档位时只查该档位，否则依次查询全部档位。
     * \details 单个档位失败只记录日志并视为空列表。
     */
    pub async fn catalog(&self, tier: Option<Tier>) -> Vec<ModelDescriptor> {
        let tiers = match tier {
            Some(t) => vec![t],
            None => Tier::ALL.to_vec(),
        };
        let mut all = Vec::new();
        for t in tiers {
            match self.display_models(t).await {
                Ok(models) => all.extend(models),
                Err(e) => {
                    telemetry::log_error("upstream.models", &format!("plan={} error={}", t, e))
                }
            }
        }
        all
    }

    pub async fn chat_completion(&self, api_key: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.api_url("chat/completions"))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(body)
            .timeout(CHAT_TIMEOUT)
            .send()
            .await?;
        json_or_error(resp, "chat completion").await
    }

    pub async fn image_generation(&self, api_key: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .post(self.api_url("images/generations"))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(body)
            .timeout(MEDIA_TIMEOUT)
            .send()
            .await?;
        json_or_error(resp, "image generation").await
    }

    pub async fn audio_transcription(
        &self,
        api_key: &str,
        model: &str,
        file: AudioFile,
    ) -> Result<Value> {
        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(mime) = file.mime_type.as_deref() {
            part = part.mime_str(mime)?;
        }
        let form = Form::new().part("file", part).text("model", model.to_string());
        let resp = self
            .http
            .post(self.api_url("audio/transcriptions"))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .multipart(form)
            .timeout(MEDIA_TIMEOUT)
            .send()
            .await?;
        json_or_error(resp, "audio transcription").await
    }

    pub async fn audio_speech(&self, api_key: &str, body: &Value) -> Result<Vec<u8>> {
        let resp = self
            .http
            .post(self.api_url("audio/speech"))
            .header(AUTHORIZATION, format!("Bearer {}", api_key))
            .json(body)
            .timeout(MEDIA_TIMEOUT)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("audio generation failed: {} -> {}", status, text));
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

async fn json_or_error(resp: reqwest::Response, what: &str) -> Result<Value> {
    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        return Err(anyhow!("{} failed: {} -> {}", what, status, text));
    }
    Ok(resp.json().await?)
}

/**
 * \brief 由上游 type 推断类别。
 */
pub fn categorize(model_type: &str) -> Category {
    let t = model_type.to_ascii_lowercase();
    if ["speech", "tts", "transcription", "stt", "audio"]
        .iter()
        .any(|k| t.contains(k))
    {
        Category::Audio
    } else if t.contains("video") {
        Category::Video
    } else if t.contains("image") || t.contains("generation") {
        Category::Image
    } else {
        Category::Text
    }
}

fn parse_display_models(v: Value, tier: Tier) -> Vec<ModelDescriptor> {
    let Some(items) = v.get("models").and_then(|m| m.as_array()) else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let mut item = item.clone();
            let obj = item.as_object_mut()?;
            let model_type = obj
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string();
            obj.insert("category".into(), json!(categorize(&model_type)));
            obj.insert("tier".into(), json!(tier));
            if !obj.contains_key("name") {
                if let Some(base) = obj.get("base_model").cloned() {
                    obj.insert("name".into(), base);
                }
            }
            match serde_json::from_value::<ModelDescriptor>(item) {
                Ok(model) => Some(model),
                Err(e) => {
                    telemetry::log_warn("upstream.models", &format!("skip entry: {}", e));
                    None
                }
            }
        })
        .collect()
}
