use async_trait::async_trait;
use reqwest::{
    multipart::{Form, Part},
    Url,
};
use serde::{Deserialize, Serialize};

use crate::{
    catalog::{api_base, join_segments},
    error::{check_status, ApiError},
    models::Message,
};

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
pub const DEFAULT_IMAGE_COUNT: u32 = 1;
pub const DEFAULT_VOICE: &str = "alloy";

/**
 * \brief 文本补全的可选采样参数，未设置时使用默认值。
 */
#[derive(Debug, Clone, Default)]
pub struct TextOptions {
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ImageOptions {
    /** \brief 图片尺寸，默认 1024x1024 */
    pub size: Option<String>,
    /** \brief 生成张数，默认 1 */
    pub n: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct SpeechOptions {
    /** \brief 音色，默认 alloy */
    pub voice: Option<String>,
}

/**
 * \brief 待转写的音频文件。
 */
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/**
 * \brief 单张生成结果，正常情况下带有图片 URL。
 */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResult {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>,
}

#[derive(Serialize)]
struct TextRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
}

#[derive(Deserialize)]
struct TextResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ImageResponse {
    data: Vec<ImageResult>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
}

/**
 * \brief Playground 的四种一次性调用。凭据原样放入 `X-API-Key` 头。
 */
#[async_trait]
pub trait PlaygroundApi: Send + Sync {
    /**
     * \brief 返回第一个候选消息的内容；后端未生成内容时为 `None`。
     */
    async fn text_completion(
        &self,
        credential: &str,
        model_id: &str,
        messages: &[Message],
        options: &TextOptions,
    ) -> Result<Option<String>, ApiError>;

    async fn image_generation(
        &self,
        credential: &str,
        model_id: &str,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<Vec<ImageResult>, ApiError>;

    async fn audio_transcription(
        &self,
        credential: &str,
        model_id: &str,
        file: AudioFile,
    ) -> Result<String, ApiError>;

    /**
     * \brief 返回原始音频字节（audio/mpeg）。
     */
    async fn audio_generation(
        &self,
        credential: &str,
        model_id: &str,
        input: &str,
        options: &SpeechOptions,
    ) -> Result<Vec<u8>, ApiError>;
}

#[derive(Debug, Clone)]
pub struct PlaygroundClient {
    http: reqwest::Client,
    api_base: Url,
}

impl PlaygroundClient {
    pub fn new(backend_url: &str) -> Result<Self, ApiError> {
        Ok(Self {
            http: reqwest::Client::builder().build()?,
            api_base: api_base(backend_url)?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        join_segments(&self.api_base, segments)
    }
}

#[async_trait]
impl PlaygroundApi for PlaygroundClient {
    async fn text_completion(
        &self,
        credential: &str,
        model_id: &str,
        messages: &[Message],
        options: &TextOptions,
    ) -> Result<Option<String>, ApiError> {
        let body = TextRequest {
            model: model_id,
            messages,
            temperature: options.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        };
        let resp = self
            .http
            .post(self.endpoint(&["playground", "text"])?)
            .header(API_KEY_HEADER, credential)
            .json(&body)
            .send()
            .await?;
        let parsed: TextResponse = check_status(resp).await?.json().await?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty()))
    }

    async fn image_generation(
        &self,
        credential: &str,
        model_id: &str,
        prompt: &str,
        options: &ImageOptions,
    ) -> Result<Vec<ImageResult>, ApiError> {
        let body = ImageRequest {
            model: model_id,
            prompt,
            size: options.size.as_deref().unwrap_or(DEFAULT_IMAGE_SIZE),
            n: options.n.unwrap_or(DEFAULT_IMAGE_COUNT),
        };
        let resp = self
            .http
            .post(self.endpoint(&["playground", "image"])?)
            .header(API_KEY_HEADER, credential)
            .json(&body)
            .send()
            .await?;
        let text = check_status(resp).await?.text().await?;
        let parsed: ImageResponse = serde_json::from_str(&text)
            .map_err(|e| ApiError::MalformedResponse(format!("image response: {}", e)))?;
        Ok(parsed.data)
    }

    async fn audio_transcription(
        &self,
        credential: &str,
        model_id: &str,
        file: AudioFile,
    ) -> Result<String, ApiError> {
        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(mime) = file.mime_type.as_deref() {
            part = part.mime_str(mime)?;
        }
        let form = Form::new()
            .part("file", part)
            .text("model", model_id.to_string());
        let resp = self
            .http
            .post(self.endpoint(&["playground", "audio", "transcribe"])?)
            .header(API_KEY_HEADER, credential)
            .multipart(form)
            .send()
            .await?;
        let text = check_status(resp).await?.text().await?;
        serde_json::from_str::<TranscriptionResponse>(&text)
            .ok()
            .and_then(|r| r.text)
            .ok_or_else(|| ApiError::MalformedResponse("transcription has no text".to_string()))
    }

    async fn audio_generation(
        &self,
        credential: &str,
        model_id: &str,
        input: &str,
        options: &SpeechOptions,
    ) -> Result<Vec<u8>, ApiError> {
        let body = SpeechRequest {
            model: model_id,
            input,
            voice: options.voice.as_deref().unwrap_or(DEFAULT_VOICE),
        };
        let resp = self
            .http
            .post(self.endpoint(&["playground", "audio", "generate"])?)
            .header(API_KEY_HEADER, credential)
            .json(&body)
            .send()
            .await?;
        let bytes = check_status(resp).await?.bytes().await?;
        Ok(bytes.to_vec())
    }
}
