use serde::Deserialize;
use thiserror::Error;

/**
 * \brief 客户端调用后端时可能出现的错误。
 */
#[derive(Debug, Error)]
pub enum ApiError {
    /** \brief 本地未设置 API Key，调用未发出 */
    #[error("API key required")]
    MissingCredential,
    /** \brief 后端地址无法解析 */
    #[error("invalid backend url: {0}")]
    InvalidBaseUrl(String),
    /** \brief 后端返回非 2xx */
    #[error("backend error {status}: {}", detail.as_deref().unwrap_or("no detail"))]
    Backend { status: u16, detail: Option<String> },
    /** \brief 网络层失败（连接、超时、解码） */
    #[error("http error: {0}")]
    Transport(#[from] reqwest::Error),
    /** \brief 响应结构与约定不符 */
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /**
     * \brief 后端给出的 detail 文本（若有）。
     */
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Backend { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }

    /**
     * \brief 面向用户的提示：有 detail 时原样展示，否则使用调用方给出的通用文案。
     */
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::MissingCredential => {
                "Please set your A4F.co API key to use the playground.".to_string()
            }
            _ => self.detail().unwrap_or(fallback).to_string(),
        }
    }
}

#[derive(Deserialize)]
struct DetailBody {
    detail: Option<serde_json::Value>,
}

/**
 * \brief 检查响应状态码，失败时提取 `{detail}`。
 */
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(ApiError::Backend {
        status: status.as_u16(),
        detail: parse_detail(&text),
    })
}

fn parse_detail(body: &str) -> Option<String> {
    // 校验失败时 detail 可能是数组，此时不展示。
    serde_json::from_str::<DetailBody>(body)
        .ok()
        .and_then(|b| b.detail)
        .and_then(|d| d.as_str().map(str::to_string))
        .filter(|d| !d.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_detail_variants() {
        assert_eq!(
            parse_detail(r#"{"detail":"Model not found"}"#).as_deref(),
            Some("Model not found")
        );
        assert_eq!(parse_detail(r#"{"detail":[{"loc":["body"]}]}"#), None);
        assert_eq!(parse_detail("Internal Server Error"), None);
        assert_eq!(parse_detail(r#"{"detail":"  "}"#), None);
    }

    #[test]
    fn test_user_message_prefers_detail() {
        let with_detail = ApiError::Backend {
            status: 401,
            detail: Some("API key required. Please add your a4f.co API key.".into()),
        };
        assert_eq!(
            with_detail.user_message("Failed to generate image"),
            "API key required. Please add your a4f.co API key."
        );

        let without = ApiError::Backend {
            status: 502,
            detail: None,
        };
        assert_eq!(without.user_message("Failed to generate image"), "Failed to generate image");

        let malformed = ApiError::MalformedResponse("Invalid response format".into());
        assert_eq!(malformed.user_message("Failed to generate image"), "Failed to generate image");
    }
}
