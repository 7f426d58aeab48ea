use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;

use crate::{
    error::{check_status, ApiError},
    models::{Category, ModelDescriptor, Tier},
};

/**
 * \brief 目录筛选条件；`None` 即界面上的 "all"。
 */
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogFilters {
    pub tier: Option<Tier>,
    pub category: Option<Category>,
}

impl CatalogFilters {
    /**
     * \brief 只包含已选择项的查询参数。
     */
    pub fn query_pairs(&self) -> Vec<(&'static str, &'static str)> {
        let mut pairs = Vec::with_capacity(2);
        if let Some(tier) = self.tier {
            pairs.push(("tier", tier.as_str()));
        }
        if let Some(category) = self.category {
            pairs.push(("category", category.as_str()));
        }
        pairs
    }
}

/**
 * \brief 目录读取接口，视图层通过它获取模型列表。
 */
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn fetch_models(&self, filters: &CatalogFilters) -> Result<Vec<ModelDescriptor>, ApiError>;

    async fn fetch_model(&self, name: &str) -> Result<ModelDescriptor, ApiError>;
}

#[derive(Deserialize)]
struct ModelsEnvelope {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}

/**
 * \brief 基于 HTTP 的目录客户端，访问 `{backend}/api/models`。
 */
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    api_base: Url,
}

impl CatalogClient {
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
impl CatalogApi for CatalogClient {
    async fn fetch_models(&self, filters: &CatalogFilters) -> Result<Vec<ModelDescriptor>, ApiError> {
        let resp = self
            .http
            .get(self.endpoint(&["models"])?)
            .query(&filters.query_pairs())
            .send()
            .await?;
        let envelope: ModelsEnvelope = check_status(resp).await?.json().await?;
        Ok(envelope.models)
    }

    async fn fetch_model(&self, name: &str) -> Result<ModelDescriptor, ApiError> {
        let resp = self
            .http
            .get(self.endpoint(&["models", name])?)
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }
}

/**
 * \brief 本地关键字搜索：名称或描述包含关键字（忽略大小写）。空关键字返回全部。
 */
pub fn search<'a>(models: &'a [ModelDescriptor], query: &str) -> Vec<&'a ModelDescriptor> {
    let needle = query.to_lowercase();
    models
        .iter()
        .filter(|m| {
            m.name.to_lowercase().contains(&needle)
                || m.description.to_lowercase().contains(&needle)
        })
        .collect()
}

/**
 * \brief 由后端根地址得到 `/api` 基地址。
 */
pub(crate) fn api_base(backend_url: &str) -> Result<Url, ApiError> {
    let base = Url::parse(backend_url.trim())
        .map_err(|e| ApiError::InvalidBaseUrl(format!("{}: {}", backend_url, e)))?;
    join_segments(&base, &["api"])
}

pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidBaseUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
