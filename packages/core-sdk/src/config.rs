use std::path::PathBuf;

use anyhow::Result;
use rusqlite::Connection;

use crate::db;

pub const DEFAULT_DB_FILE: &str = "modeldeck.db";
pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8001";
pub const DEFAULT_UPSTREAM_URL: &str = "https://api.a4f.co/v1";
pub const DEFAULT_DISPLAY_URL: &str = "https://www.a4f.co/api";
pub const DEFAULT_LOG_DIR: &str = "logs";

/**
 * \brief 数据库路径，`MODELDECK_DB` 可覆盖。
 */
pub fn db_path() -> PathBuf {
    env_non_empty("MODELDECK_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

/**
 * \brief 遥测日志目录，`MODELDECK_LOG_DIR` 可覆盖。
 */
pub fn log_dir() -> PathBuf {
    env_non_empty("MODELDECK_LOG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR))
}

/**
 * \brief 解析客户端使用的后端地址。
 * \details 优先级：环境变量 `MODELDECK_BACKEND_URL` > 已保存配置 > 默认值。
 */
pub fn resolve_backend_url(conn: &Connection) -> Result<String> {
    Ok(pick_backend_url(
        env_non_empty("MODELDECK_BACKEND_URL"),
        db::get_backend_url(conn)?,
    ))
}

fn pick_backend_url(from_env: Option<String>, stored: Option<String>) -> String {
    from_env
        .or(stored)
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string())
}

/**
 * \brief 代理后端所转发的上游网关地址。
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamConfig {
    /** \brief OpenAI 兼容 API 基地址 */
    pub api_base: String,
    /** \brief 模型展示目录 API 基地址 */
    pub display_base: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_UPSTREAM_URL.to_string(),
            display_base: DEFAULT_DISPLAY_URL.to_string(),
        }
    }
}

impl UpstreamConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: env_non_empty("MODELDECK_UPSTREAM_URL").unwrap_or(defaults.api_base),
            display_base: env_non_empty("MODELDECK_DISPLAY_URL")
                .unwrap_or(defaults.display_base),
        }
    }
}

/**
 * \brief 静态前端目录（可选）。
 */
pub fn ui_dir() -> Option<PathBuf> {
    env_non_empty("MODELDECK_UI_DIR").map(PathBuf::from)
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
