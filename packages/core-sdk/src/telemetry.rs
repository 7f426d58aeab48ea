use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Result;
use once_cell::sync::Lazy;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::config::DEFAULT_LOG_DIR;

struct TelemetryState {
    enabled: bool,
    log_dir: PathBuf,
}

static TELEMETRY: Lazy<std::sync::RwLock<TelemetryState>> = Lazy::new(|| {
    std::sync::RwLock::new(TelemetryState {
        enabled: false,
        log_dir: PathBuf::from(DEFAULT_LOG_DIR),
    })
});

const LOG_FILE: &str = "modeldeck.log";

/**
 * \brief 更新遥测开关状态。
 */
pub fn set_enabled(enabled: bool) {
    if let Ok(mut guard) = TELEMETRY.write() {
        guard.enabled = enabled;
    }
}

/**
 * \brief 查询当前遥测开关状态。
 */
pub fn is_enabled() -> bool {
    TELEMETRY.read().map(|g| g.enabled).unwrap_or(false)
}

/**
 * \brief 修改日志目录（默认 ./logs）。
 */
pub fn set_log_dir(dir: impl AsRef<Path>) {
    if let Ok(mut guard) = TELEMETRY.write() {
        guard.log_dir = dir.as_ref().to_path_buf();
    }
}

/**
 * \brief 当前日志文件完整路径。
 */
pub fn log_path() -> PathBuf {
    let dir = TELEMETRY
        .read()
        .map(|g| g.log_dir.clone())
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));
    dir.join(LOG_FILE)
}

pub fn log_event(category: &str, message: &str) {
    emit("INFO", category, message);
}

pub fn log_warn(category: &str, message: &str) {
    emit("WARN", category, message);
}

pub fn log_error(category: &str, message: &str) {
    emit("ERROR", category, message);
}

/**
 * \brief 日志中只保留凭据首尾少量字符。
 */
pub fn mask_key(key: &str) -> String {
    let trimmed = key.trim();
    let count = trimmed.chars().count();
    if count == 0 {
        return "<empty>".to_string();
    }
    if count <= 8 {
        return "*".repeat(count);
    }
    let head: String = trimmed.chars().take(3).collect();
    let tail: String = trimmed.chars().skip(count - 4).collect();
    format!("{}…{}", head, tail)
}

fn emit(level: &str, category: &str, message: &str) {
    let dir = match TELEMETRY.read() {
        Ok(guard) if guard.enabled => guard.log_dir.clone(),
        _ => return,
    };
    if let Err(err) = write_line(&dir, level, category, message) {
        eprintln!("telemetry write failed: {}", err);
    }
}

fn write_line(log_dir: &Path, level: &str, category: &str, message: &str) -> Result<()> {
    if !log_dir.exists() {
        std::fs::create_dir_all(log_dir)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))?;
    writeln!(file, "{}", format_line(OffsetDateTime::now_utc(), level, category, message)?)?;
    Ok(())
}

fn format_line(
    at: OffsetDateTime,
    level: &str,
    category: &str,
    message: &str,
) -> Result<String> {
    let timestamp = at.format(&Rfc3339)?;
    Ok(format!("{} [{}] {} - {}", timestamp, level, category, message))
}
