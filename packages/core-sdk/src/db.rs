use anyhow::Result;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::{path::Path, thread, time::Duration};

use crate::config;

/**
 * \brief 打开默认数据库文件（`MODELDECK_DB` 或当前目录下的 modeldeck.db）。
 */
pub fn open_default_db() -> Result<Connection> {
    open_db(config::db_path())
}

/**
 * \brief 打开指定路径的数据库并完成迁移。
 */
pub fn open_db(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;
    migrate(&conn)?;
    Ok(conn)
}

/**
 * \brief 运行数据库迁移，创建必要表结构。
 */
pub fn migrate(conn: &Connection) -> Result<()> {
    retry_on_locked(|| {
        conn.execute_batch(
            r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS app_config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
        )
    })?;
    Ok(())
}

/**
 * \brief 读取一项配置。
 */
pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key=?1",
        params![key],
        |row| row.get::<_, String>(0),
    )
    .optional()
    .map_err(Into::into)
}

/**
 * \brief 写入一项配置（存在则覆盖）。
 */
pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<()> {
    retry_on_locked(|| {
        conn.execute(
            "INSERT INTO app_config (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
            params![key, value],
        )
    })?;
    Ok(())
}

/**
 * \brief 删除一项配置，不存在时无操作。
 */
pub fn delete_config(conn: &Connection, key: &str) -> Result<()> {
    retry_on_locked(|| conn.execute("DELETE FROM app_config WHERE key=?1", params![key]))?;
    Ok(())
}

fn set_bool_config(conn: &Connection, key: &str, value: bool) -> Result<()> {
    set_config(conn, key, if value { "1" } else { "0" })
}

fn get_bool_config(conn: &Connection, key: &str, default: bool) -> Result<bool> {
    Ok(get_config(conn, key)?.map(|s| s == "1").unwrap_or(default))
}

/**
 * \brief 读取遥测开关。
 */
pub fn get_telemetry_enabled(conn: &Connection) -> Result<bool> {
    get_bool_config(conn, "telemetry_enabled", false)
}

/**
 * \brief 更新遥测开关。
 */
pub fn set_telemetry_enabled(conn: &Connection, enabled: bool) -> Result<()> {
    set_bool_config(conn, "telemetry_enabled", enabled)
}

pub fn get_backend_url(conn: &Connection) -> Result<Option<String>> {
    get_config(conn, "backend_url")
}

pub fn set_backend_url(conn: &Connection, url: &str) -> Result<()> {
    set_config(conn, "backend_url", url.trim().trim_end_matches('/'))
}

const LOCK_RETRIES: u64 = 5;

/**
 * \brief SQLite 忙/锁冲突时按线性退避重试，其余错误直接返回。
 */
fn retry_on_locked<T, F>(mut action: F) -> Result<T>
where
    F: FnMut() -> rusqlite::Result<T>,
{
    let mut attempt = 0;
    loop {
        match action() {
            Err(rusqlite::Error::SqliteFailure(err, _))
                if is_lock_conflict(err.code) && attempt < LOCK_RETRIES =>
            {
                attempt += 1;
                thread::sleep(Duration::from_millis(200 * attempt));
            }
            other => return Ok(other?),
        }
    }
}

fn is_lock_conflict(code: ErrorCode) -> bool {
    matches!(code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
}

#[cfg(test)]
pub(crate) fn mem_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("open in-memory db");
    migrate(&conn).expect("migrate");
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_set_overwrite_delete() {
        let conn = mem_conn();
        assert_eq!(get_config(&conn, "k").expect("get empty"), None);

        set_config(&conn, "k", "v1").expect("set");
        set_config(&conn, "k", "v2").expect("overwrite");
        assert_eq!(get_config(&conn, "k").expect("get").as_deref(), Some("v2"));

        delete_config(&conn, "k").expect("delete");
        assert_eq!(get_config(&conn, "k").expect("get after delete"), None);
        delete_config(&conn, "k").expect("delete twice is a noop");
    }

    #[test]
    fn test_telemetry_flag_defaults_off() {
        let conn = mem_conn();
        assert!(!get_telemetry_enabled(&conn).expect("default"));
        set_telemetry_enabled(&conn, true).expect("enable");
        assert!(get_telemetry_enabled(&conn).expect("enabled"));
    }

    #[test]
    fn test_backend_url_is_normalized() {
        let conn = mem_conn();
        set_backend_url(&conn, " http://localhost:8001/ ").expect("set url");
        assert_eq!(
            get_backend_url(&conn).expect("get url").as_deref(),
            Some("http://localhost:8001")
        );
    }

    #[test]
    fn test_open_db_migrates_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("modeldeck.db");
        {
            let conn = open_db(&path).expect("open first");
            set_config(&conn, "backend_url", "http://a").expect("set");
        }
        let conn = open_db(&path).expect("reopen");
        assert_eq!(
            get_config(&conn, "backend_url").expect("get").as_deref(),
            Some("http://a")
        );
    }
}
