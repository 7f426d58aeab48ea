use anyhow::Result;
use rusqlite::Connection;

use crate::{db, telemetry};

/** \brief 凭据在 app_config 中的固定键名。 */
pub const API_KEY_ENTRY: &str = "a4f_api_key";

/**
 * \brief 用户 API Key 的持有者。
 * \details 打开时从存储读取一次，之后 set/clear 同步写回存储；不校验格式。
 */
pub struct KeyStore {
    conn: Connection,
    current: String,
}

impl KeyStore {
    pub fn open(conn: Connection) -> Result<Self> {
        let current = db::get_config(&conn, API_KEY_ENTRY)?.unwrap_or_default();
        Ok(Self { conn, current })
    }

    /**
     * \brief 当前凭据，未设置时为空串。
     */
    pub fn get(&self) -> &str {
        &self.current
    }

    pub fn set(&mut self, value: &str) -> Result<()> {
        db::set_config(&self.conn, API_KEY_ENTRY, value)?;
        self.current = value.to_string();
        telemetry::log_event("keystore", &format!("set key={}", telemetry::mask_key(value)));
        Ok(())
    }

    pub fn clear(&mut self) -> Result<()> {
        db::delete_config(&self.conn, API_KEY_ENTRY)?;
        self.current.clear();
        telemetry::log_event("keystore", "cleared");
        Ok(())
    }

    pub fn is_present(&self) -> bool {
        !self.current.trim().is_empty()
    }

    /**
     * \brief 借出底层连接，供同一进程的其他配置读写复用。
     */
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("current", &telemetry::mask_key(&self.current))
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn store_with(key: &str) -> KeyStore {
    let mut store = KeyStore::open(db::mem_conn()).expect("open store");
    if !key.is_empty() {
        store.set(key).expect("set key");
    }
    store
}
