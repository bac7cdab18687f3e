//! RecordStore 的 sqlite 实现
//!
//! 连接放在 Arc<Mutex<Connection>> 后面，方法内不跨 await 持锁；
//! 查重插入用 INSERT OR IGNORE 落在主键约束上，天然原子。

use async_trait::async_trait;
use gacha_protocol::{AccountInfo, CredentialToken, Uid};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

use super::{Account, DrawRecord, RecordStore};
use crate::error::{GachaSyncError, Result};

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 打开（必要时创建）数据库文件并建表
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::init_schema(&conn)?;
        info!(path = %path.as_ref().display(), "sqlite 数据库已就绪");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 全内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS "user" (
                uid TEXT PRIMARY KEY,
                nick_name TEXT NOT NULL,
                hg_token TEXT NOT NULL,
                expired INTEGER NOT NULL DEFAULT 0,
                channel_master_id INTEGER NOT NULL DEFAULT 1,
                channel_name TEXT NOT NULL DEFAULT '官服',
                is_default INTEGER NOT NULL DEFAULT 0,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                is_official INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS gacha (
                uid TEXT NOT NULL,
                gacha_ts INTEGER NOT NULL,
                pos INTEGER NOT NULL,
                char_id TEXT NOT NULL,
                char_name TEXT NOT NULL,
                pool_id TEXT NOT NULL,
                pool_name TEXT NOT NULL,
                rarity INTEGER NOT NULL,
                is_new INTEGER NOT NULL,
                PRIMARY KEY (uid, gacha_ts, pos)
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| GachaSyncError::Other(format!("数据库锁中毒: {}", e)))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn accounts_not_expired(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"SELECT uid, nick_name, hg_token, expired, channel_master_id, channel_name,
                      is_default, is_deleted, is_official
               FROM "user" WHERE expired = 0"#,
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(row_to_account(row)?);
        }
        Ok(out)
    }

    async fn upsert_account(&self, info: &AccountInfo, token: &CredentialToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO "user" (uid, nick_name, hg_token, expired, channel_master_id,
                                channel_name, is_default, is_deleted, is_official)
            VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(uid) DO UPDATE SET
                nick_name = excluded.nick_name,
                hg_token = excluded.hg_token,
                expired = 0,
                channel_master_id = excluded.channel_master_id,
                channel_name = excluded.channel_name,
                is_default = excluded.is_default,
                is_deleted = excluded.is_deleted,
                is_official = excluded.is_official
            "#,
            params![
                info.uid.as_str(),
                info.nick_name,
                token.content,
                info.channel_master_id,
                info.channel_name,
                info.is_default as i32,
                info.is_deleted as i32,
                info.is_official as i32,
            ],
        )?;
        Ok(())
    }

    async fn mark_expired(&self, token: &CredentialToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"UPDATE "user" SET expired = 1 WHERE hg_token = ?1"#,
            params![token.content],
        )?;
        Ok(())
    }

    async fn mark_valid(&self, token: &CredentialToken) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"UPDATE "user" SET expired = 0 WHERE hg_token = ?1"#,
            params![token.content],
        )?;
        Ok(())
    }

    async fn draw_exists(&self, uid: &Uid, gacha_ts: u64, pos: u32) -> Result<bool> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT 1 FROM gacha WHERE uid = ?1 AND gacha_ts = ?2 AND pos = ?3")?;
        let exists = stmt.exists(params![uid.as_str(), gacha_ts as i64, pos])?;
        Ok(exists)
    }

    async fn insert_draw(&self, record: &DrawRecord) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO gacha (uid, gacha_ts, pos, char_id, char_name,
                                         pool_id, pool_name, rarity, is_new)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.uid.as_str(),
                record.gacha_ts as i64,
                record.pos,
                record.char_id,
                record.char_name,
                record.pool_id,
                record.pool_name,
                record.rarity,
                record.is_new as i32,
            ],
        )?;
        Ok(changed == 1)
    }
}

fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
    Ok(Account {
        uid: Uid::new(row.get::<_, String>(0)?),
        nick_name: row.get(1)?,
        token: CredentialToken::new(row.get::<_, String>(2)?),
        expired: row.get::<_, i32>(3)? != 0,
        channel_master_id: row.get(4)?,
        channel_name: row.get(5)?,
        is_default: row.get::<_, i32>(6)? != 0,
        is_deleted: row.get::<_, i32>(7)? != 0,
        is_official: row.get::<_, i32>(8)? != 0,
    })
}
