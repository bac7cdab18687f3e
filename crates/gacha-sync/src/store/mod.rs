//! 持久存储 - 账号与抽卡记录
//!
//! 抽卡记录只插入，从不更新、从不删除；主键 (uid, gacha_ts, pos) 全局唯一，
//! 查重插入必须是原子操作，并发写者（agent 回报与主循环）同时落库也不会产生重复。

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

use async_trait::async_trait;
use gacha_protocol::{AccountInfo, CredentialToken, GachaEntry, Uid};

use crate::error::Result;

/// 账号实体（user 表一行）
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub uid: Uid,
    pub nick_name: String,
    pub token: CredentialToken,
    pub expired: bool,
    pub channel_master_id: i32,
    pub channel_name: String,
    pub is_default: bool,
    pub is_deleted: bool,
    pub is_official: bool,
}

/// 一条抽卡记录（gacha 表一行），主键 (uid, gacha_ts, pos)
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub uid: Uid,
    /// 抽卡时间戳（毫秒）
    pub gacha_ts: u64,
    /// 十连中的位置，单抽为 0
    pub pos: u32,
    pub char_id: String,
    pub char_name: String,
    pub pool_id: String,
    pub pool_name: String,
    pub rarity: u8,
    pub is_new: bool,
}

impl DrawRecord {
    /// 给 agent/上游上报的原始记录补上归属 uid
    pub fn from_entry(uid: &Uid, entry: &GachaEntry) -> Self {
        Self {
            uid: uid.clone(),
            gacha_ts: entry.gacha_ts,
            pos: entry.pos,
            char_id: entry.char_id.clone(),
            char_name: entry.char_name.clone(),
            pool_id: entry.pool_id.clone(),
            pool_name: entry.pool_name.clone(),
            rarity: entry.rarity,
            is_new: entry.is_new,
        }
    }
}

/// 账号与抽卡记录的持久存储
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 所有未过期账号
    async fn accounts_not_expired(&self) -> Result<Vec<Account>>;

    /// 按 uid upsert 账号档案并绑定凭证，同时清除过期标记
    /// （档案来自一次确认有效的凭证交换）
    async fn upsert_account(&self, info: &AccountInfo, token: &CredentialToken) -> Result<()>;

    /// 标记凭证对应账号为过期
    async fn mark_expired(&self, token: &CredentialToken) -> Result<()>;

    /// 凭证确认有效，清除过期标记
    async fn mark_valid(&self, token: &CredentialToken) -> Result<()>;

    /// 指定主键的记录是否已存在
    async fn draw_exists(&self, uid: &Uid, gacha_ts: u64, pos: u32) -> Result<bool>;

    /// 查重插入，返回 true 表示确为新记录；已存在时不做任何更新
    async fn insert_draw(&self, record: &DrawRecord) -> Result<bool>;
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MemoryInner {
        accounts: Vec<Account>,
        draws: HashMap<(String, u64, u32), DrawRecord>,
        load_calls: usize,
    }

    /// 测试用：全内存的 RecordStore
    #[derive(Default)]
    pub struct MemoryRecordStore {
        inner: Mutex<MemoryInner>,
    }

    impl MemoryRecordStore {
        pub fn new() -> Self {
            Self::default()
        }

        /// 预置一个未过期账号
        pub fn seed_account(&self, uid: &str, nick_name: &str, token: &str) {
            self.inner.lock().accounts.push(Account {
                uid: Uid::new(uid),
                nick_name: nick_name.to_string(),
                token: CredentialToken::new(token),
                expired: false,
                channel_master_id: 1,
                channel_name: "官服".to_string(),
                is_default: false,
                is_deleted: false,
                is_official: true,
            });
        }

        pub fn account(&self, uid: &str) -> Option<Account> {
            self.inner
                .lock()
                .accounts
                .iter()
                .find(|a| a.uid.as_str() == uid)
                .cloned()
        }

        pub fn draw_count(&self) -> usize {
            self.inner.lock().draws.len()
        }

        /// accounts_not_expired 被调用的次数（观察队列重载行为）
        pub fn load_calls(&self) -> usize {
            self.inner.lock().load_calls
        }
    }

    #[async_trait]
    impl RecordStore for MemoryRecordStore {
        async fn accounts_not_expired(&self) -> Result<Vec<Account>> {
            let mut inner = self.inner.lock();
            inner.load_calls += 1;
            Ok(inner
                .accounts
                .iter()
                .filter(|a| !a.expired)
                .cloned()
                .collect())
        }

        async fn upsert_account(&self, info: &AccountInfo, token: &CredentialToken) -> Result<()> {
            let mut inner = self.inner.lock();
            if let Some(account) = inner
                .accounts
                .iter_mut()
                .find(|a| a.uid == info.uid)
            {
                account.nick_name = info.nick_name.clone();
                account.token = token.clone();
                account.expired = false;
                account.channel_master_id = info.channel_master_id;
                account.channel_name = info.channel_name.clone();
                account.is_default = info.is_default;
                account.is_deleted = info.is_deleted;
                account.is_official = info.is_official;
            } else {
                inner.accounts.push(Account {
                    uid: info.uid.clone(),
                    nick_name: info.nick_name.clone(),
                    token: token.clone(),
                    expired: false,
                    channel_master_id: info.channel_master_id,
                    channel_name: info.channel_name.clone(),
                    is_default: info.is_default,
                    is_deleted: info.is_deleted,
                    is_official: info.is_official,
                });
            }
            Ok(())
        }

        async fn mark_expired(&self, token: &CredentialToken) -> Result<()> {
            for account in self.inner.lock().accounts.iter_mut() {
                if account.token == *token {
                    account.expired = true;
                }
            }
            Ok(())
        }

        async fn mark_valid(&self, token: &CredentialToken) -> Result<()> {
            for account in self.inner.lock().accounts.iter_mut() {
                if account.token == *token {
                    account.expired = false;
                }
            }
            Ok(())
        }

        async fn draw_exists(&self, uid: &Uid, gacha_ts: u64, pos: u32) -> Result<bool> {
            Ok(self
                .inner
                .lock()
                .draws
                .contains_key(&(uid.as_str().to_string(), gacha_ts, pos)))
        }

        async fn insert_draw(&self, record: &DrawRecord) -> Result<bool> {
            let key = (record.uid.as_str().to_string(), record.gacha_ts, record.pos);
            let mut inner = self.inner.lock();
            if inner.draws.contains_key(&key) {
                return Ok(false);
            }
            inner.draws.insert(key, record.clone());
            Ok(true)
        }
    }
}
