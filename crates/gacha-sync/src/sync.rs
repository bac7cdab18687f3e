//! 单账号增量同步引擎
//!
//! 职责：
//! - 凭证校验与 token 交换
//! - 卡池枚举与游标分页拉取
//! - 按主键查重入库，只计真正新增的记录
//!
//! ## NOTE: 引擎不做重试
//!
//! 上游临时故障直接向上冒泡，由调度层（Scheduler / agent 会话）决定
//! 本轮跳过还是下轮再来；引擎内只有翻页节奏延迟。

use gacha_protocol::{CredentialToken, GachaEntry, Uid};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{GachaSyncError, Result};
use crate::source::{GachaSource, LoginCookie, PageCursor, Pool, U8Token, ARKNIGHTS_APP_CODE};
use crate::store::{DrawRecord, RecordStore};

/// 同步引擎参数
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// 单页拉取条数
    pub page_size: u32,
    /// 同一卡池相邻两页之间的间隔（尊重上游限流）
    pub page_delay: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            page_size: 10,
            page_delay: Duration::from_secs(5),
        }
    }
}

/// 同步引擎
pub struct SyncEngine {
    store: Arc<dyn RecordStore>,
    source: Arc<dyn GachaSource>,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        source: Arc<dyn GachaSource>,
        options: SyncOptions,
    ) -> Self {
        Self {
            store,
            source,
            options,
        }
    }

    /// 全量增量刷新一个账号，返回本次新插入的记录数
    ///
    /// 凭证被上游拒绝时标记账号过期并返回 CredentialInvalid，
    /// 这是预期内的可恢复结果，调用方不应视为崩溃。
    pub async fn sync_account(&self, token: &CredentialToken) -> Result<u64> {
        debug!("检查凭证是否有效");
        if !self.source.check_token(token).await? {
            self.store.mark_expired(token).await?;
            return Err(GachaSyncError::CredentialInvalid);
        }

        debug!("生成应用级 token");
        let app_token = self.source.grant_app_token(token).await?;

        debug!("获取绑定列表");
        let bindings = self.source.binding_list(&app_token).await?;
        let binding = bindings.first().ok_or_else(|| {
            GachaSyncError::UnexpectedBindingShape("绑定列表为空".to_string())
        })?;
        // 绑定形状不符说明上游契约变了，必须响亮失败，不能静默吞掉
        if binding.app_code != ARKNIGHTS_APP_CODE {
            return Err(GachaSyncError::UnexpectedBindingShape(format!(
                "这是什么? appCode={} appName={}",
                binding.app_code, binding.app_name
            )));
        }
        let account = binding
            .binding_list
            .first()
            .ok_or_else(|| {
                GachaSyncError::UnexpectedBindingShape("应用下没有绑定账号".to_string())
            })?
            .clone();
        let uid = account.uid.clone();
        let nick_name = account.nick_name.clone();
        self.store.upsert_account(&account, token).await?;

        debug!(nick = %nick_name, "获取会话 token 并登录");
        let u8_token = self.source.u8_token_by_uid(&app_token, &uid).await?;
        let cookie = self.source.login(&u8_token).await?;

        debug!(nick = %nick_name, "获取卡池列表");
        let pools = self.source.pool_list(&uid, &u8_token, &cookie).await?;

        let mut total = 0u64;
        for pool in &pools {
            total += self
                .sync_pool(&uid, &nick_name, &u8_token, &cookie, pool)
                .await?;
        }
        info!(nick = %nick_name, total, "账号同步完成");
        Ok(total)
    }

    /// 同步一个卡池：游标分页拉取 + 查重入库
    async fn sync_pool(
        &self,
        uid: &Uid,
        nick_name: &str,
        u8_token: &U8Token,
        cookie: &LoginCookie,
        pool: &Pool,
    ) -> Result<u64> {
        // 卡池名称中可能有换行符
        let pool_name = pool.name.replace('\n', "-");
        let mut cursor: Option<PageCursor> = None;
        let mut total = 0u64;
        loop {
            let page = self
                .source
                .gacha_history(cookie, u8_token, uid, pool, self.options.page_size, cursor)
                .await?;
            let mut fresh = 0u64;
            for entry in &page.list {
                if self
                    .store
                    .insert_draw(&DrawRecord::from_entry(uid, entry))
                    .await?
                {
                    fresh += 1;
                }
            }
            total += fresh;
            debug!(
                nick = %nick_name,
                pool = %pool_name,
                page_len = page.list.len(),
                fresh,
                "已处理一页历史记录"
            );

            if page.list.is_empty() || !page.has_more {
                break;
            }
            // 整页都是旧记录说明已经翻到上次同步的重叠区，继续翻只会原地打转
            if fresh == 0 {
                debug!(nick = %nick_name, pool = %pool_name, "本页没有新增记录, 停止翻页");
                break;
            }
            let last = match page.list.last() {
                Some(last) => last,
                None => break,
            };
            cursor = Some(PageCursor {
                gacha_ts: last.gacha_ts,
                pos: last.pos,
            });
            if !self.options.page_delay.is_zero() {
                tokio::time::sleep(self.options.page_delay).await;
            }
        }
        Ok(total)
    }

    /// agent 上报结果的入库路径，与本地同步共用查重插入
    pub async fn ingest_entries(&self, uid: &Uid, entries: &[GachaEntry]) -> Result<u64> {
        let mut fresh = 0u64;
        for entry in entries {
            if self
                .store
                .insert_draw(&DrawRecord::from_entry(uid, entry))
                .await?
            {
                fresh += 1;
            }
        }
        if fresh < entries.len() as u64 {
            warn!(
                uid = %uid,
                reported = entries.len(),
                fresh,
                "上报记录部分已存在, 查重后入库"
            );
        }
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_helpers::FakeGachaSource;
    use crate::store::test_helpers::MemoryRecordStore;

    fn fast_options() -> SyncOptions {
        SyncOptions {
            page_size: 10,
            page_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_pagination_consumes_exactly_reported_pages() {
        // 三页脚本：前两页 hasMore=true，第三页收尾
        let source = FakeGachaSource::new("1001", "博士").with_pool_pages(
            "NORM_1",
            "标准寻访",
            vec![
                FakeGachaSource::page(&[(300, 0), (290, 0), (280, 0)], true),
                FakeGachaSource::page(&[(270, 0), (260, 0)], true),
                FakeGachaSource::page(&[(250, 0)], false),
            ],
        );
        let store = Arc::new(MemoryRecordStore::new());
        let engine = SyncEngine::new(store.clone(), Arc::new(source), fast_options());

        let total = engine
            .sync_account(&CredentialToken::new("tok"))
            .await
            .unwrap();
        assert_eq!(total, 6);
        assert_eq!(store.draw_count(), 6);
    }

    #[tokio::test]
    async fn test_pagination_stops_when_page_adds_nothing() {
        // 第二页与第一页完全重叠且谎称还有更多：靠"零新增"自检终止
        let source = FakeGachaSource::new("1001", "博士").with_pool_pages(
            "NORM_1",
            "标准寻访",
            vec![
                FakeGachaSource::page(&[(300, 0), (290, 0)], true),
                FakeGachaSource::page(&[(300, 0), (290, 0)], true),
                FakeGachaSource::page(&[(100, 0)], false),
            ],
        );
        let store = Arc::new(MemoryRecordStore::new());
        let source = Arc::new(source);
        let engine = SyncEngine::new(store.clone(), source.clone(), fast_options());

        let total = engine
            .sync_account(&CredentialToken::new("tok"))
            .await
            .unwrap();
        assert_eq!(total, 2);
        // 第三页不应被消费
        assert_eq!(source.history_calls(), 2);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let pages = || {
            vec![
                FakeGachaSource::page(&[(300, 0), (290, 0)], true),
                FakeGachaSource::page(&[(280, 0)], false),
            ]
        };
        let store = Arc::new(MemoryRecordStore::new());

        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(FakeGachaSource::new("1001", "博士").with_pool_pages(
                "NORM_1",
                "标准寻访",
                pages(),
            )),
            fast_options(),
        );
        assert_eq!(
            engine
                .sync_account(&CredentialToken::new("tok"))
                .await
                .unwrap(),
            3
        );

        // 第二次全量重放：零新增，不产生重复
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(FakeGachaSource::new("1001", "博士").with_pool_pages(
                "NORM_1",
                "标准寻访",
                pages(),
            )),
            fast_options(),
        );
        assert_eq!(
            engine
                .sync_account(&CredentialToken::new("tok"))
                .await
                .unwrap(),
            0
        );
        assert_eq!(store.draw_count(), 3);
    }

    #[tokio::test]
    async fn test_invalid_credential_marks_expired_without_writes() {
        let source = FakeGachaSource::new("1001", "博士").reject_token("bad-tok");
        let store = Arc::new(MemoryRecordStore::new());
        store.seed_account("1001", "博士", "bad-tok");
        let engine = SyncEngine::new(store.clone(), Arc::new(source), fast_options());

        let err = engine
            .sync_account(&CredentialToken::new("bad-tok"))
            .await
            .unwrap_err();
        assert!(err.is_credential_invalid());
        assert!(store.account("1001").unwrap().expired);
        assert_eq!(store.draw_count(), 0);
    }

    #[tokio::test]
    async fn test_unexpected_binding_shape_fails_loudly() {
        let source = FakeGachaSource::new("1001", "博士").with_app_code("some_other_game");
        let store = Arc::new(MemoryRecordStore::new());
        let engine = SyncEngine::new(store.clone(), Arc::new(source), fast_options());

        let err = engine
            .sync_account(&CredentialToken::new("tok"))
            .await
            .unwrap_err();
        assert!(matches!(err, GachaSyncError::UnexpectedBindingShape(_)));
        assert_eq!(store.draw_count(), 0);
    }

    #[tokio::test]
    async fn test_ingest_entries_dedups() {
        let store = Arc::new(MemoryRecordStore::new());
        let engine = SyncEngine::new(
            store.clone(),
            Arc::new(FakeGachaSource::new("1001", "博士")),
            fast_options(),
        );
        let uid = Uid::new("1001");
        let page = FakeGachaSource::page(&[(300, 0), (290, 0)], false);

        assert_eq!(engine.ingest_entries(&uid, &page.list).await.unwrap(), 2);
        // 同一批重复上报只计零新增
        assert_eq!(engine.ingest_entries(&uid, &page.list).await.unwrap(), 0);
        assert_eq!(store.draw_count(), 2);
    }
}
