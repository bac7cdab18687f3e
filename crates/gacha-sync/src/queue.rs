//! 同步任务队列
//!
//! 队列耗尽时从存储重载所有未过期账号并洗牌，保证一轮内每个账号
//! 恰好出现一次、轮与轮之间顺序随机。重载在队列锁内完成，并发取任务
//! 最多造成一次额外重载，不会把同一账号发给两个 agent。

use gacha_protocol::{CredentialToken, Uid};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::store::RecordStore;

/// 一次待执行的账号同步
#[derive(Debug, Clone, PartialEq)]
pub struct SyncTask {
    pub uid: Uid,
    pub nick_name: String,
    pub token: CredentialToken,
}

/// 账号同步任务队列
pub struct TaskQueue {
    store: Arc<dyn RecordStore>,
    inner: Mutex<VecDeque<SyncTask>>,
}

impl TaskQueue {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            store,
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// 取下一个任务；队列空了先重载
    ///
    /// 存储里没有任何未过期账号时返回 None。
    pub async fn next_task(&self) -> Result<Option<SyncTask>> {
        let mut queue = self.inner.lock().await;
        if queue.is_empty() {
            self.reload(&mut queue).await?;
        }
        Ok(queue.pop_front())
    }

    /// 队列中剩余任务数
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    async fn reload(&self, queue: &mut VecDeque<SyncTask>) -> Result<()> {
        let accounts = self.store.accounts_not_expired().await?;
        let mut tasks: Vec<SyncTask> = accounts
            .into_iter()
            .map(|account| SyncTask {
                uid: account.uid,
                nick_name: account.nick_name,
                token: account.token,
            })
            .collect();
        // thread_rng 在异步上下文里不是 Send，用 StdRng
        tasks.shuffle(&mut StdRng::from_entropy());
        debug!(count = tasks.len(), "任务队列已重载");
        queue.extend(tasks);
        Ok(())
    }
}
