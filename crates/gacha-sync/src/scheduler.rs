//! 服务端自循环调度
//!
//! 没有 agent 在线时服务端也能自己把账号同步转起来（OPEN_LOOP）。
//! 一轮 = 队列重载出来的一批账号各同步一次；单个账号失败只记数，
//! 不打断整轮。

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::queue::TaskQueue;
use crate::sync::SyncEngine;

/// 一轮同步的统计
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoundSummary {
    /// 成功同步的账号数
    pub synced: u32,
    /// 本轮确认过期的账号数
    pub expired: u32,
    /// 其他原因失败的账号数
    pub failed: u32,
    /// 本轮新插入的记录总数
    pub inserted: u64,
    /// 本轮耗时
    pub elapsed: Duration,
}

/// 调度器当前状态快照
#[derive(Debug, Clone, Default)]
pub struct SchedulerStatus {
    pub rounds_completed: u64,
    pub last_round_at: Option<DateTime<Utc>>,
    pub last_summary: Option<RoundSummary>,
    /// 正在同步的账号昵称；None 表示空闲
    pub syncing: Option<String>,
}

pub struct Scheduler {
    queue: Arc<TaskQueue>,
    engine: Arc<SyncEngine>,
    /// 同一轮内相邻两个账号之间的间隔
    account_delay: Duration,
    status: Mutex<SchedulerStatus>,
}

impl Scheduler {
    pub fn new(queue: Arc<TaskQueue>, engine: Arc<SyncEngine>, account_delay: Duration) -> Self {
        Self {
            queue,
            engine,
            account_delay,
            status: Mutex::new(SchedulerStatus::default()),
        }
    }

    pub fn snapshot(&self) -> SchedulerStatus {
        self.status.lock().clone()
    }

    /// 跑一轮：把队列当前这批账号各同步一次
    pub async fn run_round(&self) -> RoundSummary {
        let started = Instant::now();
        let mut summary = RoundSummary::default();
        loop {
            let task = match self.queue.next_task().await {
                Ok(Some(task)) => task,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "取任务失败, 本轮提前结束");
                    break;
                }
            };
            self.status.lock().syncing = Some(task.nick_name.clone());
            match self.engine.sync_account(&task.token).await {
                Ok(inserted) => {
                    summary.synced += 1;
                    summary.inserted += inserted;
                }
                Err(e) if e.is_credential_invalid() => {
                    info!(nick = %task.nick_name, "凭证已过期, 移出轮转");
                    summary.expired += 1;
                }
                Err(e) => {
                    // 单账号失败不拖垮整轮，下轮还有机会
                    warn!(nick = %task.nick_name, error = %e, "账号同步失败");
                    summary.failed += 1;
                }
            }
            // 队列空了说明这轮到头，别再触发下一次重载
            if self.queue.is_empty().await {
                break;
            }
            if !self.account_delay.is_zero() {
                tokio::time::sleep(self.account_delay).await;
            }
        }
        summary.elapsed = started.elapsed();
        let mut status = self.status.lock();
        status.rounds_completed += 1;
        status.last_round_at = Some(Utc::now());
        status.last_summary = Some(summary.clone());
        status.syncing = None;
        info!(?summary, "一轮同步结束");
        summary
    }

    /// 持续轮转直到 shutdown 触发，轮与轮之间休息一个账号间隔
    ///
    /// 同一进程只该启动一次，重复启动会让同一批账号被扫两遍。
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = self.run_round() => {}
                _ = shutdown.cancelled() => break,
            }
            tokio::select! {
                _ = tokio::time::sleep(self.account_delay.max(Duration::from_secs(1))) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("主循环退出");
    }
}
