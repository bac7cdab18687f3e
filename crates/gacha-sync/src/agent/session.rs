//! 单个 agent 连接的会话状态机
//!
//! 状态只会单向推进：Connected -> Authenticated -> Closed。
//! 认证之前任何业务消息都只换来一句 "not auth"，不触碰存储；
//! 认证失败不断开连接，允许 agent 换 key 重试。
//!
//! ## NOTE: 回报入库先于下一次派发
//!
//! task_result 的记录必须先落库，再安排延迟派发下一个任务；
//! 延迟派发本身在独立任务里睡眠，不会占住会话的读循环。

use async_trait::async_trait;
use gacha_protocol::{AgentMessage, CredentialToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ValidationOutcome;
use crate::error::Result;
use crate::queue::TaskQueue;
use crate::store::RecordStore;
use crate::sync::SyncEngine;

/// 会话向 agent 发消息的出口
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn send(&self, msg: &AgentMessage) -> Result<()>;
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 已连接，尚未通过 key 校验
    Connected,
    /// 已认证，可以收发任务
    Authenticated,
    /// 已关闭（连接断开或服务端主动踢出）
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Connected => write!(f, "已连接"),
            SessionState::Authenticated => write!(f, "已认证"),
            SessionState::Closed => write!(f, "已关闭"),
        }
    }
}

pub struct AgentSession {
    id: Uuid,
    transport: Arc<dyn AgentTransport>,
    agent_key: String,
    dispatch_delay: Duration,
    queue: Arc<TaskQueue>,
    engine: Arc<SyncEngine>,
    store: Arc<dyn RecordStore>,
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<String, oneshot::Sender<ValidationOutcome>>>,
}

impl AgentSession {
    pub fn new(
        transport: Arc<dyn AgentTransport>,
        agent_key: String,
        dispatch_delay: Duration,
        queue: Arc<TaskQueue>,
        engine: Arc<SyncEngine>,
        store: Arc<dyn RecordStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            transport,
            agent_key,
            dispatch_delay,
            queue,
            engine,
            store,
            state: Mutex::new(SessionState::Connected),
            pending: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state() == SessionState::Authenticated
    }

    /// 当前挂起的临场校验数（超时清理是否生效看这里）
    pub fn pending_validation_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// 处理 agent 发来的一条消息
    pub async fn handle_message(self: &Arc<Self>, msg: AgentMessage) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Ok(());
        }
        if !self.is_authenticated() {
            return self.handle_unauthenticated(msg).await;
        }
        match msg {
            AgentMessage::Msg { msg } => {
                debug!(session = %self.id, msg = %msg, "agent 消息");
                Ok(())
            }
            AgentMessage::Auth { .. } => {
                // 重复认证无害，直接应答
                self.transport
                    .send(&AgentMessage::Msg {
                        msg: "auth success".to_string(),
                    })
                    .await
            }
            AgentMessage::TaskResult { result, uid, token } => {
                let fresh = self.engine.ingest_entries(&uid, &result).await?;
                self.store.mark_valid(&token).await?;
                info!(
                    session = %self.id,
                    uid = %uid,
                    reported = result.len(),
                    fresh,
                    "agent 回报已入库"
                );
                self.resolve_pending(&token, ValidationOutcome::Valid { uid });
                self.schedule_dispatch();
                Ok(())
            }
            AgentMessage::Expired { token } => {
                self.store.mark_expired(&token).await?;
                info!(session = %self.id, "agent 报告凭证过期");
                self.resolve_pending(&token, ValidationOutcome::Expired);
                self.schedule_dispatch();
                Ok(())
            }
            // 只用于兑现挂起的临场校验；没有挂起项时仅是信息性消息，不碰存储
            AgentMessage::TokenValid { uid, token } => {
                self.resolve_pending(&token, ValidationOutcome::Valid { uid });
                Ok(())
            }
            AgentMessage::TokenInvalid { token, msg } => {
                self.resolve_pending(&token, ValidationOutcome::Invalid { msg });
                Ok(())
            }
            AgentMessage::UserInfo { info, token } => {
                self.store.upsert_account(&info, &token).await?;
                info!(session = %self.id, uid = %info.uid, "agent 带回账号档案");
                Ok(())
            }
            AgentMessage::Task { .. } => {
                warn!(session = %self.id, "agent 不应向服务端派任务, 忽略");
                Ok(())
            }
        }
    }

    async fn handle_unauthenticated(self: &Arc<Self>, msg: AgentMessage) -> Result<()> {
        match msg {
            AgentMessage::Auth { agent_key } => {
                if agent_key == self.agent_key {
                    *self.state.lock() = SessionState::Authenticated;
                    info!(session = %self.id, "agent 认证通过");
                    self.transport
                        .send(&AgentMessage::Msg {
                            msg: "auth success".to_string(),
                        })
                        .await?;
                    // 认证即开工，第一个任务不等延迟
                    self.dispatch_next().await
                } else {
                    warn!(session = %self.id, "agent 认证失败");
                    self.transport
                        .send(&AgentMessage::Msg {
                            msg: "auth fail".to_string(),
                        })
                        .await
                }
            }
            other => {
                debug!(session = %self.id, ?other, "未认证的消息, 拒绝处理");
                self.transport
                    .send(&AgentMessage::Msg {
                        msg: "not auth".to_string(),
                    })
                    .await
            }
        }
    }

    /// 立即从队列取一个任务派给 agent
    pub async fn dispatch_next(self: &Arc<Self>) -> Result<()> {
        if !self.is_authenticated() {
            return Ok(());
        }
        match self.queue.next_task().await? {
            Some(task) => {
                info!(session = %self.id, nick = %task.nick_name, "派发同步任务");
                self.transport
                    .send(&AgentMessage::Task {
                        token: task.token,
                        uid: Some(task.uid),
                    })
                    .await
            }
            None => {
                debug!(session = %self.id, "没有可派发的账号");
                Ok(())
            }
        }
    }

    /// 延迟一个派发间隔后取下一个任务
    pub fn schedule_dispatch(self: &Arc<Self>) {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(session.dispatch_delay).await;
            if session.state() == SessionState::Closed {
                return;
            }
            if let Err(e) = session.dispatch_next().await {
                warn!(session = %session.id, error = %e, "延迟派发失败");
            }
        });
    }

    /// 发起一次临场校验：登记挂起项并把裸凭证派给 agent
    ///
    /// 返回的 receiver 由 agent 的 token_valid / token_invalid 应答兑现；
    /// 发送失败时挂起项立即回收。
    pub async fn dispatch_validation(
        &self,
        token: &CredentialToken,
    ) -> Result<oneshot::Receiver<ValidationOutcome>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(token.content.clone(), tx);
        let sent = self
            .transport
            .send(&AgentMessage::Task {
                token: token.clone(),
                uid: None,
            })
            .await;
        if let Err(e) = sent {
            self.pending.lock().remove(&token.content);
            return Err(e);
        }
        Ok(rx)
    }

    /// 临场校验超时后的清理
    pub fn cancel_pending(&self, token: &CredentialToken) {
        self.pending.lock().remove(&token.content);
    }

    fn resolve_pending(&self, token: &CredentialToken, outcome: ValidationOutcome) {
        if let Some(tx) = self.pending.lock().remove(&token.content) {
            // 接收端可能已超时放弃，发送失败可以忽略
            let _ = tx.send(outcome);
        }
    }

    /// 关闭会话：之后所有消息都被丢弃，挂起的校验全部作废
    pub fn close(&self) {
        *self.state.lock() = SessionState::Closed;
        self.pending.lock().clear();
    }
}

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// 测试用：把发出的消息记在内存里
    #[derive(Default)]
    pub struct DummyTransport {
        sent: Mutex<Vec<AgentMessage>>,
        fail_sends: Mutex<bool>,
    }

    impl DummyTransport {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn sent(&self) -> Vec<AgentMessage> {
            self.sent.lock().clone()
        }

        pub fn last_sent(&self) -> Option<AgentMessage> {
            self.sent.lock().last().cloned()
        }

        /// 之后的所有发送都失败（模拟断开的连接）
        pub fn break_pipe(&self) {
            *self.fail_sends.lock() = true;
        }
    }

    #[async_trait]
    impl AgentTransport for DummyTransport {
        async fn send(&self, msg: &AgentMessage) -> Result<()> {
            if *self.fail_sends.lock() {
                return Err(crate::error::GachaSyncError::IO(
                    "broken pipe".to_string(),
                ));
            }
            self.sent.lock().push(msg.clone());
            Ok(())
        }
    }
}
