//! 在线 agent 注册表
//!
//! 临场校验随机挑一个已认证的 agent 执行，超时（默认 10s）后
//! 挂起项必须回收，不能在会话里越积越多。

use gacha_protocol::CredentialToken;
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::session::AgentSession;
use super::ValidationOutcome;
use crate::error::{GachaSyncError, Result};

#[derive(Default)]
pub struct AgentRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<AgentSession>>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: Arc<AgentSession>) {
        info!(session = %session.id(), "agent 会话上线");
        self.sessions.write().insert(session.id(), session);
    }

    pub fn remove(&self, id: Uuid) {
        if let Some(session) = self.sessions.write().remove(&id) {
            session.close();
            info!(session = %id, "agent 会话下线");
        }
    }

    pub fn online_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// 随机挑一个已认证的会话
    pub fn random_session(&self) -> Option<Arc<AgentSession>> {
        let sessions = self.sessions.read();
        let candidates: Vec<&Arc<AgentSession>> = sessions
            .values()
            .filter(|s| s.is_authenticated())
            .collect();
        // thread_rng 在异步上下文里不是 Send，用 StdRng
        candidates
            .choose(&mut StdRng::from_entropy())
            .map(|s| Arc::clone(s))
    }

    /// 让一个随机 agent 临场校验凭证
    ///
    /// 没有可用 agent 时返回 Timeout 之外的错误由调用方兜底；
    /// 超时后会话里的挂起项保证被回收。
    pub async fn validate_token(
        &self,
        token: &CredentialToken,
        timeout: Duration,
    ) -> Result<ValidationOutcome> {
        let session = self
            .random_session()
            .ok_or_else(|| GachaSyncError::Other("没有在线的 agent".to_string()))?;
        debug!(session = %session.id(), "派发临场校验");
        let rx = session.dispatch_validation(token).await?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            // 会话在等待期间被关闭
            Ok(Err(_)) => {
                session.cancel_pending(token);
                Err(GachaSyncError::Timeout("agent 会话已关闭".to_string()))
            }
            Err(_) => {
                session.cancel_pending(token);
                Err(GachaSyncError::Timeout("agent 校验超时".to_string()))
            }
        }
    }
}
