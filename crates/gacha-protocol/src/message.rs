//! 标签式消息联合体与帧编解码
//!
//! 消息是封闭的 sum type，一种消息一个分支；新增消息种类只在这里加分支，
//! 服务器与 agent 端同步升级。无法识别的标签在解码时直接报错，
//! 由接收方决定忽略还是断开。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AccountInfo, CredentialToken, GachaEntry, Uid};

/// 协议编解码错误
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("消息编码失败: {0}")]
    Encode(serde_json::Error),
    #[error("消息解码失败: {0}")]
    Decode(serde_json::Error),
}

/// 服务器与 agent 之间的消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentMessage {
    /// 文本通知（认证结果等）
    Msg { msg: String },
    /// agent 认证请求
    Auth { agent_key: String },
    /// 下发抓取任务；uid 为空表示临时校验任务（token 尚未绑定已知账号）
    Task {
        token: CredentialToken,
        #[serde(default)]
        uid: Option<Uid>,
    },
    /// agent 上报任务结果
    TaskResult {
        result: Vec<GachaEntry>,
        uid: Uid,
        token: CredentialToken,
    },
    /// 凭证已过期
    Expired { token: CredentialToken },
    /// 临时校验：凭证有效
    TokenValid { uid: Uid, token: CredentialToken },
    /// 临时校验：凭证无效
    TokenInvalid { token: CredentialToken, msg: String },
    /// 账号档案上报
    UserInfo {
        info: AccountInfo,
        token: CredentialToken,
    },
}

/// 把一条消息编码为一帧文本
pub fn encode_message(msg: &AgentMessage) -> Result<String, ProtocolError> {
    serde_json::to_string(msg).map_err(ProtocolError::Encode)
}

/// 把一帧文本解码为消息
pub fn decode_message(raw: &str) -> Result<AgentMessage, ProtocolError> {
    serde_json::from_str(raw).map_err(ProtocolError::Decode)
}
