use gacha_protocol::ProtocolError;
use rusqlite;
use std::fmt;

#[derive(Debug)]
pub enum GachaSyncError {
    /// 凭证被上游拒绝（预期内的可恢复结果，账号会被标记为过期）
    CredentialInvalid,
    /// 上游临时故障（超时、网络错误），本轮跳过该账号即可
    Upstream(String),
    /// 上游绑定数据形状与预期应用不符，说明上游契约变了，必须响亮失败
    UnexpectedBindingShape(String),
    /// agent 协议违规（无法解析的帧、乱序消息）
    Protocol(String),
    SqliteError(rusqlite::Error),
    JsonError(String),
    IO(String),
    Config(String),
    Timeout(String),
    Other(String),
}

impl fmt::Display for GachaSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GachaSyncError::CredentialInvalid => write!(f, "Credential invalid"),
            GachaSyncError::Upstream(e) => write!(f, "Upstream error: {}", e),
            GachaSyncError::UnexpectedBindingShape(e) => {
                write!(f, "Unexpected binding shape: {}", e)
            }
            GachaSyncError::Protocol(e) => write!(f, "Protocol violation: {}", e),
            GachaSyncError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            GachaSyncError::JsonError(e) => write!(f, "JSON error: {}", e),
            GachaSyncError::IO(e) => write!(f, "IO error: {}", e),
            GachaSyncError::Config(e) => write!(f, "Config error: {}", e),
            GachaSyncError::Timeout(e) => write!(f, "Timeout: {}", e),
            GachaSyncError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for GachaSyncError {}

impl From<rusqlite::Error> for GachaSyncError {
    fn from(error: rusqlite::Error) -> Self {
        GachaSyncError::SqliteError(error)
    }
}

impl From<serde_json::Error> for GachaSyncError {
    fn from(error: serde_json::Error) -> Self {
        GachaSyncError::JsonError(error.to_string())
    }
}

impl From<std::io::Error> for GachaSyncError {
    fn from(error: std::io::Error) -> Self {
        GachaSyncError::IO(error.to_string())
    }
}

impl From<reqwest::Error> for GachaSyncError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            GachaSyncError::Timeout(error.to_string())
        } else {
            GachaSyncError::Upstream(error.to_string())
        }
    }
}

impl From<ProtocolError> for GachaSyncError {
    fn from(error: ProtocolError) -> Self {
        GachaSyncError::Protocol(error.to_string())
    }
}

impl GachaSyncError {
    /// 判断是否是"凭证失效"这一预期内的结果
    pub fn is_credential_invalid(&self) -> bool {
        matches!(self, GachaSyncError::CredentialInvalid)
    }
}

pub type Result<T> = std::result::Result<T, GachaSyncError>;
