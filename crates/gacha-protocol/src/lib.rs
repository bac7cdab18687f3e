//! Gacha 同步协议 - 服务器与抓取 agent 之间的共享类型与消息定义
//!
//! 协议形态：持久、有序、可靠的双工字节流，一帧一条消息，
//! 帧内容为带 `type` 标签的 JSON 文档。

pub mod message;
pub mod types;

pub use message::{decode_message, encode_message, AgentMessage, ProtocolError};
pub use types::{AccountInfo, CredentialToken, GachaEntry, Uid};
