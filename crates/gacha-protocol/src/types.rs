//! 线上共享类型 - 账号标识、凭证与原始抽卡记录
//!
//! 字段命名保持与上游 JSON 一致（camelCase），保证消息可无损转发。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 游戏账号 uid（上游分配的不透明字符串，主键）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid(pub String);

impl Uid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 通行证凭证 token（不透明密串，唯一标识一个游戏账号）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialToken {
    pub content: String,
}

impl CredentialToken {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// 账号档案信息（昵称与渠道字段）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub channel_master_id: i32,
    pub channel_name: String,
    pub is_default: bool,
    pub is_deleted: bool,
    pub is_official: bool,
    pub nick_name: String,
    pub uid: Uid,
}

/// 一条原始抽卡记录（agent 上报 / 上游返回的形态，不含 uid）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GachaEntry {
    pub char_id: String,
    pub char_name: String,
    /// 抽卡时间戳（毫秒）
    pub gacha_ts: u64,
    pub is_new: bool,
    pub pool_id: String,
    pub pool_name: String,
    /// 十连中的位置，单抽为 0，十连为 0-9
    pub pos: u32,
    /// 稀有度 0-5
    pub rarity: u8,
}
