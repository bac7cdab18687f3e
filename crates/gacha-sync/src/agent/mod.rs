//! agent 接入 - 会话状态机与在线注册表
//!
//! agent 是运行在用户侧的采集端：服务端把同步任务派给它，
//! 它用本地持有的凭证拉取历史并回报。会话见 [`session`]，
//! 随机派发与临场校验见 [`registry`]。

pub mod registry;
pub mod session;

pub use registry::AgentRegistry;
pub use session::{AgentSession, AgentTransport, SessionState};

use gacha_protocol::Uid;

/// 一次临场凭证校验的结论
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// 凭证有效，agent 带回了归属账号
    Valid { uid: Uid },
    /// 凭证被拒绝
    Invalid { msg: String },
    /// 凭证已过期
    Expired,
}

/// 凭证提交的处理结果（面向提交者的回执）
#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// 校验通过，已入库
    Accepted,
    /// 暂时无法校验，已登记等待 agent 处理
    AcceptedPending,
    /// 凭证无效
    Invalid,
    /// 凭证已过期
    Expired,
    /// 内部故障
    Unknown,
}

impl RegisterOutcome {
    /// 给提交者看的文案
    pub fn message(&self) -> &'static str {
        match self {
            RegisterOutcome::Accepted => "提交成功",
            RegisterOutcome::AcceptedPending => "提交成功, 请等待记录员处理",
            RegisterOutcome::Invalid => "token 无效",
            RegisterOutcome::Expired => "token 已过期",
            RegisterOutcome::Unknown => "未知错误, 请稍后再试",
        }
    }
}
