//! gacha-sync 服务端
//!
//! 把分散在各 agent 手里的抽卡凭证组织成一个持续运转的同步系统：
//! - [`server`] 接入 agent，按会话派发抓取任务并回收结果；
//! - [`sync`] 是服务端自己的完整同步引擎（凭证交换 + 分页抓取 + 查重入库）;
//! - [`queue`] 与 [`scheduler`] 负责账号轮转的节奏；
//! - [`store`] 持久化账号与抽卡记录。

pub mod agent;
pub mod config;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod store;
pub mod sync;

pub use agent::{AgentRegistry, RegisterOutcome, ValidationOutcome};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{GachaSyncError, Result};
pub use queue::{SyncTask, TaskQueue};
pub use scheduler::Scheduler;
pub use server::ServerContext;
pub use store::{RecordStore, SqliteRecordStore};
pub use sync::{SyncEngine, SyncOptions};

pub use gacha_protocol::{AccountInfo, AgentMessage, CredentialToken, GachaEntry, Uid};
