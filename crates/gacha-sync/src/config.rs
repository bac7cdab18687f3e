//! 服务配置
//!
//! 所有节奏参数（任务下发间隔、翻页间隔、账号间隔）都集中在这里，
//! 默认值对齐线上部署的保守取值，测试时用 builder 调小。

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{GachaSyncError, Result};

/// gacha-sync 服务配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// agent 接入的 TCP 监听地址
    pub listen_addr: String,
    /// sqlite 数据库路径
    pub db_path: PathBuf,
    /// agent 接入共享密钥
    pub agent_key: String,
    /// 是否在启动时开启全量轮询主循环（无 agent 时的兜底）
    pub open_loop: bool,
    /// 同一 agent 相邻两次任务下发之间的间隔（秒）
    pub dispatch_delay_secs: u64,
    /// 主循环相邻两个账号之间的间隔（秒）
    pub account_delay_secs: u64,
    /// 单个卡池分页抓取的翻页间隔（秒），用于尊重上游限流
    pub page_delay_secs: u64,
    /// 单页抓取条数
    pub page_size: u32,
    /// 临时凭证校验的等待超时（秒）
    pub validation_timeout_secs: u64,
    /// 未认证连接的握手超时（秒）
    ///
    /// None 表示与基线协议一致：未认证连接可以无限等待。
    pub handshake_timeout_secs: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9300".to_string(),
            db_path: PathBuf::from("gacha.db"),
            agent_key: String::new(),
            open_loop: false,
            dispatch_delay_secs: 120,
            account_delay_secs: 120,
            page_delay_secs: 5,
            page_size: 10,
            validation_timeout_secs: 10,
            handshake_timeout_secs: None,
        }
    }
}

impl ServerConfig {
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// 从环境变量加载配置（线上部署入口）
    ///
    /// AGENT_KEY 必须提供；其余变量缺省时使用默认值。
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.agent_key = env::var("AGENT_KEY")
            .map_err(|_| GachaSyncError::Config("AGENT_KEY is not set".to_string()))?;
        if let Ok(addr) = env::var("LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(flag) = env::var("OPEN_LOOP") {
            config.open_loop = flag.parse().unwrap_or(false);
        }
        Ok(config)
    }

    pub fn dispatch_delay(&self) -> Duration {
        Duration::from_secs(self.dispatch_delay_secs)
    }

    pub fn account_delay(&self) -> Duration {
        Duration::from_secs(self.account_delay_secs)
    }

    pub fn page_delay(&self) -> Duration {
        Duration::from_secs(self.page_delay_secs)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_secs(self.validation_timeout_secs)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout_secs.map(Duration::from_secs)
    }
}

pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    pub fn listen_addr<S: Into<String>>(mut self, addr: S) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    pub fn db_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.db_path = path.as_ref().to_path_buf();
        self
    }

    pub fn agent_key<S: Into<String>>(mut self, key: S) -> Self {
        self.config.agent_key = key.into();
        self
    }

    pub fn open_loop(mut self, open: bool) -> Self {
        self.config.open_loop = open;
        self
    }

    pub fn dispatch_delay_secs(mut self, secs: u64) -> Self {
        self.config.dispatch_delay_secs = secs;
        self
    }

    pub fn account_delay_secs(mut self, secs: u64) -> Self {
        self.config.account_delay_secs = secs;
        self
    }

    pub fn page_delay_secs(mut self, secs: u64) -> Self {
        self.config.page_delay_secs = secs;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.config.page_size = size;
        self
    }

    pub fn validation_timeout_secs(mut self, secs: u64) -> Self {
        self.config.validation_timeout_secs = secs;
        self
    }

    /// 开启握手超时是对基线协议的偏离，默认关闭
    pub fn handshake_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.handshake_timeout_secs = secs;
        self
    }

    pub fn build(self) -> ServerConfig {
        self.config
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
