//! agent 接入服务 - TCP 上按行分帧的 JSON 消息
//!
//! 每个连接一个会话：读循环解帧并交给会话状态机，写出口放在
//! Mutex<FramedWrite> 后面供会话和延迟派发共用。解不开的帧
//! 直接关闭连接，协议不相容的对端没有资格继续占着会话。

use futures::{SinkExt, StreamExt};
use gacha_protocol::{decode_message, encode_message, AgentMessage, CredentialToken};
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::session::AgentTransport;
use crate::agent::{AgentRegistry, AgentSession, RegisterOutcome, ValidationOutcome};
use crate::config::ServerConfig;
use crate::error::{GachaSyncError, Result};
use crate::queue::TaskQueue;
use crate::store::RecordStore;
use crate::sync::SyncEngine;

/// 服务端共享依赖
pub struct ServerContext {
    pub config: ServerConfig,
    pub store: Arc<dyn RecordStore>,
    pub engine: Arc<SyncEngine>,
    pub queue: Arc<TaskQueue>,
    pub registry: Arc<AgentRegistry>,
}

impl ServerContext {
    pub fn new(
        config: ServerConfig,
        store: Arc<dyn RecordStore>,
        engine: Arc<SyncEngine>,
        queue: Arc<TaskQueue>,
        registry: Arc<AgentRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            engine,
            queue,
            registry,
        })
    }

    /// 处理一次凭证提交
    ///
    /// 挑一个随机的已认证 agent 做临场校验；没有 agent 在线时
    /// 凭证留给之后上线的 agent 处理。
    pub async fn register_token(&self, token: &CredentialToken) -> RegisterOutcome {
        if self.registry.random_session().is_none() {
            info!("没有在线的 agent, 凭证留待处理");
            return RegisterOutcome::AcceptedPending;
        }
        match self
            .registry
            .validate_token(token, self.config.validation_timeout())
            .await
        {
            Ok(ValidationOutcome::Valid { uid }) => {
                info!(uid = %uid, "凭证校验通过");
                RegisterOutcome::Accepted
            }
            Ok(ValidationOutcome::Invalid { msg }) => {
                info!(msg = %msg, "凭证被 agent 拒绝");
                RegisterOutcome::Invalid
            }
            Ok(ValidationOutcome::Expired) => RegisterOutcome::Expired,
            Err(e) => {
                warn!(error = %e, "临场校验没有结论");
                RegisterOutcome::Unknown
            }
        }
    }
}

/// 写半边：会话与延迟派发任务共用，一次只写一帧
struct TcpTransport {
    writer: tokio::sync::Mutex<FramedWrite<OwnedWriteHalf, LinesCodec>>,
}

#[async_trait::async_trait]
impl AgentTransport for TcpTransport {
    async fn send(&self, msg: &AgentMessage) -> Result<()> {
        let line = encode_message(msg)?;
        let mut writer = self.writer.lock().await;
        writer
            .send(line)
            .await
            .map_err(|e| GachaSyncError::IO(e.to_string()))
    }
}

/// 在配置的地址上监听并接入 agent，直到 shutdown 触发
pub async fn run(ctx: Arc<ServerContext>, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(&ctx.config.listen_addr).await?;
    run_with_listener(ctx, listener, shutdown).await
}

pub async fn run_with_listener(
    ctx: Arc<ServerContext>,
    listener: TcpListener,
    shutdown: CancellationToken,
) -> Result<()> {
    info!(addr = %listener.local_addr()?, "agent 接入服务已启动");
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = shutdown.cancelled() => {
                info!("接入服务停止");
                return Ok(());
            }
        };
        let (stream, peer) = accepted?;
        debug!(peer = %peer, "新连接");
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(ctx, stream).await {
                warn!(peer = %peer, error = %e, "连接处理出错");
            }
        });
    }
}

async fn handle_connection(ctx: Arc<ServerContext>, stream: TcpStream) -> Result<()> {
    let (read_half, write_half) = stream.into_split();
    let transport = Arc::new(TcpTransport {
        writer: tokio::sync::Mutex::new(FramedWrite::new(write_half, LinesCodec::new())),
    });
    let session = AgentSession::new(
        transport,
        ctx.config.agent_key.clone(),
        ctx.config.dispatch_delay(),
        Arc::clone(&ctx.queue),
        Arc::clone(&ctx.engine),
        Arc::clone(&ctx.store),
    );
    ctx.registry.insert(Arc::clone(&session));

    let result = drive_session(&ctx, &session, read_half).await;
    ctx.registry.remove(session.id());
    result
}

async fn drive_session(
    ctx: &ServerContext,
    session: &Arc<AgentSession>,
    read_half: tokio::net::tcp::OwnedReadHalf,
) -> Result<()> {
    let mut frames = FramedRead::new(read_half, LinesCodec::new());
    loop {
        // 握手超时只约束认证前的连接
        let next = if !session.is_authenticated() {
            match ctx.config.handshake_timeout() {
                Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        debug!(session = %session.id(), "握手超时, 关闭连接");
                        return Ok(());
                    }
                },
                None => frames.next().await,
            }
        } else {
            frames.next().await
        };
        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(GachaSyncError::IO(e.to_string())),
            None => return Ok(()),
        };
        let msg = match decode_message(&line) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(session = %session.id(), error = %e, "无法解析的帧, 关闭连接");
                return Ok(());
            }
        };
        session.handle_message(msg).await?;
    }
}
