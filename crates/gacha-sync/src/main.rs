use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use gacha_sync::source::HypergryphSource;
use gacha_sync::{
    AgentRegistry, Result, Scheduler, ServerConfig, ServerContext, SqliteRecordStore, SyncEngine,
    SyncOptions, TaskQueue,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env()?;
    let store = Arc::new(SqliteRecordStore::open(&config.db_path)?);
    let source = Arc::new(HypergryphSource::new()?);
    let engine = Arc::new(SyncEngine::new(
        store.clone(),
        source,
        SyncOptions {
            page_size: config.page_size,
            page_delay: config.page_delay(),
        },
    ));
    let queue = Arc::new(TaskQueue::new(store.clone()));
    let registry = Arc::new(AgentRegistry::new());

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("收到退出信号");
                shutdown.cancel();
            }
        });
    }

    if config.open_loop {
        info!("主循环已开启, 服务端将自行轮转账号");
        let scheduler = Scheduler::new(
            Arc::clone(&queue),
            Arc::clone(&engine),
            config.account_delay(),
        );
        let shutdown = shutdown.clone();
        tokio::spawn(async move { scheduler.run(shutdown).await });
    }

    let ctx = ServerContext::new(config, store, engine, queue, registry);
    gacha_sync::server::run(ctx, shutdown).await
}
