//! Process entrypoint: parse CLI flags, open the log sink and credential pool, run the
//! reactor until SIGTERM.

use server_proxy::error::Result;
use server_proxy::process_config::{LogMode, ProcessConfig};
use server_proxy::server::Server;

fn main() -> Result<()> {
    let cfg = ProcessConfig::parse(std::env::args())?;

    let log_mode = if !cfg.logging_enabled {
        proxy_log::LogMode::Disabled
    } else {
        match cfg.log_mode {
            LogMode::Sync => proxy_log::LogMode::Sync,
            LogMode::Async => proxy_log::LogMode::Async,
        }
    };
    proxy_log::init(log_mode, "./log", "ServerLog", 800_000, 800);

    proxy_log::info!(
        "starting on port {} (workers={}, sessions={})",
        cfg.port, cfg.worker_count, cfg.session_pool_size
    );

    let mut server = Server::new(&cfg)?;
    server.run()?;
    server.shutdown();
    Ok(())
}
