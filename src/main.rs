use anyhow::{Context, Result};
use etfitalia::config::Config;
use etfitalia::logging::{log, obj, tick_aggregator, v_num, v_str, Domain, Level};
use etfitalia::server::{self, AppState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::Duration;

fn shutdown_signal(mut rx: watch::Receiver<bool>) -> impl std::future::Future<Output = ()> + Send + 'static {
    async move {
        let _ = rx.wait_for(|stop| *stop).await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    let state = Arc::new(AppState::from_config(cfg.clone())?);
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("etfs", v_num(state.catalog.len() as f64)),
            ("articles", v_num(state.lock_articles().len() as f64)),
            ("live_market", v_str(if cfg.use_live_market { "on" } else { "off" })),
            ("admin_api", v_str(if cfg.admin_hmac_key.is_some() { "on" } else { "off" })),
        ]),
    );

    // Shown once; the logger redacts passwords.
    if let Some(password) = state.seed_console()? {
        eprintln!("credenziali admin generate: admin / {}", password);
    }

    let listener = TcpListener::bind(&cfg.bind_addr).await.with_context(|| format!("bind {}", cfg.bind_addr))?;
    let (stop_tx, stop_rx) = watch::channel(false);

    let refresh = tokio::spawn(server::run_market_refresh(
        state.clone(),
        Duration::from_secs(cfg.market_refresh_secs.max(1)),
        shutdown_signal(stop_rx.clone()),
    ));
    let backups = tokio::spawn(server::run_auto_backups(
        state.clone(),
        Duration::from_secs(cfg.auto_backup_secs.max(1) as u64),
        shutdown_signal(stop_rx.clone()),
    ));
    let mut metrics_rx = stop_rx.clone();
    let metrics = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                _ = metrics_rx.wait_for(|stop| *stop) => break,
                _ = interval.tick() => tick_aggregator(),
            }
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log(Level::Info, Domain::System, "shutdown_requested", obj(&[]));
        }
        let _ = stop_tx.send(true);
    });

    server::serve(listener, state, shutdown_signal(stop_rx)).await?;
    let _ = tokio::join!(refresh, backups, metrics);
    log(Level::Info, Domain::System, "shutdown_complete", obj(&[]));
    Ok(())
}
