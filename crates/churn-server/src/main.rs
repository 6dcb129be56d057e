use anyhow::Context;
use churn_core::{
    config::{load_json_or_default, ServeConfig},
    InferenceService,
};
use churn_server::{router, AppState};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "churn-server", about = "Telecom churn inference API")]
struct Args {
    /// JSON 配置文件，覆盖默认服务参数
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    bind: Option<String>,
    /// 启动时加载的模型 artifact
    #[arg(long)]
    model: Option<PathBuf>,
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut cfg: ServeConfig = load_json_or_default(args.config.as_deref())?;
    if let Some(b) = args.bind {
        cfg.bind = b;
    }
    if let Some(m) = args.model {
        cfg.model_path = m;
    }
    if args.static_dir.is_some() {
        cfg.static_dir = args.static_dir;
    }

    // metrics
    let prom = PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")?;

    let core = InferenceService::from_artifact(&cfg.model_path);
    let state = AppState {
        core: Arc::new(core),
        prom,
    };
    let app = router(state, &cfg);

    let listener = tokio::net::TcpListener::bind(&cfg.bind)
        .await
        .with_context(|| format!("bind {}", cfg.bind))?;
    tracing::info!("churn-server listening on http://{}", cfg.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;
    tracing::info!("churn-server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(err = %e, "ctrl-c handler failed");
    }
}
