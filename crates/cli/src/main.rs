use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use broker_stream::{FileStorage, InMemoryStorage, StreamManager, StreamStorage};
use clap::Parser;
use processor::{
    llm_loop::{FakeLanguageModel, LlmLoopProcessor},
    Processor, ProcessorService,
};
use tokio::sync::oneshot;

#[derive(Parser, Debug)]
#[command(author, version, about = "Durable event-stream broker with reactive, per-path consumers", long_about = None)]
struct Opts {
    /// Address to bind the HTTP/SSE server to.
    #[arg(long, env = "EVENTBROKER_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind the HTTP/SSE server to.
    #[arg(long, env = "EVENTBROKER_PORT", default_value_t = 3000)]
    port: u16,

    /// Directory for the durable NDJSON event log. Ignored when `--in-memory` is set.
    #[arg(long, env = "EVENTBROKER_DATA_DIR", default_value = ".data/streams")]
    data_dir: PathBuf,

    /// Use an in-memory, non-durable store instead of the file backend.
    #[arg(long, env = "EVENTBROKER_IN_MEMORY", default_value_t = false)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_ansi(false)
        .init();

    let opts = Opts::parse();

    let storage: Arc<dyn StreamStorage> = if opts.in_memory {
        tracing::info!("using in-memory storage (data-dir ignored)");
        Arc::new(InMemoryStorage::new())
    } else {
        tracing::info!(data_dir = %opts.data_dir.display(), "using file storage");
        Arc::new(
            FileStorage::new(opts.data_dir.clone())
                .await
                .context("failed to open file storage")?,
        )
    };

    let manager = StreamManager::new(storage);

    let processors = Arc::new(ProcessorService::new());
    let llm_loop: Arc<dyn Processor> = Arc::new(LlmLoopProcessor::new(Arc::new(FakeLanguageModel {
        deltas: Vec::new(),
        delay: Duration::from_millis(0),
    })));

    let (started_tx, started_rx) = oneshot::channel();
    let dispatch = processors
        .start(manager.clone(), llm_loop, started_tx)
        .await
        .context("failed to start processor dispatch loop")?;
    started_rx.await.context("processor dispatch loop exited before starting")?;

    let state = broker_server::AppState { manager };
    let router = broker_server::create_router(state);

    let addr = format!("{}:{}", opts.host, opts.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(%addr, "eventbroker listening");
    axum::serve(listener, router)
        .await
        .context("server exited with an error")?;

    dispatch.abort();
    Ok(())
}
