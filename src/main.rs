use anyhow::Result;
use clap::Parser;
use pg_lock_graph::config::{log_filter, Cli};
use pg_lock_graph::inspector::LockInspector;
use pg_lock_graph::render::{default_output_path, Graphviz};
use pg_lock_graph::snapshot;
use sqlx::Connection;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::info;

fn init_tracing(verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut conn = snapshot::connect(&cli.connect_options()).await?;
    let snapshot = snapshot::fetch_snapshot(&mut conn).await?;
    conn.close().await?;

    let graph = LockInspector::from_cli(&cli).inspect(snapshot)?;
    let bytes = Graphviz::default().render(&graph, &cli.format).await?;

    match cli.output.as_deref() {
        Some(path) if path == Path::new("-") => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&bytes).await?;
            stdout.flush().await?;
        }
        output => {
            let path = output
                .map(Path::to_path_buf)
                .unwrap_or_else(|| default_output_path(&graph, &cli.format));
            tokio::fs::write(&path, &bytes).await?;
            info!(path = %path.display(), "Wrote lock graph");
            println!("{}", path.display());
        }
    }
    Ok(())
}
