//! frontporch upload client entry point.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use frontporch_transfer::{FileSource, Source, Throughput};
use frontporch_uploader::{Destination, UploadError, UploadObserver, UploadOutcome, Uploader};
use tracing_subscriber::EnvFilter;

use crate::config::FileConfig;

#[derive(Parser, Debug)]
#[command(name = "frontporch-upload")]
#[command(version, about = "Upload a file to a frontporch server over WebSocket", long_about = None)]
struct Cli {
    /// File to upload.
    file: PathBuf,

    /// Server host, optionally with port (e.g. `192.168.1.20:8080`).
    #[arg(long)]
    host: Option<String>,

    /// Destination directory on the server.
    #[arg(long = "dir")]
    directory: Option<String>,

    /// Name to store the file under (defaults to the file name).
    #[arg(long)]
    name: Option<String>,

    /// Send base64 text frames instead of binary frames.
    #[arg(long)]
    force_text: bool,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Prints progress and the server's replies to the terminal.
struct ConsoleObserver {
    size: u64,
    last_percent: u8,
    throughput: Throughput,
}

impl ConsoleObserver {
    fn new(size: u64) -> Self {
        Self {
            size,
            last_percent: 0,
            throughput: Throughput::new(None),
        }
    }
}

impl UploadObserver for ConsoleObserver {
    fn on_open(&mut self, _info: &str) {
        tracing::debug!("connection open");
        self.throughput.record(0);
    }

    fn on_message(&mut self, text: &str) {
        tracing::debug!(%text, "server message");
    }

    fn on_progress(&mut self, percent: u8) {
        let delta = u64::from(percent.saturating_sub(self.last_percent));
        self.last_percent = percent;
        self.throughput.record(self.size.saturating_mul(delta) / 100);

        let rate = self.throughput.bytes_per_second() / 1024.0;
        let remaining = self.size - self.size.saturating_mul(u64::from(percent)) / 100;
        match self.throughput.eta(remaining) {
            Some(eta) if percent < 100 => {
                println!("{percent:>3}%  {rate:.1} KiB/s  ~{}s left", eta.as_secs())
            }
            _ => println!("{percent:>3}%  {rate:.1} KiB/s"),
        }
    }

    fn on_finish(&mut self) {
        println!("upload finished");
    }

    fn on_error(&mut self, error: &UploadError) {
        eprintln!("upload failed: {error}");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let rt = tokio::runtime::Runtime::new()?;
    match rt.block_on(run(cli))? {
        UploadOutcome::Finished => Ok(()),
        UploadOutcome::Failed(err) => Err(err.into()),
        UploadOutcome::Aborted => bail!("upload aborted"),
    }
}

async fn run(cli: Cli) -> anyhow::Result<UploadOutcome> {
    let file_config = FileConfig::load(cli.config.as_deref())?;
    let Some(host) = cli.host.or(file_config.host.clone()) else {
        bail!("no server host given (use --host or set `host` in the config file)");
    };
    let directory = cli
        .directory
        .or(file_config.directory.clone())
        .unwrap_or_else(|| "/".into());
    let upload_config = file_config.upload_config(cli.force_text);

    let mut source = FileSource::open(&cli.file)
        .await
        .with_context(|| format!("opening {}", cli.file.display()))?;
    if let Some(name) = cli.name {
        source = source.with_name(name);
    }
    let destination = Destination::new(&directory, source.name());
    let size = source.size();
    tracing::info!(
        file = %cli.file.display(),
        target = %destination.path(),
        size,
        "uploading"
    );

    let uploader = Uploader::new(host, upload_config);
    let source: Arc<dyn Source> = Arc::new(source);
    let handle = uploader.start(source, destination, ConsoleObserver::new(size))?;

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, aborting upload");
            cancel.cancel();
        }
    });

    Ok(handle.wait().await)
}
