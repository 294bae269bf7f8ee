use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use brc::config::{DEFAULT_BUFFER_SIZE, DEFAULT_SEGMENTS_PER_WORKER};
use brc::{AccessMode, Config, MalformedPolicy};
use clap::{Parser, ValueEnum};
use tikv_jemallocator::Jemalloc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(about = "Per-station min/mean/max of a `name;value` measurements file")]
struct Args {
    /// Measurements file
    #[arg(default_value = "measurements.txt")]
    input: PathBuf,
    /// Write the summary here instead of stdout
    output: Option<PathBuf>,
    /// Worker threads, defaults to the available parallelism
    #[arg(long, env = "BRC_WORKERS")]
    workers: Option<usize>,
    #[arg(long, env = "BRC_SEGMENTS_PER_WORKER", default_value_t = DEFAULT_SEGMENTS_PER_WORKER)]
    segments_per_worker: usize,
    #[arg(long, value_enum, env = "BRC_ACCESS", default_value_t = Access::Mmap)]
    access: Access,
    /// Read buffer size in bytes for `--access buffered`
    #[arg(long, env = "BRC_BUFFER_SIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,
    /// Give up if the workers have not finished after this many seconds
    #[arg(long, env = "BRC_JOIN_TIMEOUT_SECS", default_value_t = 300)]
    join_timeout_secs: u64,
    /// Skip and count malformed lines instead of failing
    #[arg(long)]
    skip_malformed: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Access {
    Mmap,
    Buffered,
}

impl Args {
    fn config(&self) -> Config {
        let mut config = Config::new(&self.input);
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.segments_per_worker = self.segments_per_worker;
        config.access = match self.access {
            Access::Mmap => AccessMode::Mmap,
            Access::Buffered => AccessMode::Buffered,
        };
        config.buffer_size = self.buffer_size;
        config.join_timeout = Duration::from_secs(self.join_timeout_secs);
        if self.skip_malformed {
            config.malformed = MalformedPolicy::Skip;
        }
        config
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();
    let config = args.config();
    let (summary, _stats) =
        brc::run(&config).with_context(|| format!("processing {}", config.path.display()))?;

    match &args.output {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("creating {}", path.display()))?;
            let mut dest = BufWriter::new(file);
            writeln!(dest, "{summary}")?;
            dest.flush()?;
        }
        None => {
            let mut out = io::stdout().lock();
            writeln!(out, "{summary}")?;
            out.flush()?;
        }
    }
    Ok(())
}
