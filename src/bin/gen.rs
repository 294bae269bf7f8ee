use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use brc::format::Decimal;
use brc::parse::MAX_TENTHS;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use tikv_jemallocator::Jemalloc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Station names with their mean temperature.
const STATIONS: &[(&str, f64)] = &[
    ("Abha", 18.0),
    ("Abidjan", 26.0),
    ("Accra", 26.4),
    ("Addis Ababa", 16.0),
    ("Adelaide", 17.3),
    ("Alexandria", 20.0),
    ("Amsterdam", 10.2),
    ("Anchorage", 2.8),
    ("Athens", 19.2),
    ("Baghdad", 22.8),
    ("Bangkok", 28.6),
    ("Berlin", 10.3),
    ("Bogotá", 13.2),
    ("Cairo", 21.4),
    ("Chihuahua", 18.6),
    ("Dakar", 24.0),
    ("Dikson", -11.1),
    ("Dodoma", 22.7),
    ("Hamburg", 9.7),
    ("Helsinki", 5.9),
    ("Istanbul", 13.9),
    ("Jakarta", 26.7),
    ("Kuala Lumpur", 27.3),
    ("Lhasa", 7.6),
    ("Lisbon", 17.5),
    ("Marrakesh", 19.6),
    ("Mexico City", 17.5),
    ("Montreal", 6.8),
    ("Nuuk", -1.4),
    ("Ouagadougou", 28.3),
    ("Oslo", 5.7),
    ("Petropavlovsk-Kamchatsky", 1.9),
    ("Reykjavík", 4.3),
    ("São Paulo", 19.7),
    ("Singapore", 27.0),
    ("St. John's", 5.0),
    ("Tokyo", 15.4),
    ("Ürümqi", 7.4),
    ("Yakutsk", -8.8),
    ("Zürich", 9.3),
];

#[derive(Parser, Debug)]
#[command(about = "Writes a synthetic `name;value` measurements file")]
struct Args {
    /// Number of lines to write
    rows: u64,
    #[arg(long, default_value = "measurements.txt")]
    output: PathBuf,
    /// Seed for a reproducible file
    #[arg(long)]
    seed: Option<u64>,
    /// Standard deviation around each station's mean
    #[arg(long, default_value_t = 10.0)]
    std_dev: f64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let distributions = STATIONS
        .iter()
        .map(|&(name, mean)| {
            Normal::new(mean, args.std_dev)
                .map(|normal| (name, normal))
                .context("invalid standard deviation")
        })
        .collect::<Result<Vec<_>>>()?;

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;
    let mut dest = BufWriter::with_capacity(1 << 20, file);
    for _ in 0..args.rows {
        let (name, normal) = &distributions[rng.gen_range(0..distributions.len())];
        let tenths = (normal.sample(&mut rng) * 10.0).round() as i64;
        let tenths = tenths.clamp(-(MAX_TENTHS as i64), MAX_TENTHS as i64);
        writeln!(dest, "{name};{}", Decimal(tenths))?;
    }
    dest.flush()?;
    info!(rows = args.rows, output = %args.output.display(), "measurements written");
    Ok(())
}
