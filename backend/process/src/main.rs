use std::path::PathBuf;

use clap::Parser;
use ledger::{Mirror, RetryPolicy, Store};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding the seed CSV files and the mirror output
    #[arg(long, default_value_os_t = process::default_data_dir())]
    data_dir: PathBuf,

    /// SQLite database file
    #[arg(long, default_value = "complaints.db")]
    database: PathBuf,

    /// Only insert the built-in reference data
    #[arg(long)]
    defaults: bool,

    /// Regenerate the CSV mirror from the database afterwards
    #[arg(long)]
    rebuild_mirror: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let store = Store::open(&args.database, 2, RetryPolicy::default())?;

    if args.defaults {
        let applied = process::seed_defaults(&store).await?;
        info!("Built-in reference data applied: {applied}");
    } else {
        process::seed(&store, &args.data_dir).await?;
    }

    if args.rebuild_mirror {
        let mirror = Mirror::new(&args.data_dir)?;
        mirror.rebuild(&store).await?;
    }

    Ok(())
}
