//! Offline dump inspector
//!
//! Loads a VaultKV dump file into a scratch table and prints record
//! counts, byte statistics, and the chain-length histogram.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vaultkv::{Table, TableConfig};

#[derive(Parser)]
#[command(name = "vaultkv-inspect", version, about = "Inspect a VaultKV dump file")]
struct Args {
    /// Dump file to inspect
    file: PathBuf,

    /// Bucket capacity of the scratch table the dump is loaded into
    #[arg(long, default_value_t = vaultkv::DEFAULT_CAPACITY)]
    capacity: usize,

    /// Number of chain-length histogram rows
    #[arg(long, default_value_t = 16)]
    histogram: usize,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    vaultkv::init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> vaultkv::Result<()> {
    let table = Table::new(TableConfig {
        capacity: args.capacity,
        ..TableConfig::default()
    })?;
    let records = table.read_from_file(&args.file)?;

    let mut logical = 0u64;
    let mut stored = 0u64;
    let mut compressed_entries = 0u64;
    for entry in table.iter() {
        let key = entry.key();
        let len = match table.length(key)? {
            Some(len) => len as u64,
            None => continue,
        };
        logical += len;
        match table.compressed_length(key)? {
            Some(0) | None => stored += len,
            Some(clen) => {
                compressed_entries += 1;
                stored += clen as u64;
            }
        }
    }

    println!("file:               {}", args.file.display());
    println!("records:            {}", records);
    println!("logical bytes:      {}", logical);
    println!("stored bytes:       {}", stored);
    println!("compressed entries: {}", compressed_entries);

    let mut buf = vec![0usize; args.histogram];
    let longest = table.histogram(&mut buf)?;
    println!("longest chain:      {}", longest);
    for (len, n) in buf.iter().enumerate() {
        if *n > 0 {
            println!("  chains of length {:>3}: {}", len, n);
        }
    }
    Ok(())
}
