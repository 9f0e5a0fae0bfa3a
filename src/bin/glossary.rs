//! Inspect or extend the glossary without starting the server
//!
//! Usage:
//!   cargo run --bin glossary -- list
//!   cargo run --bin glossary -- count
//!   cargo run --bin glossary -- teach "Battle Area Clearance" "ການກວດກູ້ພື້ນທີ່"
//!
//! Optional environment variables:
//! - DATABASE_PATH (defaults to mine_action_memory.db)

use anyhow::{bail, Result};
use mine_action_translator::config::DEFAULT_DATABASE_PATH;
use mine_action_translator::glossary::{GlossaryStore, DEFAULT_TERMS};

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mine_action_translator=warn".parse()?),
        )
        .init();

    let database_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());
    let store = GlossaryStore::open(&database_path)?;
    store.seed(DEFAULT_TERMS)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        [] | ["list"] => {
            for entry in store.list_all()? {
                println!("{}\t{}", entry.english, entry.lao);
            }
        }
        ["count"] => println!("{}", store.count()?),
        ["teach", english, lao] => {
            if english.trim().is_empty() || lao.trim().is_empty() {
                bail!("Both the English term and the Lao translation are required");
            }
            if store.insert(english, lao)? {
                println!("✓ Learned '{}' → '{}'", english.trim(), lao.trim());
            } else {
                println!("Already known: '{}' → '{}'", english.trim(), lao.trim());
            }
            println!("Active glossary: {} terms", store.count()?);
        }
        _ => bail!("Usage: glossary [list | count | teach <english> <lao>]"),
    }

    Ok(())
}
