//! Translate text or an office document from the command line
//!
//! Usage:
//!   cargo run --bin translate -- "There is a UXO here."
//!   echo "ມີ ລບຕ ຢູ່ບ່ອນນີ້." | cargo run --bin translate -- --direction lo-en
//!   cargo run --bin translate -- --file report.docx --out report_lo.docx
//!
//! Required environment variables:
//! - OPENAI_API_KEY
//!
//! Optional:
//! - OPENAI_MODEL, OPENAI_API_URL, DATABASE_PATH (see the server binary)

use anyhow::{bail, Context, Result};
use mine_action_translator::config::Config;
use mine_action_translator::direction::Direction;
use mine_action_translator::document::{translate_document, DocumentKind};
use mine_action_translator::glossary::{GlossaryStore, DEFAULT_TERMS};
use mine_action_translator::llm::OpenAiClient;
use mine_action_translator::translator::Translator;
use std::io::Read;
use std::path::Path;
use tracing::info;

#[derive(Debug, Default)]
struct Args {
    direction: Direction,
    file: Option<String>,
    out: Option<String>,
    text: Vec<String>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--direction" | "-d" => {
                let value = args.next().context("--direction needs a value")?;
                parsed.direction = value.parse()?;
            }
            "--file" | "-f" => parsed.file = Some(args.next().context("--file needs a path")?),
            "--out" | "-o" => parsed.out = Some(args.next().context("--out needs a path")?),
            flag if flag.starts_with("--") => bail!("Unknown option: {}", flag),
            _ => parsed.text.push(arg),
        }
    }
    Ok(parsed)
}

/// `report.docx` → `report_lo.docx` for an English → Lao run
fn default_output_path(input: &str, direction: Direction, kind: DocumentKind) -> String {
    let path = Path::new(input);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("translated");
    let name = format!(
        "{}_{}.{}",
        stem,
        direction.target_language().code(),
        kind.extension()
    );
    path.with_file_name(name).to_string_lossy().into_owned()
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mine_action_translator=warn".parse()?),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::from_env()?;

    let store = GlossaryStore::open(&config.database_path)?;
    store.seed(DEFAULT_TERMS)?;
    let translator = Translator::new(store, OpenAiClient::new(&config)?);

    if let Some(input) = &args.file {
        let kind = DocumentKind::from_path(input)?;
        let bytes = std::fs::read(input).context(format!("Failed to read {}", input))?;
        let output = args
            .out
            .clone()
            .unwrap_or_else(|| default_output_path(input, args.direction, kind));

        let translated = translate_document(&translator, &bytes, kind, args.direction).await?;
        std::fs::write(&output, &translated.bytes)
            .context(format!("Failed to write {}", output))?;

        info!("Wrote {}", output);
        eprintln!(
            "✓ {} → {} ({} runs translated, {} failed)",
            input, output, translated.report.translated, translated.report.failed
        );
        return Ok(());
    }

    let text = if args.text.is_empty() {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read text from stdin")?;
        buf
    } else {
        args.text.join(" ")
    };

    let translation = translator.translate_for_display(&text, args.direction).await?;
    println!("{}", translation);
    Ok(())
}
