//! SupplySight command line entry point.
//!
//! Loads an order CSV, wires up the analytical engines, and answers
//! questions either one-shot (`--question`) or through a stdin REPL.

use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use supplysight::agent::SupplyChainAgent;
use supplysight::dataset::ingest;
use supplysight::{logging, AppConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "supplysight", about = "Supply chain intelligence agent", version)]
struct Cli {
    /// Path to the order history CSV.
    #[arg(long)]
    data: PathBuf,

    /// Ask a single question and exit; omit for an interactive session.
    #[arg(long)]
    question: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load();
    logging::init(&config.log_level);

    let dataset = Arc::new(ingest::load_csv(&cli.data)?);
    info!(
        orders = dataset.len(),
        categories = dataset.categories().len(),
        "dataset loaded"
    );

    let mut agent = SupplyChainAgent::new(&config, Arc::clone(&dataset));
    if agent.is_llm_backed() {
        info!(model = %config.model, "agent is LLM-backed");
    }

    if let Some(question) = cli.question {
        println!("{}", agent.chat(&question).await);
        return Ok(());
    }

    repl(&mut agent).await
}

async fn repl(agent: &mut SupplyChainAgent) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    println!("Ask about your supply chain (\"quit\" to exit, \"reset\" to clear history).");

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        match question {
            "" => continue,
            "quit" | "exit" => break,
            "reset" => {
                agent.reset_conversation();
                println!("Conversation cleared.");
            }
            _ => println!("\n{}\n", agent.chat(question).await),
        }
    }
    Ok(())
}
