mod arg_parser;
mod deck_cli;
mod logging;
mod shutdown;

use arg_parser::ArgParser;
use deck_cli::DeckCli;

use anyhow::Context;
use clap::Parser;
use tracing::warn;
use vmdeck::{config, Deck};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ArgParser::parse();
    logging::init_logging(args.log_level)?;

    let config = config::load(args.config.as_deref()).context("loading configuration")?;
    let deck = Deck::new(&config);

    let result = DeckCli::new(deck.clone()).run(args.sub_command).await;

    // reap anything still running before the runtime goes away
    if let Err(e) = deck.shutdown().await {
        warn!(error = %e, "supervisor shutdown failed");
    }

    if let Err(e) = &result {
        if let Some(diagnostics) = e.diagnostics() {
            eprintln!("{}", diagnostics);
        }
    }
    Ok(result?)
}
