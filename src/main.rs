use akamai_mcp::config::{Overrides, Settings};
use akamai_mcp::services::logger::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// MCP server exposing Akamai APIs as tools over stdio.
#[derive(Debug, Parser)]
#[command(name = "akamai-mcp", version, about)]
struct Args {
    /// Path to the .edgerc credentials file; defaults to AKAMAI_EDGERC or ~/.edgerc.
    #[arg(long)]
    edgerc: Option<PathBuf>,

    /// Section of the .edgerc file to use.
    #[arg(long)]
    section: Option<String>,

    /// error, warn, info or debug.
    #[arg(long, value_parser = parse_level)]
    log_level: Option<LogLevel>,
}

fn parse_level(raw: &str) -> Result<LogLevel, String> {
    LogLevel::parse(raw).ok_or_else(|| format!("unknown log level '{}'", raw))
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let settings = Settings::load(&Overrides {
        edgerc: args.edgerc,
        section: args.section,
        log_level: args.log_level,
    });
    if let Err(err) = akamai_mcp::mcp::server::run_stdio(settings).await {
        eprintln!("akamai-mcp: {}", err);
        std::process::exit(1);
    }
}
