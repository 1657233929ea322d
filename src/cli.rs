use clap::Parser;

/// Managed multi-tenant web-crawling platform.
#[derive(Debug, Parser)]
#[command(name = "webcrawler", version, about)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config/default.toml")]
    pub config: String,
}
