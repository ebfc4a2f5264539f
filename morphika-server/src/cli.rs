use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "morphika",
    about = "Morphika Server - model studio API with quota accounting",
    version = env!("CARGO_PKG_VERSION"),
    author,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, env = "MORPHIKA_PORT", help = "Override the configured port")]
    pub port: Option<u16>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the API server (default if no command specified)")]
    Serve {
        #[arg(short, long, env = "MORPHIKA_PORT")]
        port: Option<u16>,
    },

    #[command(about = "List plan tiers and their limits")]
    Plans {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(subcommand, about = "View configuration")]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    #[command(about = "Show current configuration")]
    Show {
        #[arg(short, long, help = "Output as JSON")]
        json: bool,
    },

    #[command(about = "Print the data directory path")]
    Path,

    #[command(about = "Write the current configuration (with defaults filled in) to disk")]
    Init,
}
