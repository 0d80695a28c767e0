mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "configserver")]
#[command(version)]
#[command(about = "Serve configuration files from git with inline encrypted secrets", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "configserver.toml")]
        config: PathBuf,
    },

    /// Generate key material into a directory
    Keygen {
        /// Directory receiving the key files
        #[arg(short, long)]
        path: PathBuf,

        /// Also generate an RSA keypair
        #[arg(long)]
        rsa: bool,
    },

    /// Mint a client secret
    Register {
        /// Client identifier
        client_id: String,

        /// Directory holding the key files
        #[arg(short, long)]
        keys: PathBuf,
    },

    /// Encrypt a value into a substitution token
    Encrypt {
        /// Value to encrypt
        value: String,

        /// Directory holding the key files
        #[arg(short, long)]
        keys: PathBuf,
    },

    /// Seal the {enc:...} markers of a file and print the result
    Tokenize {
        /// File to tokenize
        file: PathBuf,

        /// Directory holding the key files
        #[arg(short, long)]
        keys: PathBuf,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// JSON logs unless CONFIGSERVER_ENV mentions "dev"
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let development = std::env::var("CONFIGSERVER_ENV")
        .map(|env| env.to_lowercase().contains("dev"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if development {
        builder.init();
    } else {
        builder.json().init();
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Commands::Serve { config } => commands::serve(&config),
        Commands::Keygen { path, rsa } => commands::keygen(&path, rsa),
        Commands::Register { client_id, keys } => commands::register(&client_id, &keys),
        Commands::Encrypt { value, keys } => commands::encrypt(&value, &keys),
        Commands::Tokenize { file, keys } => commands::tokenize(&file, &keys),
    }
}
