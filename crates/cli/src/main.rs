//! wordtool - convert and inspect word processing documents

mod commands;

use clap::{Parser, Subcommand};
use commands::{comments, convert, info, CommentsArgs, ConvertArgs, InfoArgs};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Convert documents between DOCX, ODT, RTF, HTML, PDF and plain text, and
/// inspect their metadata, tracked changes and comments
#[derive(Parser, Debug)]
#[command(name = "wordtool")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log codec activity (repeat for more detail)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Editor settings file (JSON)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a document; formats come from the file extensions
    Convert(ConvertArgs),

    /// Print metadata, statistics, styles, tracked changes and comments
    Info(InfoArgs),

    /// Print or export the comments of a document
    Comments(CommentsArgs),
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = commands::load_settings(cli.settings.as_deref());
    let result = match cli.command {
        Command::Convert(args) => convert(args, settings),
        Command::Info(args) => info(args, settings),
        Command::Comments(args) => comments(args, settings),
    };

    if let Err(err) = result {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
