use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{ConfigCmd, DemoArgs, ToolsArgs};

#[derive(Parser)]
#[command(name = "markpane", version, about = "markpane panel utilities")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the markdown viewer's tool metadata (JSON)
    Tools(ToolsArgs),
    /// Config helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCmd,
    },
    /// Run the markdown viewer in the mock host and print its view model
    Demo(DemoArgs),
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Tools(args) => commands::tools::execute(args),
        Commands::Config { cmd } => commands::config::execute(cmd),
        Commands::Demo(args) => commands::demo::execute(args).await,
    }
}

#[tokio::main]
async fn main() {
    markpane_otel::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
