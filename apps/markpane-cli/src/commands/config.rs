use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use markpane_core::{config_schema_json, load_config, write_schema_file, Config};

#[derive(Subcommand)]
pub enum ConfigCmd {
    /// Emit JSON Schema for markpane.toml
    Schema(ConfigSchemaArgs),
    /// Validate a config file against the schema
    Check(ConfigCheckArgs),
}

#[derive(Args, Clone)]
pub struct ConfigSchemaArgs {
    /// Output path (writes file). If not set, prints to stdout.
    #[arg(long)]
    pub out: Option<String>,
}

#[derive(Args, Clone)]
pub struct ConfigCheckArgs {
    /// Path to the TOML config
    pub path: String,
    /// Print the parsed config as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(cmd: ConfigCmd) -> Result<()> {
    match cmd {
        ConfigCmd::Schema(args) => cmd_schema(args),
        ConfigCmd::Check(args) => cmd_check(args),
    }
}

fn cmd_schema(args: ConfigSchemaArgs) -> Result<()> {
    match args.out {
        Some(path) => {
            write_schema_file(&path).with_context(|| format!("writing schema to {}", path))?;
            println!("Wrote {}", path);
        }
        None => println!("{}", serde_json::to_string_pretty(&config_schema_json())?),
    }
    Ok(())
}

fn cmd_check(args: ConfigCheckArgs) -> Result<()> {
    let cfg = load_config(&args.path).with_context(|| format!("checking {}", args.path))?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&cfg)?);
    } else {
        print_summary(&args.path, &cfg);
    }
    Ok(())
}

fn print_summary(path: &str, cfg: &Config) {
    println!("Config: {} (ok)", path);
    println!("- strict event names: {}", cfg.strict_event_names());
    match cfg.host.max_panels {
        Some(max) => println!("- max panels: {}", max),
        None => println!("- max panels: unbounded"),
    }
    if let Some(dir) = &cfg.logging.log_dir {
        println!(
            "- file logs: {} ({})",
            dir,
            cfg.logging.rotation.as_deref().unwrap_or("daily")
        );
    }
    if !cfg.panels.is_empty() {
        let ids: Vec<&str> = cfg.panels.keys().map(String::as_str).collect();
        println!("- panel settings: {}", ids.join(", "));
    }
}
