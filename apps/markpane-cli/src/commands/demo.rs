use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use markpane_core::{load_effective_config, PanelProps};
use markpane_mock_host::MockHost;
use serde_json::Value as JsonValue;

const SAMPLE: &str = "# markpane\n\nA panel rendered by the mock host.\n\n---\n\n# Slides\n\nSplit on `---` lines.";

#[derive(Args, Clone)]
pub struct DemoArgs {
    /// Markdown file to open; a built-in sample otherwise
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Tool to invoke before rendering
    #[arg(long)]
    pub invoke: Option<String>,
    /// JSON arguments for --invoke
    #[arg(long, requires = "invoke", default_value = "{}")]
    pub args: String,
    /// Viewport width handed to the panel
    #[arg(long)]
    pub width: Option<u32>,
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            file: None,
            invoke: None,
            args: "{}".to_string(),
            width: None,
            pretty: false,
        }
    }
}

/// Mount the viewer in the mock host and return its rendered view model.
pub async fn run_demo(args: &DemoArgs) -> Result<JsonValue> {
    let (path, content) = match &args.file {
        Some(file) => {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("reading {}", file.display()))?;
            (file.display().to_string(), text)
        }
        None => ("sample.md".to_string(), SAMPLE.to_string()),
    };

    let mut mock = MockHost::with_config(load_effective_config());
    mock.load(markpane_viewer::definition()).await?;
    mock.open_file(&path, &content);
    if let Some(width) = args.width {
        mock.set_props(PanelProps {
            viewport_width: Some(width),
            ..PanelProps::default()
        });
    }
    if let Some(tool) = &args.invoke {
        let tool_args: JsonValue =
            serde_json::from_str(&args.args).context("parsing --args as JSON")?;
        let invocation = mock.invoke(tool, tool_args)?;
        tracing::info!(
            tool = %invocation.tool,
            delivered = invocation.delivered,
            "tool invoked"
        );
    }

    let view = mock.render(markpane_viewer::PANEL_ID)?;
    let report = mock.shutdown().await;
    if !report.is_success() {
        tracing::warn!(failed = ?report.failed, "demo shutdown reported failures");
    }
    Ok(view.0)
}

pub async fn execute(args: DemoArgs) -> Result<()> {
    let view = run_demo(&args).await?;
    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        println!("{}", view);
    }
    Ok(())
}
