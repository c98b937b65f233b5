use anyhow::Result;
use clap::Args;
use serde_json::Value as JsonValue;

#[derive(Args, Default, Clone, Copy)]
pub struct ToolsArgs {
    /// Pretty-print JSON
    #[arg(long)]
    pub pretty: bool,
}

/// Viewer tool listing, built without mounting anything.
pub fn tools_json() -> Result<JsonValue> {
    Ok(serde_json::to_value(markpane_viewer::tools_metadata())?)
}

pub fn execute(args: ToolsArgs) -> Result<()> {
    let value = tools_json()?;
    if args.pretty {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_names_the_viewer_tools() {
        let value = tools_json().unwrap();
        assert_eq!(value["id"], "markdown-viewer");
        let names: Vec<&str> = value["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert!(names.contains(&"change_font_size"));
        assert!(names.contains(&"navigate_slide"));
    }
}
