pub mod config;
pub mod demo;
pub mod tools;

pub use config::ConfigCmd;
pub use demo::DemoArgs;
pub use tools::ToolsArgs;
