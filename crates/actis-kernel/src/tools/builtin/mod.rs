//! Built-in capability implementations.

mod common;
mod files;
mod http;
mod turn;

use super::ToolSet;

/// Register every built-in tool.
pub fn register_builtins(tools: &mut ToolSet) {
    for tool in common::all() {
        tools.register(tool);
    }
    tools.register(files::ReadFiles);
    tools.register(files::WriteFile);
    tools.register(files::ListFiles);
    tools.register(http::HttpGet);
    tools.register(turn::Respond);
    tools.register(turn::ContinueTurn);
    tools.register(turn::Reflect);
}
