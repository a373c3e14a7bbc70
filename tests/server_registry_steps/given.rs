//! Given steps for server registry BDD scenarios.

use super::world::RegistryWorld;
use eyre::WrapErr;
use rstest_bdd_macros::given;
use serde_json::json;
use switchboard::client::{InMemoryMcpServer, TransportConfig};
use switchboard::protocol::{CallToolResult, ToolDescriptor};
use switchboard::registry::{ServerConfig, ServerName};

#[given(r#"an MCP server "{name}" advertising tool "{tool}""#)]
fn server_advertising_tool(
    world: &mut RegistryWorld,
    name: String,
    tool: String,
) -> Result<(), eyre::Report> {
    let program = format!("{name}-server");
    let backend = InMemoryMcpServer::new(&name).with_tool(
        ToolDescriptor::new(&tool, format!("Tool {tool}"), json!({"type": "object"})),
        CallToolResult::text("pong"),
    );
    world.factory.add(&program, backend.clone());
    let config = ServerConfig::new(
        ServerName::new(&name).wrap_err("server name should be valid")?,
        TransportConfig::stdio([program]).wrap_err("stdio transport should be valid")?,
    )
    .with_auto_reconnect(false);
    world.backend = Some(backend);
    world.pending_config = Some(config);
    Ok(())
}

#[given(r#"the server only admits agent "{agent}""#)]
fn server_admits_only(world: &mut RegistryWorld, agent: String) -> Result<(), eyre::Report> {
    let config = world.pending_config()?.with_allowed_agents([agent]);
    world.pending_config = Some(config);
    Ok(())
}
