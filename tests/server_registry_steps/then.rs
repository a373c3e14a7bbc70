//! Then steps for server registry BDD scenarios.

use super::world::{RegistryWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use serde_json::json;
use switchboard::protocol::{CallToolResult, McpMethod};
use switchboard::registry::RegistryError;

#[then(r#"the registry lists {count:usize} tool for "{server}""#)]
fn registry_lists_tool(world: &RegistryWorld, count: usize, server: String) -> Result<(), eyre::Report> {
    expect_tool_count(world, count, &server)
}

#[then(r#"the registry lists {count:usize} tools for "{server}""#)]
fn registry_lists_tools(world: &RegistryWorld, count: usize, server: String) -> Result<(), eyre::Report> {
    expect_tool_count(world, count, &server)
}

fn expect_tool_count(world: &RegistryWorld, count: usize, server: &str) -> Result<(), eyre::Report> {
    let tools = world.registry.list_tools(Some(server));
    if tools.len() != count {
        return Err(eyre::eyre!("expected {count} tools, got {}", tools.len()));
    }
    Ok(())
}

#[then(r#"agent "{agent}" calling tool "{tool}" on "{server}" receives "{text}""#)]
fn agent_receives(
    world: &RegistryWorld,
    agent: String,
    tool: String,
    server: String,
    text: String,
) -> Result<(), eyre::Report> {
    let result = run_async(world.registry.call_tool(&server, &tool, json!({}), &agent))
        .wrap_err("routed call should succeed")?;
    if result != CallToolResult::text(&text) {
        return Err(eyre::eyre!("unexpected tool result {result:?}"));
    }
    Ok(())
}

#[then("registration fails with a duplicate server error")]
fn duplicate_registration_fails(world: &RegistryWorld) -> Result<(), eyre::Report> {
    let error = world
        .last_registration_error
        .as_ref()
        .ok_or_else(|| eyre::eyre!("expected a registration error"))?;
    if !matches!(error, RegistryError::DuplicateServer(_)) {
        return Err(eyre::eyre!("expected a duplicate server error, got {error:?}"));
    }
    Ok(())
}

#[then("the call is rejected because the agent is not allowed")]
fn call_rejected_by_allow_list(world: &RegistryWorld) -> Result<(), eyre::Report> {
    let outcome = world
        .last_call
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing call outcome"))?;
    if !matches!(outcome, Err(RegistryError::AgentNotAllowed { .. })) {
        return Err(eyre::eyre!("expected an allow-list rejection, got {outcome:?}"));
    }
    Ok(())
}

#[then("the server received no tool calls")]
fn server_received_no_calls(world: &RegistryWorld) -> Result<(), eyre::Report> {
    let calls = world.backend()?.tool_calls();
    if !calls.is_empty() {
        return Err(eyre::eyre!("expected no tool calls, got {calls:?}"));
    }
    Ok(())
}

#[then("the server received a shutdown request")]
fn server_received_shutdown(world: &RegistryWorld) -> Result<(), eyre::Report> {
    if !world.backend()?.requests().contains(&McpMethod::Shutdown) {
        return Err(eyre::eyre!("expected a shutdown request"));
    }
    Ok(())
}
