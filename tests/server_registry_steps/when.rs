//! When steps for server registry BDD scenarios.

use super::world::{RegistryWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use serde_json::json;

#[when("the server is registered and connected")]
fn register_and_connect(world: &mut RegistryWorld) -> Result<(), eyre::Report> {
    let config = world.pending_config()?;
    let status = run_async(world.registry.register_server(config, true))
        .wrap_err("registration should succeed")?;
    if !status.connected() {
        return Err(eyre::eyre!(
            "expected a connected server, last error: {:?}",
            status.last_error()
        ));
    }
    Ok(())
}

#[when("the server is registered twice")]
fn register_twice(world: &mut RegistryWorld) -> Result<(), eyre::Report> {
    run_async(world.registry.register_server(world.pending_config()?, false))
        .wrap_err("first registration should succeed")?;
    let second = run_async(world.registry.register_server(world.pending_config()?, false));
    world.last_registration_error = second.err();
    Ok(())
}

#[when(r#"agent "{agent}" calls tool "{tool}" on "{server}""#)]
fn agent_calls_tool(world: &mut RegistryWorld, agent: String, tool: String, server: String) {
    let outcome = run_async(world.registry.call_tool(&server, &tool, json!({}), &agent));
    world.last_call = Some(outcome);
}

#[when("the server is unregistered")]
fn unregister(world: &mut RegistryWorld) -> Result<(), eyre::Report> {
    let name = world.pending_config()?.name().to_string();
    run_async(world.registry.unregister_server(&name)).wrap_err("unregister should succeed")?;
    Ok(())
}
