//! End-to-end tests of the stdio transport against the `mcp_echo_server`
//! helper binary.

#![expect(
    clippy::expect_used,
    reason = "Test code uses expect for assertion clarity"
)]

use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use switchboard::client::{
    DefaultTransportFactory, ErrorKind, McpClient, McpClientOptions, TransportConfig,
};
use switchboard::protocol::CallToolResult;
use switchboard::registry::{
    JsonFileConfigStore, RegistryConfigFile, RegistrySettings, ServerConfig, ServerConfigStore,
    ServerName, ServerRegistry,
};

const ECHO_SERVER: &str = env!("CARGO_BIN_EXE_mcp_echo_server");

#[fixture]
fn client() -> McpClient {
    McpClient::new(
        "echo",
        TransportConfig::stdio([ECHO_SERVER]).expect("valid argv"),
        Arc::new(DefaultTransportFactory),
        McpClientOptions::default().with_request_timeout(Duration::from_secs(5)),
    )
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn lists_exactly_the_advertised_tools(client: McpClient) {
    let info = client.connect().await.expect("handshake should succeed");
    let tools = client.list_tools().await.expect("listing should succeed");
    client.disconnect().await;

    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["ping"]);
    assert_eq!(info.server_info.name, "mcp-echo-server");
    assert!(info.supports("tools"));
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn calls_tools_and_reads_resources(client: McpClient) {
    client.connect().await.expect("handshake should succeed");

    let pong = client
        .call_tool("ping", json!({}), None)
        .await
        .expect("ping should succeed");
    let readme = client
        .read_resource("echo://readme")
        .await
        .expect("read should succeed");
    let missing = client
        .call_tool("teleport", json!({}), None)
        .await
        .expect_err("unknown tool should fail");
    client.disconnect().await;

    assert_eq!(pong, CallToolResult::text("pong"));
    assert_eq!(readme.contents.len(), 1);
    assert_eq!(missing.kind(), ErrorKind::Protocol);
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn disconnect_fails_the_pending_call(client: McpClient) {
    let shared = Arc::new(client);
    shared.connect().await.expect("handshake should succeed");

    let caller = Arc::clone(&shared);
    let in_flight =
        tokio::spawn(async move { caller.call_tool("hang", json!({}), None).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    shared.disconnect().await;

    let outcome = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("pending call must resolve rather than hang")
        .expect("call task should not panic");
    let error = outcome.expect_err("pending call must fail");
    assert_eq!(error.kind(), ErrorKind::Connection);
    assert!(!shared.is_connected());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn registry_connects_servers_from_a_config_file() {
    let directory = tempfile::tempdir().expect("temporary directory");
    let path = camino::Utf8PathBuf::from_path_buf(directory.path().join("servers.json"))
        .expect("utf-8 path");
    let config = ServerConfig::new(
        ServerName::new("echo").expect("valid name"),
        TransportConfig::stdio([ECHO_SERVER]).expect("valid argv"),
    )
    .with_auto_reconnect(false);
    let store = JsonFileConfigStore::new(path);
    store
        .save(&RegistryConfigFile::from_configs([&config]))
        .await
        .expect("seed config should save");
    let registry = Arc::new(ServerRegistry::new(
        Arc::new(store),
        Arc::new(DefaultTransportFactory),
        RegistrySettings::default(),
    ));

    let connected = registry.start().await.expect("registry should start");
    let result = registry
        .call_tool("echo", "ping", json!({}), "planner")
        .await
        .expect("routed call should succeed");
    let tools = registry.list_tools(Some("echo"));
    registry.stop().await;

    assert_eq!(connected, 1);
    assert_eq!(result, CallToolResult::text("pong"));
    assert_eq!(tools.len(), 1);
}
