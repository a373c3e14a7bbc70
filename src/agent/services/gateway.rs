//! Agent-facing API over the server registry.

use crate::agent::domain::{
    AgentApiError, AgentApiResult, AgentSession, AgentUsage, BatchCallOutcome, BatchToolCall,
    DiscoveryCache, SessionId,
};
use crate::clock::{SharedClock, system_clock};
use crate::protocol::{CallToolResult, ReadResourceResult};
use crate::registry::{ServerRegistry, ServerResource, ServerTool};
use crate::security::{ArgumentPolicy, SecurityError, SecurityManager};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Settings for [`AgentGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// How long discovery results are served from cache.
    pub discovery_ttl: Duration,
    /// Hardening applied to tool arguments before dispatch. `None` disables
    /// argument inspection.
    pub argument_policy: Option<ArgumentPolicy>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            discovery_ttl: Duration::from_secs(30),
            argument_policy: Some(ArgumentPolicy::new("/")),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The only surface agents use to reach MCP servers.
///
/// Calls name the agent making them. When no server is given, the tool or
/// resource is resolved against the cached catalog of connected servers the
/// agent may use, picking the first server by name. Usage is tracked per
/// agent whatever the outcome.
pub struct AgentGateway {
    registry: Arc<ServerRegistry>,
    security: Option<Arc<SecurityManager>>,
    settings: GatewaySettings,
    clock: SharedClock,
    sessions: Mutex<HashMap<SessionId, AgentSession>>,
    usage: Mutex<BTreeMap<String, AgentUsage>>,
    tool_cache: Mutex<DiscoveryCache<ServerTool>>,
    resource_cache: Mutex<DiscoveryCache<ServerResource>>,
}

impl AgentGateway {
    /// Creates a gateway over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ServerRegistry>, settings: GatewaySettings) -> Self {
        let ttl = settings.discovery_ttl;
        Self {
            registry,
            security: None,
            settings,
            clock: system_clock(),
            sessions: Mutex::new(HashMap::new()),
            usage: Mutex::new(BTreeMap::new()),
            tool_cache: Mutex::new(DiscoveryCache::new(ttl)),
            resource_cache: Mutex::new(DiscoveryCache::new(ttl)),
        }
    }

    /// Authenticates session tokens against `security`.
    #[must_use]
    pub fn with_security(mut self, security: Arc<SecurityManager>) -> Self {
        self.security = Some(security);
        self
    }

    /// Reads timestamps from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the registry the gateway routes through.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ServerRegistry> {
        &self.registry
    }

    /// Opens a session for `agent`. A presented token is authenticated now
    /// and forwarded to the security gate on every call in the session.
    ///
    /// # Errors
    ///
    /// Returns [`AgentApiError::EmptyAgentName`] for a blank agent name, or
    /// [`AgentApiError::Security`] when the token is rejected or no security
    /// manager is configured.
    pub fn open_session(&self, agent: &str, token: Option<&str>) -> AgentApiResult<AgentSession> {
        let name = agent_name(agent)?;
        let opened = AgentSession::new(name.to_owned(), self.clock.utc());
        let session = match token {
            None => opened,
            Some(raw) => {
                let security = self
                    .security
                    .as_ref()
                    .ok_or(SecurityError::NotConfigured)?;
                let principal = security.authenticate(raw)?;
                opened.authenticated(principal.principal_id().clone(), raw.to_owned())
            }
        };
        lock(&self.sessions).insert(session.id(), session.clone());
        tracing::info!(
            session = %session.id(),
            agent = name,
            principal = ?session.principal(),
            "opened agent session"
        );
        Ok(session)
    }

    /// Closes a session. Returns whether it was open.
    pub fn close_session(&self, id: SessionId) -> bool {
        let closed = lock(&self.sessions).remove(&id).is_some();
        if closed {
            tracing::info!(session = %id, "closed agent session");
        }
        closed
    }

    /// Returns an open session.
    #[must_use]
    pub fn session(&self, id: SessionId) -> Option<AgentSession> {
        lock(&self.sessions).get(&id).cloned()
    }

    /// Returns the usage counters of `agent`.
    #[must_use]
    pub fn usage(&self, agent: &str) -> AgentUsage {
        lock(&self.usage)
            .get(agent.trim())
            .copied()
            .unwrap_or_default()
    }

    /// Calls a tool on behalf of `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentApiError::ToolNotFound`] when no server can be
    /// resolved, [`AgentApiError::InvalidArguments`] when the arguments fail
    /// hardening, or [`AgentApiError::Registry`] with the routing or call
    /// failure.
    pub async fn call_tool(
        &self,
        agent: &str,
        tool: &str,
        arguments: Value,
        server: Option<&str>,
    ) -> AgentApiResult<CallToolResult> {
        let name = agent_name(agent)?;
        self.invoke_tool(name, None, tool, arguments, server).await
    }

    /// Calls a tool within a session, presenting the session token if any.
    ///
    /// # Errors
    ///
    /// Returns [`AgentApiError::UnknownSession`] for closed sessions, and
    /// otherwise the errors of [`AgentGateway::call_tool`].
    pub async fn call_tool_in_session(
        &self,
        session: SessionId,
        tool: &str,
        arguments: Value,
        server: Option<&str>,
    ) -> AgentApiResult<CallToolResult> {
        let open = self
            .session(session)
            .ok_or(AgentApiError::UnknownSession(session))?;
        self.invoke_tool(open.agent(), open.token(), tool, arguments, server)
            .await
    }

    /// Reads a resource on behalf of `agent`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentApiError::ResourceNotFound`] when no server can be
    /// resolved or [`AgentApiError::Registry`] with the routing or read
    /// failure.
    pub async fn read_resource(
        &self,
        agent: &str,
        uri: &str,
        server: Option<&str>,
    ) -> AgentApiResult<ReadResourceResult> {
        let name = agent_name(agent)?;
        let outcome = match self.resolve_resource_server(name, uri, server) {
            Ok(target) => self
                .registry
                .read_resource(&target, uri, name)
                .await
                .map_err(AgentApiError::from),
            Err(err) => Err(err),
        };
        let succeeded = outcome.is_ok();
        self.track(name, |usage, at| usage.record_resource_read(at, succeeded));
        outcome
    }

    /// Lists tools the agent may use, optionally restricted to one server
    /// and to servers carrying every tag in `tags`.
    #[must_use]
    pub fn discover_tools(
        &self,
        agent: &str,
        server: Option<&str>,
        tags: &[&str],
    ) -> Vec<ServerTool> {
        let cached = lock(&self.tool_cache).get(server, Instant::now());
        let catalog = cached.unwrap_or_else(|| {
            let fresh = self.registry.list_tools(server);
            lock(&self.tool_cache).put(server, Instant::now(), fresh.clone());
            fresh
        });
        catalog
            .into_iter()
            .filter(|entry| self.visible(agent, entry.server.as_str(), tags))
            .collect()
    }

    /// Lists resources the agent may read, optionally restricted to one
    /// server and to one MIME type.
    #[must_use]
    pub fn discover_resources(
        &self,
        agent: &str,
        server: Option<&str>,
        mime_type: Option<&str>,
    ) -> Vec<ServerResource> {
        let cached = lock(&self.resource_cache).get(server, Instant::now());
        let catalog = cached.unwrap_or_else(|| {
            let fresh = self.registry.list_resources(server);
            lock(&self.resource_cache).put(server, Instant::now(), fresh.clone());
            fresh
        });
        catalog
            .into_iter()
            .filter(|entry| {
                mime_type.is_none_or(|wanted| entry.resource.mime_type.as_deref() == Some(wanted))
            })
            .filter(|entry| self.visible(agent, entry.server.as_str(), &[]))
            .collect()
    }

    /// Drops cached discovery results.
    pub fn invalidate_discovery(&self) {
        lock(&self.tool_cache).clear();
        lock(&self.resource_cache).clear();
    }

    /// Runs several tool calls, in parallel or one after another. Outcomes
    /// are returned in input order and a failed call never aborts the rest.
    pub async fn batch_call_tools(
        &self,
        agent: &str,
        calls: Vec<BatchToolCall>,
        parallel: bool,
    ) -> Vec<BatchCallOutcome> {
        tracing::debug!(agent, calls = calls.len(), parallel, "running tool batch");
        if parallel {
            return join_all(calls.into_iter().map(|call| self.run_batch_call(agent, call))).await;
        }
        let mut outcomes = Vec::with_capacity(calls.len());
        for call in calls {
            outcomes.push(self.run_batch_call(agent, call).await);
        }
        outcomes
    }

    async fn run_batch_call(&self, agent: &str, call: BatchToolCall) -> BatchCallOutcome {
        let result = self
            .call_tool(agent, &call.tool, call.arguments, call.server.as_deref())
            .await;
        BatchCallOutcome {
            tool: call.tool,
            result,
        }
    }

    async fn invoke_tool(
        &self,
        agent: &str,
        token: Option<&str>,
        tool: &str,
        arguments: Value,
        server: Option<&str>,
    ) -> AgentApiResult<CallToolResult> {
        let outcome = self.dispatch_tool(agent, token, tool, arguments, server).await;
        if let Err(err) = &outcome {
            tracing::debug!(agent, tool, error = %err, "tool call failed");
        }
        let succeeded = outcome.is_ok();
        self.track(agent, |usage, at| usage.record_tool_call(at, succeeded));
        outcome
    }

    async fn dispatch_tool(
        &self,
        agent: &str,
        token: Option<&str>,
        tool: &str,
        arguments: Value,
        server: Option<&str>,
    ) -> AgentApiResult<CallToolResult> {
        if let Some(policy) = &self.settings.argument_policy {
            policy.inspect(&arguments)?;
        }
        let target = self.resolve_tool_server(agent, tool, server)?;
        Ok(self
            .registry
            .call_tool_with_token(&target, tool, arguments, agent, token)
            .await?)
    }

    fn resolve_tool_server(
        &self,
        agent: &str,
        tool: &str,
        server: Option<&str>,
    ) -> AgentApiResult<String> {
        if let Some(explicit) = server {
            return Ok(explicit.to_owned());
        }
        self.registry
            .list_tools(None)
            .into_iter()
            .find(|entry| {
                entry.tool.name == tool && self.visible(agent, entry.server.as_str(), &[])
            })
            .map(|entry| entry.server.to_string())
            .ok_or_else(|| AgentApiError::ToolNotFound(tool.to_owned()))
    }

    fn resolve_resource_server(
        &self,
        agent: &str,
        uri: &str,
        server: Option<&str>,
    ) -> AgentApiResult<String> {
        if let Some(explicit) = server {
            return Ok(explicit.to_owned());
        }
        self.registry
            .list_resources(None)
            .into_iter()
            .find(|entry| {
                entry.resource.uri == uri && self.visible(agent, entry.server.as_str(), &[])
            })
            .map(|entry| entry.server.to_string())
            .ok_or_else(|| AgentApiError::ResourceNotFound(uri.to_owned()))
    }

    fn visible(&self, agent: &str, server: &str, tags: &[&str]) -> bool {
        self.registry.server_config(server).is_some_and(|config| {
            config.admits(agent.trim()) && tags.iter().all(|tag| config.tags().contains(*tag))
        })
    }

    fn track(&self, agent: &str, update: impl FnOnce(&mut AgentUsage, DateTime<Utc>)) {
        let now = self.clock.utc();
        update(lock(&self.usage).entry(agent.to_owned()).or_default(), now);
    }
}

fn agent_name(agent: &str) -> AgentApiResult<&str> {
    let trimmed = agent.trim();
    if trimmed.is_empty() {
        return Err(AgentApiError::EmptyAgentName);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InMemoryMcpServer, InMemoryTransportFactory, TransportConfig};
    use crate::protocol::{ResourceDescriptor, ToolDescriptor};
    use crate::registry::adapters::InMemoryConfigStore;
    use crate::registry::{RegistryError, RegistrySettings, ServerConfig, ServerName};
    use crate::security::{Permission, PrincipalId, PrincipalKind, SecurityConfig, SecurityLevel};
    use rstest::{fixture, rstest};
    use serde_json::json;

    struct World {
        gateway: AgentGateway,
        alpha: InMemoryMcpServer,
        beta: InMemoryMcpServer,
    }

    fn ping_tool() -> ToolDescriptor {
        ToolDescriptor::new("ping", "Replies pong", json!({"type": "object"}))
    }

    fn backend(name: &str) -> InMemoryMcpServer {
        InMemoryMcpServer::new(name)
            .with_tool(ping_tool(), CallToolResult::text(format!("pong from {name}")))
    }

    fn config(name: &str, program: &str) -> ServerConfig {
        ServerConfig::new(
            ServerName::new(name).expect("valid name"),
            TransportConfig::stdio([program]).expect("valid argv"),
        )
        .with_auto_reconnect(false)
    }

    async fn world_with(
        alpha_config: ServerConfig,
        security: Option<Arc<SecurityManager>>,
    ) -> World {
        let alpha = backend("alpha").with_resource(
            ResourceDescriptor::new("mem://alpha/notes", "notes").with_mime_type("text/plain"),
            "alpha notes",
        );
        let beta = backend("beta").with_tool(
            ToolDescriptor::new("sum", "Adds numbers", json!({"type": "object"})),
            CallToolResult::text("3"),
        );
        let factory = InMemoryTransportFactory::new();
        factory.add("alpha-server", alpha.clone());
        factory.add("beta-server", beta.clone());
        let base = ServerRegistry::new(
            Arc::new(InMemoryConfigStore::new()),
            Arc::new(factory),
            RegistrySettings::default(),
        );
        let registry = Arc::new(match &security {
            Some(manager) => base.with_security(Arc::clone(manager)),
            None => base,
        });
        registry
            .register_server(alpha_config, true)
            .await
            .expect("alpha registers");
        registry
            .register_server(config("beta", "beta-server").with_tags(["math"]), true)
            .await
            .expect("beta registers");
        let gateway = AgentGateway::new(registry, GatewaySettings::default());
        World {
            gateway: match security {
                Some(manager) => gateway.with_security(manager),
                None => gateway,
            },
            alpha,
            beta,
        }
    }

    #[fixture]
    async fn world() -> World {
        world_with(config("alpha", "alpha-server"), None).await
    }

    #[rstest]
    #[tokio::test]
    async fn omitted_server_resolves_to_first_advertising_server(#[future] world: World) {
        let ready = world.await;

        let result = ready
            .gateway
            .call_tool("planner", "ping", json!({}), None)
            .await
            .expect("call should succeed");

        assert_eq!(result, CallToolResult::text("pong from alpha"));
        assert_eq!(ready.alpha.tool_calls().len(), 1);
        assert!(ready.beta.tool_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn resolution_skips_servers_the_agent_may_not_use() {
        let ready = world_with(
            config("alpha", "alpha-server").with_allowed_agents(["reviewer"]),
            None,
        )
        .await;

        let result = ready
            .gateway
            .call_tool("planner", "ping", json!({}), None)
            .await
            .expect("call should succeed");

        assert_eq!(result, CallToolResult::text("pong from beta"));
        assert!(ready.alpha.tool_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn explicit_server_still_enforces_the_allow_list() {
        let ready = world_with(
            config("alpha", "alpha-server").with_allowed_agents(["reviewer"]),
            None,
        )
        .await;

        let outcome = ready
            .gateway
            .call_tool("planner", "ping", json!({}), Some("alpha"))
            .await;

        assert!(matches!(
            outcome,
            Err(AgentApiError::Registry(RegistryError::AgentNotAllowed { .. }))
        ));
        assert!(ready.alpha.tool_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn unknown_tool_is_reported_and_counted(#[future] world: World) {
        let ready = world.await;

        let outcome = ready
            .gateway
            .call_tool("planner", "teleport", json!({}), None)
            .await;

        assert!(matches!(outcome, Err(AgentApiError::ToolNotFound(tool)) if tool == "teleport"));
        let usage = ready.gateway.usage("planner");
        assert_eq!(usage.tool_calls, 1);
        assert_eq!(usage.failures, 1);
    }

    #[rstest]
    #[tokio::test]
    async fn traversal_arguments_never_reach_a_server(#[future] world: World) {
        let ready = world.await;

        let outcome = ready
            .gateway
            .call_tool("planner", "ping", json!({"path": "../../../etc/passwd"}), None)
            .await;

        assert!(matches!(outcome, Err(AgentApiError::InvalidArguments(_))));
        assert!(ready.alpha.tool_calls().is_empty());
    }

    #[rstest]
    #[tokio::test]
    async fn resources_resolve_by_uri(#[future] world: World) {
        let ready = world.await;

        let contents = ready
            .gateway
            .read_resource("planner", "mem://alpha/notes", None)
            .await
            .expect("read should succeed");
        let missing = ready
            .gateway
            .read_resource("planner", "mem://nowhere", None)
            .await;

        assert_eq!(
            contents.contents.first().and_then(|item| item.text.as_deref()),
            Some("alpha notes")
        );
        assert!(matches!(missing, Err(AgentApiError::ResourceNotFound(_))));
        assert_eq!(ready.gateway.usage("planner").resource_reads, 2);
    }

    #[rstest]
    #[tokio::test]
    async fn discovery_filters_by_tags_and_mime_type(#[future] world: World) {
        let ready = world.await;

        let all_tools = ready.gateway.discover_tools("planner", None, &[]);
        let math_tools = ready.gateway.discover_tools("planner", None, &["math"]);
        let text = ready
            .gateway
            .discover_resources("planner", None, Some("text/plain"));
        let json_only = ready
            .gateway
            .discover_resources("planner", None, Some("application/json"));

        assert_eq!(all_tools.len(), 3);
        assert!(math_tools.iter().all(|entry| entry.server.as_str() == "beta"));
        assert_eq!(math_tools.len(), 2);
        assert_eq!(text.len(), 1);
        assert!(json_only.is_empty());
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn discovery_is_cached_until_the_ttl_lapses(#[future] world: World) {
        let ready = world.await;
        assert_eq!(ready.gateway.discover_tools("planner", Some("beta"), &[]).len(), 2);

        let beta = ServerName::new("beta").expect("valid name");
        ready.gateway.registry().disconnect_server(&beta).await;
        assert_eq!(ready.gateway.discover_tools("planner", Some("beta"), &[]).len(), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(ready.gateway.discover_tools("planner", Some("beta"), &[]).is_empty());
    }

    #[rstest]
    #[case::parallel(true)]
    #[case::sequential(false)]
    #[tokio::test]
    async fn batches_keep_input_order_and_isolate_failures(
        #[case] parallel: bool,
        #[future] world: World,
    ) {
        let ready = world.await;
        let calls = vec![
            BatchToolCall::new("sum", json!({})),
            BatchToolCall::new("teleport", json!({})),
            BatchToolCall::new("ping", json!({})).on_server("beta"),
        ];

        let outcomes = ready.gateway.batch_call_tools("planner", calls, parallel).await;

        let tools: Vec<&str> = outcomes.iter().map(|outcome| outcome.tool.as_str()).collect();
        let successes: Vec<bool> = outcomes.iter().map(BatchCallOutcome::is_success).collect();
        assert_eq!(tools, vec!["sum", "teleport", "ping"]);
        assert_eq!(successes, vec![true, false, true]);
        assert_eq!(ready.gateway.usage("planner").tool_calls, 3);
    }

    #[rstest]
    #[tokio::test]
    async fn token_sessions_need_a_security_manager(#[future] world: World) {
        let ready = world.await;

        let outcome = ready.gateway.open_session("planner", Some("token"));

        assert!(matches!(
            outcome,
            Err(AgentApiError::Security(SecurityError::NotConfigured))
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn session_tokens_pass_the_client_gate() {
        let security = Arc::new(SecurityManager::new(SecurityConfig::default()));
        let principal = PrincipalId::new("planner").expect("valid id");
        security
            .create_principal(
                principal.clone(),
                "Planner",
                PrincipalKind::Agent,
                SecurityLevel::User,
                [Permission::ReadTools, Permission::CallTools],
            )
            .expect("principal is created");
        let issued = security
            .create_token(&principal, None, None)
            .expect("token is issued");
        let ready = world_with(config("alpha", "alpha-server"), Some(Arc::clone(&security))).await;

        let session = ready
            .gateway
            .open_session("planner", Some(issued.token()))
            .expect("session opens");
        let result = ready
            .gateway
            .call_tool_in_session(session.id(), "ping", json!({}), None)
            .await
            .expect("call should succeed");

        assert_eq!(session.principal(), Some(&principal));
        assert_eq!(result, CallToolResult::text("pong from alpha"));
        assert!(ready.gateway.close_session(session.id()));
        let closed = ready
            .gateway
            .call_tool_in_session(session.id(), "ping", json!({}), None)
            .await;
        assert!(matches!(closed, Err(AgentApiError::UnknownSession(_))));
    }

    #[rstest]
    fn blank_agent_names_are_rejected() {
        assert!(matches!(agent_name("  "), Err(AgentApiError::EmptyAgentName)));
        assert_eq!(agent_name(" planner ").ok(), Some("planner"));
    }
}
