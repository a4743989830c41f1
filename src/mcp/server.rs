//! MCP message dispatcher.
//!
//! [`McpServer`] turns one raw inbound message into at most one raw reply:
//!
//! 1. **Decode**: malformed JSON is answered with a parse error (`id: null`)
//! 2. **Route**: requests go through a static method table, notifications
//!    are logged and never answered
//! 3. **Execute**: `tools/call` is delegated to the [`ToolExecutor`]
//! 4. **Encode**: the reply is serialised for the transport
//!
//! The dispatcher holds no per-session state. `initialize` does not gate
//! other methods, so clients that call `tools/list` or `tools/call` early are
//! still served. Any panic while handling a request is caught here and
//! answered with an internal error so one bad request cannot take the
//! process down.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    OutgoingMessage, RejectedMessage, MCP_PROTOCOL_VERSION, NOTIFICATION_PREFIX, SERVER_NAME,
};
use crate::tools::{ToolExecutor, ToolRegistry};

/// Anything that can answer one raw protocol message.
///
/// Transports depend on this trait rather than on [`McpServer`] directly.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one raw message from `client_id`.
    ///
    /// Returns the serialised reply, or `None` when the message must not be
    /// answered (notifications).
    async fn handle(&self, raw: &str, client_id: &str) -> Option<String>;
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapability>,
    /// Resource-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListCapability>,
    /// Prompt-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListCapability>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ListCapability::default()),
            resources: Some(ListCapability::default()),
            prompts: Some(ListCapability::default()),
        }
    }
}

/// Capability of a listable collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool, so we must take &bool here
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Built-in request methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    ResourcesList,
    PromptsList,
}

const METHOD_TABLE: &[(&str, Method)] = &[
    ("initialize", Method::Initialize),
    ("ping", Method::Ping),
    ("tools/list", Method::ToolsList),
    ("tools/call", Method::ToolsCall),
    ("resources/list", Method::ResourcesList),
    ("prompts/list", Method::PromptsList),
];

impl Method {
    fn lookup(name: &str) -> Option<Self> {
        METHOD_TABLE
            .iter()
            .find(|(method, _)| *method == name)
            .map(|(_, handler)| *handler)
    }
}

/// The price tools MCP server.
#[derive(Debug, Clone)]
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    executor: ToolExecutor,
}

impl McpServer {
    /// Creates a server offering `registry` and running tools on `executor`.
    #[must_use]
    pub fn new(registry: ToolRegistry, executor: ToolExecutor) -> Self {
        Self {
            registry: Arc::new(registry),
            executor,
        }
    }

    /// Handles one raw message and returns the reply, if any.
    pub async fn dispatch(&self, raw: &str, client_id: &str) -> Option<OutgoingMessage> {
        let request = match parse_message(raw) {
            Ok(IncomingMessage::Request(req)) => req,
            Ok(IncomingMessage::Notification(notif)) => {
                Self::handle_notification(&notif.method, client_id);
                return None;
            }
            Err(RejectedMessage::Reply(error)) => {
                debug!(client_id, code = error.error.code, "Rejected inbound message");
                return Some(error.into());
            }
            Err(RejectedMessage::Dropped(reason)) => {
                debug!(client_id, reason, "Dropped malformed notification");
                return None;
            }
        };

        if request.method.starts_with(NOTIFICATION_PREFIX) {
            Self::handle_notification(&request.method, client_id);
            return None;
        }

        let id = request.id.clone();
        let method = request.method.clone();
        let outcome = AssertUnwindSafe(self.handle_request(request, client_id))
            .catch_unwind()
            .await;

        Some(match outcome {
            Ok(Ok(response)) => response.into(),
            Ok(Err(error)) => error.into(),
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%method, %id, panic = %detail, "Request handler panicked");
                JsonRpcError::internal_error(id, "Internal error while handling request").into()
            }
        })
    }

    fn handle_notification(method: &str, client_id: &str) {
        match method {
            "notifications/initialized" => info!(client_id, "Client initialised"),
            _ => debug!(client_id, method, "Ignoring notification"),
        }
    }

    async fn handle_request(
        &self,
        req: JsonRpcRequest,
        client_id: &str,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let Some(method) = Method::lookup(&req.method) else {
            return Err(JsonRpcError::method_not_found(req.id, &req.method));
        };

        debug!(method = %req.method, id = %req.id, client_id, "Handling request");

        match method {
            Method::Initialize => Ok(Self::handle_initialize(&req)),
            Method::Ping => Ok(JsonRpcResponse::success(req.id, json!({}))),
            Method::ToolsList => Ok(self.handle_tools_list(&req)),
            Method::ToolsCall => self.handle_tools_call(&req, client_id).await,
            Method::ResourcesList => Ok(JsonRpcResponse::success(req.id, json!({ "resources": [] }))),
            Method::PromptsList => Ok(JsonRpcResponse::success(req.id, json!({ "prompts": [] }))),
        }
    }

    fn handle_initialize(req: &JsonRpcRequest) -> JsonRpcResponse {
        let params: InitializeParams = req
            .params
            .as_ref()
            .and_then(|p| serde_json::from_value(p.clone()).ok())
            .unwrap_or_default();

        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                requested = params.protocol_version.as_deref().unwrap_or("unspecified"),
                "Initialize request"
            );
        }

        let result = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        JsonRpcResponse::success(req.id.clone(), result)
    }

    fn handle_tools_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<_> = self.registry.definitions().collect();
        JsonRpcResponse::success(req.id.clone(), json!({ "tools": tools }))
    }

    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
        client_id: &str,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(req.id.clone(), format!("Invalid tool call params: {e}"))
            })?
            .ok_or_else(|| JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params"))?;

        let tool = self.registry.get(&params.name).ok_or_else(|| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Unknown tool: {}", params.name))
        })?;

        let arguments = tool.kind.parse_arguments(&params.arguments).map_err(|e| {
            JsonRpcError::invalid_params(
                req.id.clone(),
                format!("Invalid arguments for {}: {e}", params.name),
            )
        })?;

        let result = self.executor.execute(tool, arguments, client_id).await;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(req.id.clone(), "Internal error: failed to serialise result")
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }
}

#[async_trait]
impl MessageHandler for McpServer {
    async fn handle(&self, raw: &str, client_id: &str) -> Option<String> {
        let reply = self.dispatch(raw, client_id).await?;
        serde_json::to_string(&reply)
            .map_err(|e| error!(error = %e, "Failed to serialise reply"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::RateLimitConfig;
    use crate::pricing::SampleProvider;
    use crate::ratelimit::RateLimiter;

    fn server() -> McpServer {
        let executor = ToolExecutor::new(
            Arc::new(SampleProvider::new()),
            Arc::new(RateLimiter::new(RateLimitConfig::default())),
            Duration::from_secs(1),
        );
        McpServer::new(ToolRegistry::builtin(), executor)
    }

    async fn reply(server: &McpServer, raw: &str) -> Value {
        let text = server.handle(raw, "test").await.expect("expected a reply");
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn method_table_has_unique_entries() {
        for (i, (name, _)) in METHOD_TABLE.iter().enumerate() {
            assert!(METHOD_TABLE[i + 1..].iter().all(|(other, _)| other != name));
        }
        assert_eq!(Method::lookup("tools/call"), Some(Method::ToolsCall));
        assert_eq!(Method::lookup("tools/delete"), None);
    }

    #[tokio::test]
    async fn initialize_echoes_id() {
        let server = server();
        let resp = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":"init-1","method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test"}}}"#,
        )
        .await;
        assert_eq!(resp["id"], "init-1");
        assert_eq!(resp["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(resp["result"]["serverInfo"]["name"], SERVER_NAME);
        assert!(resp["result"]["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn initialize_without_params_is_accepted() {
        let server = server();
        let resp = reply(&server, r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#).await;
        assert_eq!(resp["id"], 1);
        assert!(resp["result"]["serverInfo"]["version"].is_string());
    }

    #[tokio::test]
    async fn tools_call_before_initialize_is_served() {
        let server = server();
        let resp = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"get_malaysian_prices","arguments":{"query":"ayam"}}}"#,
        )
        .await;
        assert_eq!(resp["result"]["content"][0]["type"], "text");
    }

    #[tokio::test]
    async fn empty_collections() {
        let server = server();
        let resources = reply(&server, r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#).await;
        assert_eq!(resources["result"]["resources"], json!([]));
        let prompts = reply(&server, r#"{"jsonrpc":"2.0","id":4,"method":"prompts/list"}"#).await;
        assert_eq!(prompts["result"]["prompts"], json!([]));
    }

    #[tokio::test]
    async fn ping_returns_empty_object() {
        let server = server();
        let resp = reply(&server, r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#).await;
        assert_eq!(resp["result"], json!({}));
    }

    #[tokio::test]
    async fn unknown_method_names_the_method() {
        let server = server();
        let resp = reply(&server, r#"{"jsonrpc":"2.0","id":6,"method":"tools/delete"}"#).await;
        assert_eq!(resp["error"]["code"], -32601);
        assert!(resp["error"]["message"].as_str().unwrap().contains("tools/delete"));
    }

    #[tokio::test]
    async fn notification_prefix_with_id_gets_no_reply() {
        let server = server();
        let out = server
            .handle(r#"{"jsonrpc":"2.0","id":7,"method":"notifications/initialized"}"#, "test")
            .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn invalid_arguments_are_invalid_params() {
        let server = server();
        let resp = reply(
            &server,
            r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"name":"compare_prices","arguments":{"item":"ayam"}}}"#,
        )
        .await;
        assert_eq!(resp["error"]["code"], -32602);
        assert_eq!(resp["id"], 8);
    }

    #[tokio::test]
    async fn missing_params_is_invalid_params() {
        let server = server();
        let resp = reply(&server, r#"{"jsonrpc":"2.0","id":9,"method":"tools/call"}"#).await;
        assert_eq!(resp["error"]["code"], -32602);
    }
}
