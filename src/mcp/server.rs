use crate::app::App;
use crate::config::Settings;
use crate::errors::{ErrorCode, ToolError};
use crate::mcp::catalog::list_tools;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};

const PROTOCOL_VERSION: &str = "2025-06-18";
const SERVER_NAME: &str = "akamai-mcp";

pub struct McpServer {
    app: Arc<App>,
}

impl McpServer {
    pub fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    fn handle_initialize(&self) -> Value {
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            },
        })
    }

    fn handle_tools_list(&self) -> Value {
        serde_json::json!({ "tools": list_tools() })
    }

    async fn handle_tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
        if name.trim().is_empty() {
            return JsonRpcResponse::failure(id, ErrorCode::InvalidParams, "Missing tool name");
        }
        let args = params.get("arguments").cloned().unwrap_or(Value::Null);
        if !args.is_null() && !args.is_object() {
            return JsonRpcResponse::failure(id, ErrorCode::InvalidParams, "Tool arguments must be an object");
        }
        let response = self.app.tool_executor.execute(name, args).await;
        JsonRpcResponse::success(id, response.to_value())
    }

    /// Answers one decoded request. Notifications yield `None`.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if request.jsonrpc != "2.0" {
            let id = request.id.unwrap_or(Value::Null);
            return Some(JsonRpcResponse::failure(id, ErrorCode::InvalidRequest, "Invalid request"));
        }
        match request.method.as_str() {
            _ if request.method.starts_with("notifications/") && request.id.is_none() => None,
            "notifications/initialized" => request
                .id
                .map(|id| JsonRpcResponse::success(id, serde_json::json!({}))),
            "initialize" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_initialize())),
            "ping" => request
                .id
                .map(|id| JsonRpcResponse::success(id, serde_json::json!({}))),
            "tools/list" => request
                .id
                .map(|id| JsonRpcResponse::success(id, self.handle_tools_list())),
            "tools/call" => match request.id {
                Some(id) => Some(self.handle_tools_call(id, &request.params).await),
                None => None,
            },
            _ => request.id.map(|id| {
                JsonRpcResponse::failure(id, ErrorCode::MethodNotFound, "Method not found")
            }),
        }
    }

    /// Decodes one input line. Undecodable lines produce the matching
    /// JSON-RPC error instead of a request.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let parsed: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) => {
                return Some(JsonRpcResponse::failure(Value::Null, ErrorCode::ParseError, "Parse error"))
            }
        };
        let id = parsed.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<JsonRpcRequest>(parsed) {
            Ok(request) => self.handle_request(request).await,
            Err(_) => Some(JsonRpcResponse::failure(id, ErrorCode::InvalidRequest, "Invalid request")),
        }
    }

    async fn write_response<W: AsyncWrite + Unpin>(
        writer: &mut W,
        response: &JsonRpcResponse,
    ) -> Result<(), ToolError> {
        let payload = serde_json::to_string(response)?;
        writer.write_all(payload.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn run_stdio(&self) -> Result<(), ToolError> {
        let stdin = tokio::io::stdin();
        let stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin).lines();
        let mut writer = BufWriter::new(stdout);

        while let Some(line) = reader.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(trimmed).await {
                Self::write_response(&mut writer, &response).await?;
            }
        }
        self.app.logger.info("stdin closed; shutting down", None);
        Ok(())
    }
}

pub async fn run_stdio(settings: Settings) -> Result<(), ToolError> {
    let app = App::initialize(settings)?;
    let server = McpServer::new(Arc::new(app));
    server.run_stdio().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fake_api::FakeApi;
    use reqwest::Method;
    use serde_json::json;

    fn server(api: FakeApi) -> McpServer {
        let app = App::with_api(Settings::for_tests(), Arc::new(api)).expect("app");
        McpServer::new(Arc::new(app))
    }

    async fn send(server: &McpServer, line: &str) -> Option<Value> {
        server
            .handle_line(line)
            .await
            .map(|r| serde_json::to_value(&r).expect("serialize"))
    }

    #[tokio::test]
    async fn initialize_reports_server_info() {
        let out = send(&server(FakeApi::new()), r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#)
            .await
            .expect("response");
        assert_eq!(out["result"]["serverInfo"]["name"], "akamai-mcp");
        assert_eq!(out["result"]["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn notifications_get_no_reply() {
        let out = send(
            &server(FakeApi::new()),
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
        )
        .await;
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn malformed_lines_map_to_json_rpc_errors() {
        let srv = server(FakeApi::new());
        let parse = send(&srv, "{not json").await.expect("reply");
        assert_eq!(parse["error"]["code"], -32700);
        let invalid = send(&srv, r#"{"jsonrpc":"2.0","id":4}"#).await.expect("reply");
        assert_eq!(invalid["error"]["code"], -32600);
        assert_eq!(invalid["id"], 4);
        let unknown = send(&srv, r#"{"jsonrpc":"2.0","id":5,"method":"resources/list"}"#)
            .await
            .expect("reply");
        assert_eq!(unknown["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tools_list_exposes_catalog() {
        let out = send(&server(FakeApi::new()), r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
            .await
            .expect("reply");
        let tools = out["result"]["tools"].as_array().cloned().unwrap_or_default();
        assert_eq!(tools.len(), list_tools().len());
        assert!(tools.iter().any(|t| t["name"] == "property_list"));
    }

    #[tokio::test]
    async fn numeric_ids_reach_the_api_prefixed() {
        let api = Arc::new(FakeApi::new().on(
            Method::GET,
            "/papi/v1/properties",
            200,
            json!({"properties": {"items": []}}),
        ));
        let app = App::with_api(Settings::for_tests(), api.clone()).expect("app");
        let out = send(
            &McpServer::new(Arc::new(app)),
            r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"property_list","arguments":{"contractId":1,"groupId":12345}}}"#,
        )
        .await
        .expect("reply");
        assert!(out["result"].get("isError").is_none());
        let call = &api.calls()[0];
        assert_eq!(call.query_value("contractId"), Some("ctr_1"));
        assert_eq!(call.query_value("groupId"), Some("grp_12345"));
    }

    #[tokio::test]
    async fn tool_failures_are_results_not_protocol_errors() {
        let api = FakeApi::new().on(Method::GET, "/papi/v1/contracts", 403, json!({"detail": "denied"}));
        let out = send(
            &server(api),
            r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"contract_list","arguments":{}}}"#,
        )
        .await
        .expect("reply");
        assert!(out.get("error").is_none());
        assert_eq!(out["result"]["isError"], true);
    }
}
