#![allow(dead_code)]

use akamai_mcp::app::App;
use akamai_mcp::config::{Credentials, Settings};
use akamai_mcp::mcp::protocol::ToolResponse;
use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::sync::Mutex;

/// Serializes tests that touch process environment variables.
pub static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Settings whose EdgeGrid host points at a local mock server.
pub fn settings_for(base_url: &str) -> Settings {
    let mut settings = Settings::for_tests();
    settings.credentials = Some(Credentials {
        host: base_url.to_string(),
        client_token: "akab-client-token".to_string(),
        client_secret: "c2VjcmV0LXNlY3JldA==".to_string(),
        access_token: "akab-access-token".to_string(),
        account_key: None,
    });
    settings
}

pub fn app_for(base_url: &str) -> App {
    App::initialize(settings_for(base_url)).expect("app")
}

pub async fn call(app: &App, tool: &str, args: Value) -> ToolResponse {
    app.tool_executor.execute(tool, args).await
}

/// Runs a tool with `format: "json"` and parses the rendered payload.
pub async fn call_json(app: &App, tool: &str, mut args: Value) -> (bool, Value) {
    if let Value::Object(map) = &mut args {
        map.insert("format".to_string(), Value::String("json".to_string()));
    }
    let response = call(app, tool, args).await;
    let parsed = serde_json::from_str(response.first_text()).expect("json output");
    (response.is_error(), parsed)
}
