use crate::errors::ToolError;
use crate::services::client::{AkamaiApi, ApiRequest, ApiResponse};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

struct Route {
    method: Method,
    path: String,
    responses: VecDeque<Result<ApiResponse, ToolError>>,
}

/// Scripted [`AkamaiApi`] for unit tests. Each route answers with its queued
/// responses in order and repeats the last one.
#[derive(Default)]
pub(crate) struct FakeApi {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl FakeApi {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(self, method: Method, path: &str, response: Result<ApiResponse, ToolError>) -> Self {
        if let Ok(mut routes) = self.routes.lock() {
            match routes.iter_mut().find(|r| r.method == method && r.path == path) {
                Some(route) => route.responses.push_back(response),
                None => routes.push(Route {
                    method,
                    path: path.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    pub(crate) fn on(self, method: Method, path: &str, status: u16, body: Value) -> Self {
        let response = if (200..300).contains(&status) {
            Ok(ApiResponse {
                status,
                headers: HashMap::new(),
                body,
            })
        } else {
            Err(ToolError::from_http_status(status, &body))
        };
        self.push(method, path, response)
    }

    pub(crate) fn fail(self, method: Method, path: &str, error: ToolError) -> Self {
        self.push(method, path, Err(error))
    }

    pub(crate) fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub(crate) fn calls_to(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }
}

#[async_trait]
impl AkamaiApi for FakeApi {
    async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ToolError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let mut routes = self
            .routes
            .lock()
            .map_err(|_| ToolError::unknown("fake api poisoned"))?;
        let Some(route) = routes
            .iter_mut()
            .find(|r| r.method == request.method && r.path == request.path)
        else {
            return Err(ToolError::not_found(format!("no fake route for {} {}", request.method, request.path)));
        };
        if route.responses.len() > 1 {
            if let Some(next) = route.responses.pop_front() {
                return next;
            }
        }
        route
            .responses
            .front()
            .cloned()
            .unwrap_or_else(|| Err(ToolError::unknown("empty fake route")))
    }
}
