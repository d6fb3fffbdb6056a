pub mod cache;
pub mod client;
pub mod edgegrid;
pub mod formatter;
pub mod logger;
pub mod name_cache;
pub mod orchestrator;
pub mod poller;
pub mod response;
pub mod selection;
pub mod tool_executor;
pub mod validation;

#[cfg(test)]
pub(crate) mod fake_api;
