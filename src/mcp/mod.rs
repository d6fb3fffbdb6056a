pub mod catalog;
pub mod protocol;
pub mod routes;
pub mod server;
