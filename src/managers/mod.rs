pub mod account;
pub mod cps;
pub mod dns;
pub mod property;
pub mod purge;
pub mod reporting;
pub mod securemobi;
pub mod security;
