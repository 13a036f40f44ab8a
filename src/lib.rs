//! pagepilot: LLM-planned browser automation with a resilient execution
//! core.
//!
//! The crate is organized around the execution layer between the planner
//! and the browser: a typed action DSL ([`dsl`]), a versioned element
//! catalog ([`catalog`]), a multi-strategy selector resolver
//! ([`resolver`]), the retrying executor ([`executor`]), an async task
//! manager ([`tasks`]), and the HTTP tier ([`server`]). The browser
//! itself sits behind the narrow [`browser::BrowserPort`] capability.

pub mod artifacts;
pub mod browser;
pub mod catalog;
pub mod client;
pub mod config;
pub mod dsl;
pub mod errors;
pub mod executor;
pub mod metrics;
pub mod planner;
pub mod poll;
pub mod resolver;
pub mod server;
pub mod tasks;
pub mod warnings;

pub use config::Config;
pub use errors::{AgentError, AgentResult, ErrorKind};
pub use executor::{DslExecutor, ExecResult};
pub use server::{build_router, AppState};
