//! capbridge: device-capability service bridge for embedded script runtimes.
//!
//! Scripts running inside a separately scheduled interpreter reach host
//! device capabilities through a fixed call surface, never touching the host
//! OS themselves:
//!
//! ```text
//! interpreter ──JSON call──▶ CallRouter ──▶ FacadeRegistry ──▶ Facade ──▶ host subsystem
//!      ▲                         │                                  │
//!      └──────JSON reply─────────┘        ReadingCache ◀── updates ─┘
//! ```
//!
//! # Architecture
//!
//! - **Facades** ([`facade`]): sensor, location, battery, network, speech and
//!   data channel. Each owns one host subsystem handle and caches the latest
//!   reading per source.
//! - **Registry** ([`registry`]): one lazily built instance per facade kind.
//! - **Output relay** ([`output`]): durable log lines plus transient notices
//!   shown on the UI-owning thread.
//! - **Interpreter lifecycle** ([`interpreter`]): at most one live run per
//!   role, each on a dedicated thread.
//! - **Call surface** ([`bridge`], [`ffi`]): versioned JSON envelopes over
//!   stdio or the C ABI.

pub mod bridge;
pub mod bridge_dirs;
pub mod config;
pub mod error;
pub mod facade;
pub mod ffi;
pub mod interpreter;
pub mod logging;
pub mod output;
pub mod platform;
pub mod reading;
pub mod registry;

pub use bridge::contract::{CallEnvelope, CallName, ReplyEnvelope};
pub use bridge::router::CallRouter;
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use facade::{Facade, FacadeKind};
pub use interpreter::{
    InterpreterEntry, InterpreterManager, LaunchSpec, RunDescriptor, RunState, StartOutcome,
};
pub use output::OutputRelay;
pub use reading::Stamped;
pub use registry::{FacadeHandle, FacadeRegistry};
