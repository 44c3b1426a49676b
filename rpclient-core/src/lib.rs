//! # rpclient core
//!
//! Client library for reporting test runs to a ReportPortal style service.
//!
//! This crate provides:
//! - A reporting session that tracks the launch and item hierarchy
//! - A retrying request pipeline over a pluggable transport
//! - Request and response payloads of the service API
//! - Configuration and logging setup
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | Session             | ---> | Executor            | ---> | Transport           |
//! | launch/item/log ops |      | retry + backoff     |      | reqwest or custom   |
//! +---------------------+      +---------------------+      +---------------------+
//!            |                         |                             |
//!            v                         v                             v
//! +---------------------+      +---------------------+      +---------------------+
//! | Tracker             |      | status + decode     |      | reporting service   |
//! | open item stack     |      | classification      |      | /api/v1/{project}   |
//! +---------------------+      +---------------------+      +---------------------+
//!            ^
//!            |
//! +---------------------+
//! | Config              |
//! | rpclient.toml + env |
//! +---------------------+
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use rpclient_core::{Config, FinishItem, ItemType, LogLevel, Session, StartItem, StartLaunch, Status};
//!
//! # async fn run() -> rpclient_core::Result<()> {
//! let mut session = Session::new(Config::load()?)?;
//! session.start_launch(StartLaunch::new("nightly")).await?;
//! session.start_item(StartItem::new("login", ItemType::Test)).await?;
//! session.log("signed in", LogLevel::Info).await?;
//! session.finish_item(FinishItem::new(Status::Passed)).await?;
//! session.finish_launch(Status::Passed, None).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod masking;
pub mod payload;
pub mod session;
pub mod tracker;
pub mod transport;

pub use config::{Config, RetryConfig};
pub use error::{Error, Result, TransportError};
pub use executor::Executor;
pub use payload::{
    ExternalIssue, FinishItem, FinishLaunchResponse, GetItemResponse, Issue, ItemType, LogEntry,
    LogLevel, LogResponse, MessageResponse, Mode, Parameter, StartItem, StartItemResponse,
    StartLaunch, StartLaunchResponse, Status, Timestamp,
};
pub use session::Session;
pub use tracker::{Slot, Tracker};
pub use transport::{Body, FormPart, PendingRequest, ReqwestTransport, Response, Transport};
