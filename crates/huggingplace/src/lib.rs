//! HuggingPlace client.
//!
//! Logs AI interactions to HuggingPlace and traces workflows through an
//! owned [`BatchSender`](huggingplace_trace::BatchSender).
//!
//! # Usage
//!
//! ```rust,no_run
//! use huggingplace::{ClientConfig, HuggingPlace, LogOptions, SessionOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HuggingPlace::new(ClientConfig::new("hp-key", "org-123"))?;
//!
//!     client
//!         .log(LogOptions::new("What is Rust?", "A systems language.").with_token_count(42))
//!         .await?;
//!
//!     let session = client.start_session(None, SessionOptions::new().with_metadata("channel", "web"));
//!     session.log(LogOptions::new("And Go?", "Another language.")).await?;
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod interaction;
pub mod session;

pub use client::{HuggingPlace, STORE_INTERACTION_PATH};
pub use config::{ClientConfig, ConfigUpdate, DEFAULT_TIMEOUT_MS, Mode, SafeConfig};
pub use error::{HuggingPlaceError, Result, TimedLogError};
pub use interaction::{LogOptions, StepLog, format_response_time};
pub use session::{Session, SessionInfo, SessionOptions};

pub use huggingplace_trace as trace;
