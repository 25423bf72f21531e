//! Lectern Server Client
//!
//! HTTP client for the media server's session and progress API.
//!
//! # Features
//!
//! - **Sessions**: open, sync and close playback sessions
//! - **Progress**: fetch progress for a work, fetch the current user
//! - **Offline sync**: upload sessions played while disconnected
//!
//! `LecternServerClient` implements [`lectern_core::RemoteSessionApi`], so the
//! playback service can use it directly.
//!
//! # Example
//!
//! ```ignore
//! use lectern_server_client::{LecternServerClient, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::with_token("https://books.example.com", "token");
//!     let client = LecternServerClient::new(config)?;
//!
//!     let progress = client.progress().await?.client().get_progress("li_1", None).await?;
//!     println!("{:?}", progress);
//!     Ok(())
//! }
//! ```

mod api;
mod client;
mod error;
mod progress;
mod sessions;
mod types;

// Re-export main types
pub use client::{LecternServerClient, ProgressClientHandle, SessionClientHandle};
pub use error::{Result, ServerClientError};
pub use types::{CreateSessionRequest, LocalSessionsRequest, ServerConfig};

// Re-export sub-clients for direct use if needed
pub use progress::ProgressClient;
pub use sessions::SessionClient;
