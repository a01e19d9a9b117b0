//! # evalwire
//!
//! TCP bridge that lets a remote REPL client evaluate code inside a
//! long-lived host process. The server accepts connections, frames incoming
//! source text, hands each request to an embedded evaluation engine, and
//! writes the result (value or error) back on the same connection.
//!
//! ## Architecture
//!
//! - **Protocol** (`protocol`): length-prefixed request/reply frames and the
//!   buffers that reassemble them from partial reads
//! - **Engine** (`engine`): the opaque [`EvalEngine`] capability plus the
//!   [`Gateway`] that serializes all evaluations through one engine instance
//! - **Session/Server**: one task per connection pumping bytes through the
//!   codec and gateway, under a listener with an explicit start/stop
//!   lifecycle
//!
//! ## Example
//!
//! ```ignore
//! use evalwire::ReplServer;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), evalwire::BridgeError> {
//!     let server = ReplServer::new(
//!         |source: &str, out: &Path| my_engine::eval(source, out),
//!         "target/cljs-out",
//!     );
//!     server.start_listening(9000).await?;
//!     // ... serve until shutdown ...
//!     server.stop();
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod protocol;

mod server;
mod session;
mod writer;

pub use engine::{EvalEngine, Gateway};
pub use error::BridgeError;
pub use protocol::{EvalOutcome, EvalRequest};
pub use server::{ReplServer, ServerConfig};
