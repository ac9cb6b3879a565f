//! # polyrpc client proxies
//!
//! One thin proxy per transport. Each encodes a call with the requested
//! wire format generation, performs the transport exchange, and either
//! returns the decoded result or raises the decoded [`Fault`].
//!
//! ```rust,no_run
//! use polyrpc_client::HttpProxy;
//! use polyrpc_codec::ProtocolVersion;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let proxy = HttpProxy::new("http://127.0.0.1:7080/")?
//!         .version(ProtocolVersion::V2);
//!     let sum = proxy.call("add", vec![json!(3), json!(5)]).await?;
//!     println!("3 + 5 = {sum}");
//!     Ok(())
//! }
//! ```
//!
//! [`Fault`]: polyrpc_codec::Fault

pub mod error;
pub mod http;
pub mod netstring;

pub use error::{ClientError, ClientResult};
pub use http::HttpProxy;
pub use netstring::NetstringProxy;

// Re-export the codec types callers need to make and interpret calls.
pub use polyrpc_codec::{Fault, Params, ProtocolVersion};
