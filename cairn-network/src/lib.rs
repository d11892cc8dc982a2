//! Cairn Network Layer
//!
//! The seams a storage scheme talks through:
//! - **`PeerTransport`**: store, retrieve, delete, and ping one peer
//! - **`PeerDirectory`**: the currently live peers, dead ones pruned
//!
//! `LocalPeer` and `StaticDirectory` implement both in-process, which is
//! what the node binary and the scenario tests run against.
//!
//! # Usage
//!
//! ```ignore
//! use cairn_network::{DirectoryConfig, LocalPeer, PeerDirectory, PeerHandle, StaticDirectory};
//! use std::sync::Arc;
//!
//! let peers: Vec<PeerHandle> = (0..3)
//!     .map(|i| Arc::new(LocalPeer::in_memory(format!("peer-{}", i))) as PeerHandle)
//!     .collect();
//! let directory = StaticDirectory::with_peers(DirectoryConfig::default(), peers);
//! let live = directory.discover().await;
//! ```

pub mod directory;
pub mod local;
pub mod peer;

// Re-exports
pub use directory::{DirectoryConfig, PeerDirectory, StaticDirectory};
pub use local::LocalPeer;
pub use peer::{PeerHandle, PeerId, PeerTransport};
