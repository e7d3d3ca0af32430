//! Recursive directory watching.
//!
//! Watch subscriptions are non-recursive, and the installer creates nested
//! directories while it runs. The cascade works around that by giving every
//! directory its own [`WatchNode`]:
//!
//! ```text
//! WatchTree (root node on <install root>/.meta)
//!     │ directory event
//!     ▼
//! WatchNode (Foo-Bar-1.0) ──directory event──▶ WatchNode (...) ──▶ ...
//!     │ file event
//!     ▼
//! FileEventFilter ──*MYMETA.json──▶ metadata parser ──▶ ReportCallback
//! ```
//!
//! A new node scans its directory once on start and every node sweeps its
//! directory on close, so files written before a subscription existed or
//! after the last event was delivered are still seen. The filter reports
//! each file once however many times it is parsed.
//!
//! Every node is an independent task. They share only the session's
//! pending-work counter, the shutdown signal, and the registry that keeps one
//! node per path.

mod event;
mod filter;
mod node;
mod registry;
mod tree;

pub use event::FileEvent;
pub use filter::{FileEventFilter, FilterOutcome, ReportCallback};
pub use node::WatchNode;
pub use registry::WatchRegistry;
pub use tree::{TreeSummary, WatchTree};
