//! # shardmesh-dispatch
//!
//! Turns raw [`DataChangedEvent`]s from a repository watch into typed
//! [`DispatchEvent`]s.
//!
//! ```ignore
//! let dispatcher = Arc::new(ChangeDispatcher::new(DispatchBuilderRegistry::with_defaults()));
//! let mut events = dispatcher.subscribe();
//! let (tx, rx) = mpsc::channel(256);
//! let _watch = repository.watch("/", tx).await?;
//! tokio::spawn({
//!     let dispatcher = dispatcher.clone();
//!     async move { dispatcher.run(rx).await }
//! });
//! ```
//!
//! [`DataChangedEvent`]: shardmesh_core::DataChangedEvent

pub mod builder;
mod dispatcher;
mod event;

pub use builder::{DispatchBuilder, DispatchBuilderRegistry};
pub use dispatcher::{ChangeDispatcher, DEFAULT_BUFFER_SIZE};
pub use event::{AlterRuleItemEvent, DispatchEvent, DropRuleItemEvent};
