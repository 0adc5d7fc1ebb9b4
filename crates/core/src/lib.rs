//! Lifetime-resolving composition root.
//!
//! A root [`Container`] is built from an immutable [`BindingTable`]. Child scopes
//! created from it share the table and the root's singletons, cache their own
//! scoped instances and release the disposables they created, most recent first,
//! when disposed.
//!
//! ```rust
//! use std::sync::Arc;
//! use scopewise_core::{BindingTable, Container};
//!
//! struct Clock;
//! struct Session {
//!     clock: Arc<Clock>,
//! }
//!
//! let table = BindingTable::builder()
//!     .add_singleton::<Clock, _>(|_| Ok(Arc::new(Clock)))
//!     .add_scoped::<Session, _>(|c| Ok(Arc::new(Session { clock: c.resolve::<Clock>()? })))
//!     .build()
//!     .unwrap();
//!
//! let root = Container::new(Arc::new(table));
//! let first = root.create_scope().unwrap();
//! let second = root.create_scope().unwrap();
//!
//! let a = first.resolve::<Session>().unwrap();
//! let b = second.resolve::<Session>().unwrap();
//! assert!(!Arc::ptr_eq(&a, &b));
//! assert!(Arc::ptr_eq(&a.clock, &b.clock));
//! ```

pub mod config;
pub mod container;
pub mod errors;

pub use config::{ConfigError, ConfigSource, ContainerConfig, DisposalPolicy, FailurePolicy};
pub use container::{
    Binding, BindingTable, BindingTableBuilder, Container, ContainerBuilder, Disposable, Lifetime,
    ServiceId, ServiceToken,
};
pub use errors::{BoxError, CoreError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get crate version
pub fn version() -> &'static str {
    VERSION
}
