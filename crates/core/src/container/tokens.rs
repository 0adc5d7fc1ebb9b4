//! Typed accessor keys.
//!
//! A service token names one accessor of a service type, so several bindings of
//! the same type (say a transient and a singleton `dyn Notifier`) can live side by
//! side and be resolved without spelling the name as a string at every call site.
//!
//! ```rust
//! use std::sync::Arc;
//! use scopewise_core::{service_token, BindingTable, Container, Lifetime};
//!
//! pub trait Notifier: Send + Sync {
//!     fn channel(&self) -> &'static str;
//! }
//!
//! struct Email;
//!
//! impl Notifier for Email {
//!     fn channel(&self) -> &'static str {
//!         "email"
//!     }
//! }
//!
//! service_token!(pub AuditNotifier: dyn Notifier);
//!
//! let table = BindingTable::builder()
//!     .add_token::<AuditNotifier, _>(Lifetime::Singleton, |_| {
//!         Ok(Arc::new(Email) as Arc<dyn Notifier>)
//!     })
//!     .build()
//!     .unwrap();
//!
//! let root = Container::new(Arc::new(table));
//! let notifier = root.resolve_token::<AuditNotifier>().unwrap();
//! assert_eq!(notifier.channel(), "email");
//! ```

use crate::container::descriptor::ServiceId;

/// Marker type identifying one named accessor of a service type
pub trait ServiceToken: 'static {
    /// The declared service type handed out by the accessor
    type Service: ?Sized + Send + Sync + 'static;

    /// Accessor name, unique per service type
    const NAME: &'static str;

    fn service_id() -> ServiceId {
        ServiceId::named::<Self::Service>(Self::NAME)
    }
}

/// Declare a zero-sized [`ServiceToken`] named after the accessor
#[macro_export]
macro_rules! service_token {
    ($vis:vis $name:ident : $service:ty) => {
        $vis struct $name;

        impl $crate::container::ServiceToken for $name {
            type Service = $service;
            const NAME: &'static str = stringify!($name);
        }
    };
}
