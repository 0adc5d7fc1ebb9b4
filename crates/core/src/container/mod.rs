#[allow(clippy::module_inception)]
pub mod container;
pub mod binding;
pub mod builder;
pub mod descriptor;
pub mod disposal;
mod guard;
pub mod lazy;
pub mod lifetime;
pub mod tokens;

pub use binding::{Binding, BindingTable, BindingTableBuilder, Created, FactoryEntry, FactoryFn, Instance};
pub use builder::ContainerBuilder;
pub use container::Container;
pub use descriptor::ServiceId;
pub use disposal::{Disposable, DisposalEntry, DisposalStack};
pub use lazy::LazySlot;
pub use lifetime::Lifetime;
pub use tokens::ServiceToken;
