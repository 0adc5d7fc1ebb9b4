use std::cell::RefCell;
use std::marker::PhantomData;

use crate::container::descriptor::ServiceId;
use crate::errors::CoreError;

thread_local! {
    static RESOLUTION_CHAIN: RefCell<Vec<ServiceId>> = const { RefCell::new(Vec::new()) };
}

/// Marks a service as being resolved on the current thread.
///
/// Entering a service that is already on the chain means a factory asked, directly
/// or through its dependencies, for the service it is building. The chain is popped
/// when the guard drops, including on early return and unwinding.
pub(crate) struct ResolutionGuard {
    // The chain is thread-local, so the guard must be dropped on the thread that made it.
    _not_send: PhantomData<*const ()>,
}

impl ResolutionGuard {
    pub(crate) fn enter(service_id: &ServiceId) -> Result<Self, CoreError> {
        RESOLUTION_CHAIN.with(|chain| {
            let mut chain = chain.borrow_mut();

            if let Some(start) = chain.iter().position(|entry| entry == service_id) {
                let path = chain[start..]
                    .iter()
                    .chain(std::iter::once(service_id))
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" -> ");

                return Err(CoreError::CyclicDependency {
                    path,
                    cycle_service: service_id.to_string(),
                });
            }

            chain.push(service_id.clone());
            Ok(Self {
                _not_send: PhantomData,
            })
        })
    }

    /// Number of services currently being resolved on this thread
    #[cfg(test)]
    pub(crate) fn depth() -> usize {
        RESOLUTION_CHAIN.with(|chain| chain.borrow().len())
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLUTION_CHAIN.with(|chain| {
            chain.borrow_mut().pop();
        });
    }
}
