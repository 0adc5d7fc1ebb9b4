use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::config::FailurePolicy;
use crate::errors::CoreError;

#[derive(Debug, Default)]
struct SlotState {
    poisoned: Option<String>,
}

/// Thread-safe holder that runs its initializer at most once.
///
/// Readers take the lock-free path through the published cell once a value
/// exists. Until then callers serialize on the slot mutex, so a caller arriving
/// during an in-flight initialization waits for it instead of racing a second
/// factory call.
#[derive(Debug)]
pub struct LazySlot<T> {
    label: String,
    value: OnceLock<T>,
    lock: Mutex<SlotState>,
}

impl<T: Clone> LazySlot<T> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: OnceLock::new(),
            lock: Mutex::new(SlotState::default()),
        }
    }

    /// The published value, if initialization already succeeded
    pub fn get(&self) -> Option<&T> {
        self.value.get()
    }

    pub fn is_initialized(&self) -> bool {
        self.value.get().is_some()
    }

    pub fn is_poisoned(&self) -> bool {
        self.lock.lock().poisoned.is_some()
    }

    /// Return the cached value or run `init` to produce it.
    ///
    /// A failed `init` leaves the slot empty under [`FailurePolicy::Retry`]; under
    /// [`FailurePolicy::Poison`] the failure is recorded and later calls fail with
    /// `PoisonedService` without running `init`.
    pub fn get_or_try_init<F>(&self, policy: FailurePolicy, init: F) -> Result<T, CoreError>
    where
        F: FnOnce() -> Result<T, CoreError>,
    {
        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        let mut state = self.lock.lock();

        if let Some(value) = self.value.get() {
            return Ok(value.clone());
        }

        if let Some(message) = &state.poisoned {
            return Err(CoreError::PoisonedService {
                service: self.label.clone(),
                message: message.clone(),
            });
        }

        match init() {
            Ok(created) => Ok(self.value.get_or_init(|| created).clone()),
            Err(error) => {
                if policy == FailurePolicy::Poison {
                    tracing::warn!(service = %self.label, error = %error, "poisoning slot");
                    state.poisoned = Some(error.to_string());
                }
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn test_initializes_once() {
        let slot = LazySlot::new("counter");
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = slot
                .get_or_try_init(FailurePolicy::Retry, || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(Arc::new(7))
                })
                .unwrap();
            assert_eq!(*value, 7);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_initialized());
    }

    #[test]
    fn test_retry_policy_runs_factory_again() {
        let slot: LazySlot<Arc<u32>> = LazySlot::new("flaky");
        let calls = AtomicUsize::new(0);

        let first = slot.get_or_try_init(FailurePolicy::Retry, || {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::configuration("not yet"))
        });
        assert!(first.is_err());
        assert!(!slot.is_initialized());
        assert!(!slot.is_poisoned());

        let second = slot
            .get_or_try_init(FailurePolicy::Retry, || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(1))
            })
            .unwrap();
        assert_eq!(*second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_poison_policy_never_retries() {
        let slot: LazySlot<Arc<u32>> = LazySlot::new("broken");

        let first = slot.get_or_try_init(FailurePolicy::Poison, || {
            Err(CoreError::configuration("bad setup"))
        });
        assert!(first.unwrap_err().is_configuration());
        assert!(slot.is_poisoned());

        let second = slot.get_or_try_init(FailurePolicy::Poison, || {
            panic!("factory must not run on a poisoned slot")
        });
        match second.unwrap_err() {
            CoreError::PoisonedService { service, message } => {
                assert_eq!(service, "broken");
                assert!(message.contains("bad setup"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_callers_share_one_initialization() {
        const THREADS: usize = 16;
        let slot = LazySlot::new("shared");
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        let results: Vec<Arc<usize>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        slot.get_or_try_init(FailurePolicy::Retry, || {
                            let n = calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            Ok(Arc::new(n))
                        })
                        .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }
}
