use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::DisposalPolicy;
use crate::container::descriptor::ServiceId;
use crate::errors::CoreError;

/// Trait for services that own resources needing deterministic release
pub trait Disposable: Send + Sync {
    /// Release the resources held by the service
    fn dispose(&self) -> Result<(), CoreError>;
}

/// A disposable handle together with the binding that produced it
pub struct DisposalEntry {
    pub service_id: ServiceId,
    handle: Arc<dyn Disposable>,
}

impl std::fmt::Debug for DisposalEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisposalEntry")
            .field("service_id", &self.service_id)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct StackState {
    entries: Vec<DisposalEntry>,
    drained: bool,
}

/// LIFO record of the disposables a container acquired.
///
/// Pushes and the drain serialize on one mutex. Release routines run after the
/// entries have been taken out, so a slow `dispose` never blocks a push.
pub struct DisposalStack {
    owner: String,
    state: Mutex<StackState>,
}

impl std::fmt::Debug for DisposalStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DisposalStack")
            .field("owner", &self.owner)
            .field("pending", &state.entries.len())
            .field("drained", &state.drained)
            .finish()
    }
}

impl DisposalStack {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            state: Mutex::new(StackState::default()),
        }
    }

    /// Record a handle to release on teardown
    pub fn push(&self, service_id: ServiceId, handle: Arc<dyn Disposable>) -> Result<(), CoreError> {
        let mut state = self.state.lock();
        if state.drained {
            return Err(CoreError::container_disposed(&self.owner));
        }

        tracing::trace!(owner = %self.owner, service = %service_id, "registered disposable");
        state.entries.push(DisposalEntry { service_id, handle });
        Ok(())
    }

    /// Number of handles waiting to be released
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_drained(&self) -> bool {
        self.state.lock().drained
    }

    /// Release every handle in reverse push order.
    ///
    /// Runs once; later calls return `Ok(())` without doing anything.
    pub fn drain_all(&self, policy: DisposalPolicy) -> Result<(), CoreError> {
        let mut entries = {
            let mut state = self.state.lock();
            if state.drained {
                return Ok(());
            }
            state.drained = true;
            std::mem::take(&mut state.entries)
        };

        tracing::debug!(owner = %self.owner, count = entries.len(), "draining disposal stack");

        let mut failures = 0;
        let mut first_failure: Option<(ServiceId, CoreError)> = None;

        while let Some(entry) = entries.pop() {
            let Err(error) = entry.handle.dispose() else {
                tracing::trace!(owner = %self.owner, service = %entry.service_id, "disposed");
                continue;
            };

            failures += 1;
            tracing::warn!(
                owner = %self.owner,
                service = %entry.service_id,
                error = %error,
                "disposal failed"
            );

            match policy {
                DisposalPolicy::StopOnFirstFailure => {
                    let remaining = entries.len();
                    if remaining > 0 {
                        tracing::warn!(
                            owner = %self.owner,
                            remaining,
                            "abandoning remaining disposables after failure"
                        );
                    }
                    return Err(CoreError::DisposalFailed {
                        service: entry.service_id.to_string(),
                        remaining,
                        failures,
                        source: Box::new(error),
                    });
                }
                DisposalPolicy::Continue => {
                    if first_failure.is_none() {
                        first_failure = Some((entry.service_id, error));
                    }
                }
            }
        }

        match first_failure {
            Some((service_id, error)) => Err(CoreError::DisposalFailed {
                service: service_id.to_string(),
                remaining: 0,
                failures,
                source: Box::new(error),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    struct Recorder {
        label: &'static str,
        log: Arc<PlMutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Disposable for Recorder {
        fn dispose(&self) -> Result<(), CoreError> {
            self.log.lock().push(self.label);
            if self.fail {
                Err(CoreError::disposal(format!("{} refused", self.label)))
            } else {
                Ok(())
            }
        }
    }

    fn push(stack: &DisposalStack, log: &Arc<PlMutex<Vec<&'static str>>>, label: &'static str, fail: bool) {
        let handle = Arc::new(Recorder {
            label,
            log: log.clone(),
            fail,
        });
        stack.push(ServiceId::named::<Recorder>(label), handle).unwrap();
    }

    #[test]
    fn test_drains_in_reverse_order_once() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let stack = DisposalStack::new("test");
        push(&stack, &log, "first", false);
        push(&stack, &log, "second", false);
        push(&stack, &log, "third", false);
        assert_eq!(stack.len(), 3);

        stack.drain_all(DisposalPolicy::StopOnFirstFailure).unwrap();
        stack.drain_all(DisposalPolicy::StopOnFirstFailure).unwrap();

        assert_eq!(*log.lock(), vec!["third", "second", "first"]);
        assert!(stack.is_drained());
        assert!(stack.is_empty());
    }

    #[test]
    fn test_push_after_drain_is_rejected() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let stack = DisposalStack::new("test");
        stack.drain_all(DisposalPolicy::StopOnFirstFailure).unwrap();

        let handle = Arc::new(Recorder {
            label: "late",
            log: log.clone(),
            fail: false,
        });
        let err = stack.push(ServiceId::of::<Recorder>(), handle).unwrap_err();
        assert!(err.is_disposed());
        assert!(log.lock().is_empty());
    }

    #[test]
    fn test_stop_policy_leaves_lower_entries_undisposed() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let stack = DisposalStack::new("test");
        push(&stack, &log, "bottom", false);
        push(&stack, &log, "broken", true);
        push(&stack, &log, "top", false);

        let err = stack.drain_all(DisposalPolicy::StopOnFirstFailure).unwrap_err();
        match err {
            CoreError::DisposalFailed {
                service,
                remaining,
                failures,
                ..
            } => {
                assert!(service.contains("broken"));
                assert_eq!(remaining, 1);
                assert_eq!(failures, 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*log.lock(), vec!["top", "broken"]);

        // Drained exactly once: the abandoned entry is never retried.
        stack.drain_all(DisposalPolicy::StopOnFirstFailure).unwrap();
        assert_eq!(log.lock().len(), 2);
    }

    #[test]
    fn test_continue_policy_releases_everything() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let stack = DisposalStack::new("test");
        push(&stack, &log, "a", true);
        push(&stack, &log, "b", false);
        push(&stack, &log, "c", true);

        let err = stack.drain_all(DisposalPolicy::Continue).unwrap_err();
        match err {
            CoreError::DisposalFailed {
                service,
                remaining,
                failures,
                ..
            } => {
                assert!(service.contains('c'));
                assert_eq!(remaining, 0);
                assert_eq!(failures, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*log.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_concurrent_pushes() {
        let log = Arc::new(PlMutex::new(Vec::new()));
        let stack = DisposalStack::new("test");

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        push(&stack, &log, "item", false);
                    }
                });
            }
        });

        assert_eq!(stack.len(), 200);
        stack.drain_all(DisposalPolicy::StopOnFirstFailure).unwrap();
        assert_eq!(log.lock().len(), 200);
    }
}
