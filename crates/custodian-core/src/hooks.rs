use custodian_versions::DataVersion;
use custodian_workflow::ApprovalRequest;

/// Side-effect hooks invoked after the engine's state has changed.
///
/// Hooks run synchronously on the caller's thread after all locks are
/// released. They observe; they cannot veto. Every method defaults to a
/// no-op so implementors override only what they need.
pub trait ChangeHook: Send + Sync {
    fn on_approval_requested(&self, _request: &ApprovalRequest) {}

    /// The request reached a terminal state.
    fn on_approval_resolved(&self, _request: &ApprovalRequest) {}

    fn on_committed(&self, _version: &DataVersion) {}

    fn on_rollback(&self, _version: &DataVersion) {}

    fn on_escalated(&self, _request: &ApprovalRequest) {}
}

pub struct NoOpHook;

impl ChangeHook for NoOpHook {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    impl ChangeHook for Counting {
        fn on_committed(&self, _version: &DataVersion) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn hooks_are_object_safe() {
        let hooks: Vec<Box<dyn ChangeHook>> = vec![Box::new(NoOpHook), Box::new(Counting::default())];
        assert_eq!(hooks.len(), 2);
    }
}
