//! Change hooks and their isolated dispatch.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Result;
use crate::observability::metrics;

/// Callback fired with the new raw value of a changed key.
pub type Hook = Arc<dyn Fn(&[u8]) -> Result<()> + Send + Sync>;

/// Wrap a closure as a [`Hook`].
pub fn hook<F>(f: F) -> Hook
where
    F: Fn(&[u8]) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Invoke every hook with `value`. A failing or panicking hook is logged and
/// the remaining hooks still run.
pub(crate) fn dispatch(hooks: &[Hook], value: &[u8], key: &str, driver: &'static str) {
    for hook in hooks {
        match panic::catch_unwind(AssertUnwindSafe(|| hook(value))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(driver, key, error = %e, "Key hook failed");
                metrics::record_hook_failure(driver);
            }
            Err(payload) => {
                tracing::error!(driver, key, panic = %panic_message(&payload), "Key hook panicked");
                metrics::record_hook_failure(driver);
            }
        }
    }
}

pub(crate) fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_failures_do_not_block_other_hooks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        let c2 = calls.clone();

        let hooks = vec![
            hook(|_| Err(ConfigError::Hook("rejected".into()))),
            hook(|_| panic!("boom")),
            hook(move |v| {
                assert_eq!(v, b"new");
                c1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            hook(move |_| {
                c2.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        dispatch(&hooks, b"new", "k", "test");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
