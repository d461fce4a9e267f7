/*!
 * Hot-swappable component handles.
 *
 * Each subtype has a reconfigurable wrapper that implements the subtype's
 * contract by forwarding to the instance it currently holds. The instance
 * lives in a `ReconfigurableCell`: every forwarded call holds the cell's
 * shared lock until the call returns, and `reconfigure` takes the exclusive
 * lock to swap in a new instance. A call therefore always runs against one
 * instance from start to finish, and a swap never starts while calls are in
 * flight.
 */
use std::any::Any;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, error};

use robokit_core::context::Context;

use crate::error::{ComponentError, Result};

/// Behaviour shared by every component contract
#[async_trait]
pub trait Component: Send + Sync + Debug {
    /// Release the component's resources
    ///
    /// Called once on the old instance after a reconfiguration replaced it.
    async fn close(&self, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

/// A handle whose underlying instance can be replaced at runtime
#[async_trait]
pub trait Reconfigurable: Any + Send + Sync {
    /// Take over the instance held by `new`
    ///
    /// `new` must be the same wrapper type as `self`; anything else fails with
    /// `TypeMismatch` and leaves `self` untouched.
    async fn reconfigure(&self, ctx: &Context, new: &dyn Reconfigurable) -> Result<()>;

    /// Upcast for downcasting to the concrete wrapper
    fn as_any(&self) -> &dyn Any;

    /// Name of the concrete wrapper type, for error messages
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Downcast `new` to the wrapper type `W`, or fail with `TypeMismatch`
pub fn expect_same<'a, W: Reconfigurable>(new: &'a dyn Reconfigurable) -> Result<&'a W> {
    new.as_any()
        .downcast_ref::<W>()
        .ok_or_else(|| ComponentError::TypeMismatch {
            expected: std::any::type_name::<W>().to_string(),
            actual: new.type_name().to_string(),
        })
}

/// Guarded owner of a component instance
#[derive(Debug)]
pub struct ReconfigurableCell<T: ?Sized> {
    actual: RwLock<Arc<T>>,
}

impl<T: ?Sized + Component> ReconfigurableCell<T> {
    /// Create a cell holding `actual`
    pub fn new(actual: Arc<T>) -> Self {
        Self {
            actual: RwLock::new(actual),
        }
    }

    /// Shared access to the current instance
    ///
    /// Keep the guard for the whole call; reconfiguration waits until it is
    /// dropped.
    pub async fn read(&self) -> RwLockReadGuard<'_, Arc<T>> {
        self.actual.read().await
    }

    /// The instance currently held
    pub async fn current(&self) -> Arc<T> {
        Arc::clone(&*self.actual.read().await)
    }

    /// Swap in the instance held by `other`, then close the previous one
    ///
    /// Waiting for the exclusive lock honours `ctx`; once the swap happened
    /// it is never rolled back, and a failure to close the previous instance
    /// is only logged.
    pub async fn replace_with(&self, ctx: &Context, other: &Self) -> Result<()> {
        if std::ptr::eq(self, other) {
            return Ok(());
        }

        let next = other.current().await;
        let previous = ctx
            .run(async {
                let mut actual = self.actual.write().await;
                if Arc::ptr_eq(&*actual, &next) {
                    return Ok::<_, ComponentError>(None);
                }
                Ok(Some(std::mem::replace(&mut *actual, next)))
            })
            .await?;

        let Some(previous) = previous else {
            debug!("Reconfigure kept the same instance");
            return Ok(());
        };

        // The exclusive section is over; nobody can reach `previous` through
        // this cell anymore.
        if let Err(err) = previous.close(ctx).await {
            error!(error = %err, "error closing old");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[async_trait]
    trait Counter: Component {
        async fn count(&self, ctx: &Context) -> Result<usize>;
    }

    #[derive(Debug, Default)]
    struct Fixed {
        value: usize,
        closed: AtomicUsize,
        fail_close: bool,
    }

    #[async_trait]
    impl Component for Fixed {
        async fn close(&self, _ctx: &Context) -> Result<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(ComponentError::domain("close failed"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Counter for Fixed {
        async fn count(&self, _ctx: &Context) -> Result<usize> {
            Ok(self.value)
        }
    }

    fn fixed(value: usize) -> Arc<Fixed> {
        Arc::new(Fixed {
            value,
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_replace_swaps_and_closes_previous() {
        let old = fixed(1);
        let cell: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(old.clone());
        let other: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(fixed(2));

        let ctx = Context::background();
        cell.replace_with(&ctx, &other).await.unwrap();

        assert_eq!(cell.read().await.count(&ctx).await.unwrap(), 2);
        assert_eq!(old.closed.load(Ordering::SeqCst), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_close_failure_is_absorbed() {
        let old = Arc::new(Fixed {
            value: 1,
            fail_close: true,
            ..Default::default()
        });
        let cell: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(old.clone());
        let other: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(fixed(2));

        let ctx = Context::background();
        cell.replace_with(&ctx, &other).await.unwrap();
        assert_eq!(cell.current().await.count(&ctx).await.unwrap(), 2);
        assert_eq!(old.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_replace_with_self_is_noop() {
        let old = fixed(1);
        let cell: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(old.clone());
        cell.replace_with(&Context::background(), &cell).await.unwrap();
        assert_eq!(old.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replace_with_same_instance_does_not_close() {
        let shared = fixed(1);
        let cell: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(shared.clone());
        let other: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(shared.clone());
        cell.replace_with(&Context::background(), &other).await.unwrap();
        assert_eq!(shared.closed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_replace_waits_for_reader_and_honours_cancellation() {
        let cell: Arc<ReconfigurableCell<dyn Counter>> =
            Arc::new(ReconfigurableCell::new(fixed(1)));
        let other: ReconfigurableCell<dyn Counter> = ReconfigurableCell::new(fixed(2));

        let guard = cell.read().await;
        let ctx = Context::background().with_timeout(Duration::from_millis(30));
        let err = cell.replace_with(&ctx, &other).await.unwrap_err();
        assert!(matches!(err, ComponentError::DeadlineExceeded));
        drop(guard);

        let ctx = Context::background();
        assert_eq!(cell.current().await.count(&ctx).await.unwrap(), 1);
        cell.replace_with(&ctx, &other).await.unwrap();
        assert_eq!(cell.current().await.count(&ctx).await.unwrap(), 2);
    }
}
