use std::{
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use crate::{Error, Result};

/// Completion signal of a single [`Client::initialize()`](crate::Client::initialize) or
/// [`Client::update_user()`](crate::Client::update_user) call.
///
/// The handle resolves exactly once, after the resulting state change (new snapshot stored, or
/// the client left with whatever snapshot it had) is already visible to lookups. A failed fetch
/// resolves to `Err(...)` but the client is still usable: lookups fall back to the cached
/// snapshot or to defaults.
///
/// ```no_run
/// # use gatekit::{ClientConfig, InitOptions, User};
/// let client = ClientConfig::from_api_key("client-key").to_client();
/// let handle = client.initialize(User::with_user_id("user-123"), InitOptions::default())?;
/// if let Err(err) = handle.wait() {
///     eprintln!("using cached values, fetch failed: {err}");
/// }
/// # Ok::<(), gatekit::Error>(())
/// ```
#[derive(Clone)]
pub struct InitHandle {
    /// Holds `None` until the fetch completes.
    result: Arc<(Mutex<Option<Result<()>>>, Condvar)>,
}

impl InitHandle {
    pub(crate) fn new() -> InitHandle {
        InitHandle {
            result: Arc::new((Mutex::new(None), Condvar::new())),
        }
    }

    pub(crate) fn completed(result: Result<()>) -> InitHandle {
        let handle = InitHandle::new();
        handle.complete(result);
        handle
    }

    /// Resolve the handle. Only the first call has an effect.
    pub(crate) fn complete(&self, value: Result<()>) {
        let Ok(mut slot) = self.result.0.lock() else {
            return;
        };
        if slot.is_none() {
            *slot = Some(value);
            self.result.1.notify_all();
        }
    }

    /// Returns `true` if the fetch has completed (successfully or not).
    pub fn is_complete(&self) -> bool {
        self.result
            .0
            .lock()
            .map(|slot| slot.is_some())
            .unwrap_or(true)
    }

    /// Block until the fetch completes.
    ///
    /// # Errors
    ///
    /// Returns the error that caused the fetch to fail, or [`Error::WorkerPanicked`].
    pub fn wait(&self) -> Result<()> {
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::WorkerPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    lock = self
                        .result
                        .1
                        .wait(lock)
                        .map_err(|_| Error::WorkerPanicked)?;
                }
            }
        }
    }

    /// Block until the fetch completes or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Same as [`InitHandle::wait()`], plus [`Error::Timeout`] if the fetch has not completed in
    /// time. The fetch keeps running in the background after a timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut lock = self
            .result
            .0
            .lock()
            .map_err(|_| Error::WorkerPanicked)?;
        loop {
            if let Some(result) = &*lock {
                return result.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::Timeout);
            }
            lock = self
                .result
                .1
                .wait_timeout(lock, deadline - now)
                .map_err(|_| Error::WorkerPanicked)?
                .0;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::InitHandle;
    use crate::Error;

    #[test]
    fn resolves_once() {
        let handle = InitHandle::new();
        assert!(!handle.is_complete());

        handle.complete(Ok(()));
        handle.complete(Err(Error::Unauthorized));

        assert!(handle.is_complete());
        assert!(handle.wait().is_ok());
    }

    #[test]
    fn wakes_up_waiter_on_another_thread() {
        let handle = InitHandle::new();

        {
            let handle = handle.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                handle.complete(Err(Error::UnexpectedStatus(500)));
            });
        }

        assert!(matches!(handle.wait(), Err(Error::UnexpectedStatus(500))));
    }

    #[test]
    fn wait_timeout_expires() {
        let handle = InitHandle::new();

        assert!(matches!(
            handle.wait_timeout(Duration::from_millis(10)),
            Err(Error::Timeout)
        ));
    }
}
