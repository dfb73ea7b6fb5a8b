/// Background proactive token refresh
use crate::claims;
use crate::refresh::{RefreshCoordinator, RefreshTransport};
use crate::store::TokenStorage;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

struct Shutdown {
    stopped: Mutex<bool>,
    wake: Condvar,
}

struct Running {
    shutdown: Arc<Shutdown>,
    handle: JoinHandle<()>,
}

/// Recurring check that refreshes the access token before it expires,
/// independent of request traffic.
///
/// Owns its thread handle explicitly: `start` replaces any previously
/// running instance, so at most one tick loop is active per timer, and
/// `stop` (also run on drop) wakes and joins the thread promptly.
#[derive(Default)]
pub struct ProactiveRefreshTimer {
    inner: Mutex<Option<Running>>,
}

impl ProactiveRefreshTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start ticking. Any previously running instance is stopped first.
    ///
    /// On each tick: no stored token is a no-op; a token whose
    /// remaining lifetime is below `threshold_secs` triggers one
    /// refresh through the shared coordinator. A failed refresh stops
    /// the loop; recovery is left to the reactive 401 path rather than
    /// retrying a failing refresh on every tick.
    pub fn start<S, T>(
        &self,
        storage: Arc<S>,
        refresher: Arc<RefreshCoordinator<S, T>>,
        interval: Duration,
        threshold_secs: u64,
    ) where
        S: TokenStorage + 'static,
        T: RefreshTransport + 'static,
    {
        self.stop();

        let shutdown = Arc::new(Shutdown {
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });
        let thread_shutdown = shutdown.clone();

        let handle = std::thread::spawn(move || loop {
            {
                let mut stopped = thread_shutdown.stopped.lock();
                if *stopped {
                    break;
                }
                let wait = thread_shutdown.wake.wait_for(&mut stopped, interval);
                if *stopped {
                    break;
                }
                // Spurious wake: go back to waiting out the interval
                if !wait.timed_out() {
                    continue;
                }
            }

            let token = match storage.current_pair() {
                Some(pair) => pair.access_token,
                None => continue,
            };
            if !claims::is_expiring_soon(&token, threshold_secs) {
                continue;
            }

            tracing::debug!("access token expiring soon, refreshing proactively");
            if !refresher.refresh() {
                tracing::warn!("proactive refresh failed, stopping timer");
                break;
            }
        });

        *self.inner.lock() = Some(Running { shutdown, handle });
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lock()
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }

    /// Stop the tick loop and join its thread. Idempotent.
    pub fn stop(&self) {
        let running = self.inner.lock().take();
        if let Some(running) = running {
            *running.shutdown.stopped.lock() = true;
            running.shutdown.wake.notify_all();
            let _ = running.handle.join();
        }
    }
}

impl Drop for ProactiveRefreshTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
