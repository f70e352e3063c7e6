//! Tokio runtime ownership, shutdown signalling and the periodic watch loop.
use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cheap handle for spawning onto the runtime and observing shutdown.
#[derive(Clone)]
pub struct ProspectHandle {
    inner: Handle,
    cancel: CancellationToken,
}

pub struct ProspectRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl ProspectRuntime {
    /// Multi-threaded runtime with IO and timers enabled.
    ///
    /// ```
    /// use prospect_runtime::ProspectRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = ProspectRuntime::build("doctest-runtime", Some(1)).unwrap();
    /// assert_eq!(runtime.block_on(async { 2 + 2 }), 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }
        Ok(Self {
            runtime: builder.build()?,
            cancel: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> ProspectHandle {
        ProspectHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel outstanding work, then wait up to `graceful` for tasks to stop.
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl ProspectHandle {
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    /// Shared shutdown token; cancelling it stops the watch loop.
    ///
    /// ```
    /// use prospect_runtime::ProspectRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = ProspectRuntime::build("cancel-example", Some(1)).unwrap();
    /// let cancel = runtime.handle().cancellation();
    /// cancel.cancel();
    /// assert!(runtime.handle().cancellation().is_cancelled());
    /// runtime.shutdown(Duration::from_millis(5));
    /// ```
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the shared token on Ctrl-C.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        self.inner.spawn(async move {
            tokio::select! {
                res = tokio::signal::ctrl_c() => {
                    match res {
                        Ok(()) => tracing::info!(target: "runtime", "shutdown.signal"),
                        Err(e) => tracing::warn!(target: "runtime", error = %e, "shutdown.signal_unavailable"),
                    }
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        })
    }
}

/// Run `cycle` now and then every `period` until `cancel` fires. A failing
/// cycle is logged and the loop carries on. Returns the number of cycles
/// started.
///
/// ```
/// use prospect_runtime::run_every;
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let cancel = CancellationToken::new();
/// let stop = cancel.clone();
/// let cycles = run_every(Duration::from_millis(1), &cancel, move |n| {
///     if n == 2 {
///         stop.cancel();
///     }
///     async { Ok(()) }
/// })
/// .await;
/// assert_eq!(cycles, 3);
/// # });
/// ```
pub async fn run_every<F, Fut>(period: Duration, cancel: &CancellationToken, mut cycle: F) -> usize
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut n = 0usize;
    while !cancel.is_cancelled() {
        tracing::info!(target: "runtime.watch", cycle = n, "watch.cycle.start");
        let outcome = tokio::select! {
            res = cycle(n) => Some(res),
            _ = cancel.cancelled() => None,
        };
        n += 1;
        match outcome {
            Some(Ok(())) => {}
            Some(Err(e)) => tracing::warn!(target: "runtime.watch", cycle = n - 1, error = %e, "watch.cycle.failed"),
            None => break,
        }
        tracing::info!(target: "runtime.watch", next_in_secs = period.as_secs(), "watch.sleep");
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = cancel.cancelled() => break,
        }
    }
    tracing::info!(target: "runtime.watch", cycles = n, "watch.stopped");
    n
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn spawned_tasks_run_on_the_runtime() {
        let runtime = ProspectRuntime::build("spawn-test", Some(1)).unwrap();
        let task = runtime.handle().spawn(async { 21 * 2 });
        assert_eq!(runtime.block_on(async move { task.await.unwrap() }), 42);
        runtime.shutdown(Duration::from_millis(10));
    }

    #[tokio::test]
    async fn failed_cycles_do_not_stop_the_loop() {
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let stop = cancel.clone();
        let seen = calls.clone();
        let cycles = run_every(Duration::from_millis(1), &cancel, move |n| {
            seen.fetch_add(1, Ordering::SeqCst);
            if n == 2 {
                stop.cancel();
            }
            async move {
                if n == 0 {
                    anyhow::bail!("search backend down");
                }
                Ok(())
            }
        })
        .await;
        assert_eq!(cycles, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let cycles = run_every(Duration::from_millis(1), &cancel, |_| async { Ok(()) }).await;
        assert_eq!(cycles, 0);
    }

    #[tokio::test]
    async fn cancel_interrupts_the_sleep() {
        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stop.cancel();
        });
        let started = std::time::Instant::now();
        let cycles = run_every(Duration::from_secs(3600), &cancel, |_| async { Ok(()) }).await;
        assert_eq!(cycles, 1);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
