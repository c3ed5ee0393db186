//! Countdown coordinator background task

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{interval_at, sleep, Instant},
};
use tracing::{debug, error, info};

use crate::{
    countdown::{CoordinatorHandle, CountdownCoordinator, Effect, Notice, Signal},
    services::{LockRetryPolicy, SessionLocker},
};

/// Timing of the countdown actor
#[derive(Debug, Clone)]
pub struct CountdownOptions {
    pub tick: Duration,
    /// How long a cancelled countdown stays visible before closing
    pub settle: Duration,
    pub lock_policy: LockRetryPolicy,
}

impl Default for CountdownOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            settle: Duration::from_millis(1500),
            lock_policy: LockRetryPolicy::default(),
        }
    }
}

/// Spawn the coordinator actor and return a handle to it
pub fn spawn_countdown(
    coordinator: CountdownCoordinator,
    locker: Arc<dyn SessionLocker>,
    options: CountdownOptions,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(coordinator.status());
    let (notice_tx, _) = broadcast::channel(64);

    let handle = CoordinatorHandle::new(tx.clone(), status_rx, notice_tx.clone());
    let task = tokio::spawn(countdown_task(CountdownTask {
        coordinator,
        rx,
        tx,
        locker,
        status_tx,
        notice_tx,
        options,
        ticker: None,
    }));
    (handle, task)
}

struct CountdownTask {
    coordinator: CountdownCoordinator,
    rx: mpsc::UnboundedReceiver<Signal>,
    /// Used by tickers and settle timers to feed signals back in
    tx: mpsc::UnboundedSender<Signal>,
    locker: Arc<dyn SessionLocker>,
    status_tx: watch::Sender<crate::state::CountdownStatus>,
    notice_tx: broadcast::Sender<Notice>,
    options: CountdownOptions,
    ticker: Option<JoinHandle<()>>,
}

/// Apply signals one at a time; the only writer of coordinator state
async fn countdown_task(mut task: CountdownTask) {
    info!("Starting countdown coordinator task");

    while let Some(signal) = task.rx.recv().await {
        if signal == Signal::Shutdown {
            break;
        }
        debug!("Countdown signal: {:?}", signal);

        for effect in task.coordinator.handle(signal) {
            task.execute(effect);
        }
        task.status_tx.send_replace(task.coordinator.status());
    }

    task.stop_ticker();
    info!("Countdown coordinator task stopped");
}

impl CountdownTask {
    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartTicker { session } => {
                self.stop_ticker();
                self.ticker = Some(spawn_ticker(self.tx.clone(), session, self.options.tick));
            }
            Effect::StopTicker => self.stop_ticker(),
            Effect::ScheduleSettle { session } => {
                let tx = self.tx.clone();
                let delay = self.options.settle;
                tokio::spawn(async move {
                    sleep(delay).await;
                    let _ = tx.send(Signal::Settled { session });
                });
            }
            Effect::Lock { session } => {
                // Never awaited here, a slow lock command must not stall the coordinator
                tokio::spawn(lock_session(
                    Arc::clone(&self.locker),
                    session,
                    self.options.lock_policy,
                    self.notice_tx.clone(),
                ));
            }
            Effect::Notify(notice) => {
                if self.notice_tx.send(notice).is_err() {
                    debug!("No notice subscribers");
                }
            }
        }
    }

    fn stop_ticker(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }
}

/// Send a tick for `session` every `period`, starting one period from now
fn spawn_ticker(tx: mpsc::UnboundedSender<Signal>, session: u64, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval_at(Instant::now() + period, period);
        loop {
            interval.tick().await;
            if tx.send(Signal::Tick { session }).is_err() {
                break;
            }
        }
    })
}

async fn lock_session(
    locker: Arc<dyn SessionLocker>,
    session: u64,
    policy: LockRetryPolicy,
    notices: broadcast::Sender<Notice>,
) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match locker.lock().await {
            Ok(()) => {
                info!("Session locked by countdown {}", session);
                return;
            }
            Err(e) => {
                error!("Lock attempt {} for countdown {} failed: {}", attempt, session, e);
                if attempt > policy.retries {
                    let _ = notices.send(Notice::LockFailed {
                        session,
                        error: e.to_string(),
                    });
                    return;
                }
                sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{countdown::Phase, error::LockError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLocker {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl SessionLocker for CountingLocker {
        async fn lock(&self) -> Result<(), LockError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(LockError::Failed { status: "exit status: 1".into(), stderr: "denied".into() })
            } else {
                Ok(())
            }
        }

        fn describe(&self) -> String {
            "counting".into()
        }
    }

    async fn settle_tasks() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_locks_once_and_returns_to_idle() {
        let locker = Arc::new(CountingLocker::default());
        let (handle, _task) =
            spawn_countdown(CountdownCoordinator::new(5, true), locker.clone(), CountdownOptions::default());

        handle.on_device_removed();
        settle_tasks().await;
        assert!(handle.is_session_active());
        assert_eq!(handle.status().phase, Phase::Armed);

        sleep(Duration::from_millis(4500)).await;
        settle_tasks().await;
        assert_eq!(handle.status().remaining(), Some(1));
        assert_eq!(locker.calls.load(Ordering::SeqCst), 0);

        sleep(Duration::from_secs(1)).await;
        settle_tasks().await;
        assert_eq!(locker.calls.load(Ordering::SeqCst), 1);
        assert!(!handle.is_session_active());

        sleep(Duration::from_secs(10)).await;
        settle_tasks().await;
        assert_eq!(locker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gesture_cancel_settles_without_locking() {
        let locker = Arc::new(CountingLocker::default());
        let (handle, _task) =
            spawn_countdown(CountdownCoordinator::new(3, true), locker.clone(), CountdownOptions::default());
        let mut notices = handle.subscribe_notices();

        handle.on_device_removed();
        sleep(Duration::from_millis(1200)).await;
        let now = std::time::Instant::now();
        handle.on_cancel_gesture(now);
        handle.on_cancel_gesture(now + Duration::from_millis(200));
        settle_tasks().await;
        assert_eq!(handle.status().phase, Phase::Cancelling);

        // A removal while settling must not arm a second countdown
        handle.on_device_removed();
        sleep(Duration::from_millis(1600)).await;
        settle_tasks().await;
        assert_eq!(handle.status().phase, Phase::Idle);

        sleep(Duration::from_secs(5)).await;
        settle_tasks().await;
        assert_eq!(locker.calls.load(Ordering::SeqCst), 0);

        let mut seen = Vec::new();
        while let Ok(notice) = notices.try_recv() {
            seen.push(notice);
        }
        assert!(seen.iter().any(|n| matches!(n, Notice::Cancelled { .. })));
        assert!(seen.iter().any(|n| matches!(n, Notice::Settled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lock_is_retried_per_policy() {
        let locker = Arc::new(CountingLocker { fail: true, ..Default::default() });
        let options = CountdownOptions {
            lock_policy: LockRetryPolicy { retries: 2, delay: Duration::from_millis(100) },
            ..CountdownOptions::default()
        };
        let (handle, _task) = spawn_countdown(CountdownCoordinator::new(1, true), locker.clone(), options);
        let mut notices = handle.subscribe_notices();

        handle.on_device_removed();
        sleep(Duration::from_secs(2)).await;
        settle_tasks().await;
        assert_eq!(locker.calls.load(Ordering::SeqCst), 3);

        let mut failed = false;
        while let Ok(notice) = notices.try_recv() {
            failed |= matches!(notice, Notice::LockFailed { .. });
        }
        assert!(failed);
        // A failed lock never blocks the next countdown
        assert!(!handle.is_session_active());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_producers_never_double_arm() {
        let locker = Arc::new(CountingLocker::default());
        let (handle, task) =
            spawn_countdown(CountdownCoordinator::new(2, true), locker.clone(), CountdownOptions::default());
        let mut notices = handle.subscribe_notices();

        let observer = tokio::spawn(async move {
            let mut open: Option<u64> = None;
            let mut armed = 0;
            loop {
                match notices.recv().await {
                    Ok(Notice::Armed { session, .. }) => {
                        assert!(open.is_none(), "countdown {} armed while {:?} active", session, open);
                        open = Some(session);
                        armed += 1;
                    }
                    Ok(Notice::Settled { session }) | Ok(Notice::Locking { session }) => {
                        assert_eq!(open, Some(session));
                        open = None;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => panic!("observer lagged"),
                    Err(broadcast::error::RecvError::Closed) => return armed,
                }
            }
        });

        let mut producers = Vec::new();
        for worker in 0..4u64 {
            let handle = handle.clone();
            producers.push(tokio::spawn(async move {
                for step in 0..50u64 {
                    match (worker + step) % 3 {
                        0 => handle.on_device_removed(),
                        1 => handle.on_device_inserted(),
                        _ => handle.on_cancel_gesture(std::time::Instant::now()),
                    }
                    sleep(Duration::from_millis(37 * (worker + 1))).await;
                }
            }));
        }

        for producer in producers {
            producer.await.unwrap();
        }
        handle.shutdown();
        task.await.unwrap();
        drop(handle);

        let armed = observer.await.unwrap();
        assert!(armed > 0);
    }
}
