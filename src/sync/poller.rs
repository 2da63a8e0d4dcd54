//! ガードの寿命に縛られた繰り返しタイマー。

use std::{future::Future, time::Duration};
use tokio::{
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// dropされるまで `period` ごとに `tick` を実行する。
///
/// 初回は開始から1周期後。各tickは個別にspawnするので、停止しても
/// 始まったtickは取り消さず、新しいtickが出なくなるだけ。
#[derive(Debug)]
pub struct PollGuard {
    handle: JoinHandle<()>,
}

impl PollGuard {
    pub fn start<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tokio::spawn(tick());
            }
        });
        Self { handle }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    fn counter_guard(period: Duration) -> (PollGuard, Arc<AtomicUsize>) {
        let n = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&n);
        let guard = PollGuard::start(period, move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });
        (guard, n)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period() {
        let (guard, n) = counter_guard(Duration::from_secs(5));
        settle().await;
        assert_eq!(n.load(Ordering::SeqCst), 0);
        time::sleep(Duration::from_millis(5_001)).await;
        settle().await;
        assert_eq!(n.load(Ordering::SeqCst), 1);
        time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(n.load(Ordering::SeqCst), 3);
        assert!(!guard.handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_guard_stops_ticks() {
        let (guard, n) = counter_guard(Duration::from_secs(1));
        time::sleep(Duration::from_millis(1_500)).await;
        settle().await;
        assert_eq!(n.load(Ordering::SeqCst), 1);
        guard.stop();
        time::sleep(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(n.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_owner_unwinds() {
        let n = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&n);
        let owner = tokio::spawn(async move {
            let _guard = PollGuard::start(Duration::from_secs(1), move || {
                let c = Arc::clone(&c);
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                }
            });
            panic!("view crashed");
        });
        assert!(owner.await.is_err());
        time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(n.load(Ordering::SeqCst), 0);
    }
}
