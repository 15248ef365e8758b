//! GcLoop - 使われなくなったキャッシュエントリの回収
//!
//! # フロー
//! 1. `every` ごとに `QueryCache::collect_garbage()` を呼ぶ
//! 2. 購読中・fetch 中のエントリは残る（判定は cache 側）
//! 3. shutdown が来たら抜ける

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::cache::QueryCache;

/// Handle to the background collector.
/// - `request_shutdown()` で止まる（sender を drop しても止まる）
pub struct GcLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl GcLoop {
    pub fn spawn(cache: QueryCache, every: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            gc_loop(cache, every, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn gc_loop(cache: QueryCache, every: Duration, shutdown_rx: &mut watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    // 最初の tick は即時に返るので読み捨てる
    ticker.tick().await;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let collected = cache.collect_garbage();
                if collected > 0 {
                    tracing::debug!(collected, "GC pass");
                }
            }
        }
    }
    tracing::debug!("GC loop stopped");
}
