//! Per-side command buffer.
//!
//! A single-consumer FIFO of futures. Each broker side owns one; every
//! inbound message handler runs on it, so services bound to a side never
//! execute their handlers concurrently with themselves and need no
//! internal locking beyond state shared across sides.

use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Command = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub struct CommandBuffer {
    side: &'static str,
    tx: mpsc::UnboundedSender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CommandBuffer {
    pub fn new(side: &'static str, cancel: CancellationToken) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();

        let worker = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    command = rx.recv() => match command {
                        Some(command) => command.await,
                        None => break,
                    }
                }
            }
        });

        Self {
            side,
            tx,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Enqueue a command. Commands run strictly in push order.
    pub fn push(&self, command: impl Future<Output = ()> + Send + 'static) {
        if self.tx.send(Box::pin(command)).is_err() {
            debug!(side = self.side, "Command buffer stopped, command dropped");
        }
    }

    /// Wait for the consumer to wind down after cancellation.
    pub async fn stop(&self) {
        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn commands_run_in_push_order() {
        let buffer = CommandBuffer::new("test", CancellationToken::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let log = Arc::clone(&log);
            buffer.push(async move {
                // An early command yielding must not let later ones overtake
                tokio::time::sleep(Duration::from_millis(5 - i)).await;
                log.lock().unwrap().push(i);
            });
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn cancellation_stops_the_worker() {
        let cancel = CancellationToken::new();
        let buffer = CommandBuffer::new("test", cancel.clone());
        cancel.cancel();
        buffer.stop().await;
        // Pushing after shutdown must not panic
        buffer.push(async {});
    }
}
