use std::future::Future;

use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    task::JoinHandle,
};

/// A collaborator call running on the runtime whose result is picked up by a later tick.
/// Dropping it aborts the call.
pub(crate) struct PendingOp<T> {
    result: oneshot::Receiver<T>,
    task: JoinHandle<()>,
}

pub(crate) enum OpPoll<T> {
    Pending,
    Done(T),
    /// The task ended without producing a value (panicked or aborted).
    Lost,
}

impl<T: Send + 'static> PendingOp<T> {
    pub(crate) fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, result) = oneshot::channel();
        let task = tokio::spawn(async move {
            let _ = tx.send(future.await);
        });
        Self { result, task }
    }

    pub(crate) fn poll(&mut self) -> OpPoll<T> {
        match self.result.try_recv() {
            Ok(value) => OpPoll::Done(value),
            Err(TryRecvError::Empty) => OpPoll::Pending,
            Err(TryRecvError::Closed) => OpPoll::Lost,
        }
    }
}

impl<T> Drop for PendingOp<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn result_is_observed_after_task_runs() {
        let mut op = PendingOp::spawn(async { 7 });
        assert!(matches!(op.poll(), OpPoll::Pending));

        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(matches!(op.poll(), OpPoll::Done(7)));
    }

    #[tokio::test]
    async fn dropping_aborts_in_flight_call() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let op = PendingOp::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        });
        drop(op);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_call_is_reported_lost() {
        let blow_up = true;
        let mut op = PendingOp::spawn(async move {
            if blow_up {
                panic!("collaborator blew up");
            }
            0u32
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(matches!(op.poll(), OpPoll::Lost));
    }
}
