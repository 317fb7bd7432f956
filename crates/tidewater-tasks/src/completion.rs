//! One-shot completion promise.
//!
//! A [`Completer`] is fulfilled at most once (it is consumed by
//! [`Completer::complete`]); any number of [`Completion`] readers observe
//! that single outcome. Dropping the completer unfulfilled resolves readers
//! with [`TaskError::Abandoned`].

use tokio::sync::watch;

use crate::error::{TaskError, TaskResult};

/// Create a linked writer/reader pair.
pub fn completion() -> (Completer, Completion) {
    let (tx, rx) = watch::channel(None);
    (Completer { tx }, Completion { rx })
}

/// The single writer.
#[derive(Debug)]
pub struct Completer {
    tx: watch::Sender<Option<TaskResult<()>>>,
}

impl Completer {
    pub fn complete(self, result: TaskResult<()>) {
        self.tx.send_replace(Some(result));
    }
}

/// A reader. Clones observe the same outcome.
#[derive(Debug, Clone)]
pub struct Completion {
    rx: watch::Receiver<Option<TaskResult<()>>>,
}

impl Completion {
    /// Wait for the outcome.
    pub async fn wait(&self) -> TaskResult<()> {
        let mut rx = self.rx.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(Err(TaskError::Abandoned)),
            Err(_) => Err(TaskError::Abandoned),
        }
    }

    /// The outcome, if already delivered.
    pub fn try_result(&self) -> Option<TaskResult<()>> {
        self.rx.borrow().clone()
    }

    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn all_readers_see_the_single_outcome() {
        let (completer, completion) = completion();
        let other = completion.clone();
        assert!(!completion.is_complete());

        let waiter = tokio::spawn(async move { other.wait().await });
        completer.complete(Err(TaskError::CollectionNotFound(3)));

        assert_eq!(waiter.await.unwrap(), Err(TaskError::CollectionNotFound(3)));
        assert_eq!(completion.wait().await, Err(TaskError::CollectionNotFound(3)));
        assert_eq!(completion.try_result(), Some(Err(TaskError::CollectionNotFound(3))));
    }

    #[tokio::test]
    async fn dropped_completer_abandons() {
        let (completer, completion) = completion();
        drop(completer);
        assert_eq!(completion.wait().await, Err(TaskError::Abandoned));
        assert_eq!(completion.try_result(), None);
    }
}
