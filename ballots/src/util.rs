use std::future::Future;

use tokio::{
    sync::oneshot::{self, error::TryRecvError, Receiver, Sender},
    task::{JoinError, JoinHandle},
};
use tracing::{error, warn};

/// Check whether a message has been sent on the destructor channel.
///
/// A dropped sender counts as a destruct signal: nobody is left to ask the
/// task to keep going.
pub fn should_destruct(rx: &mut Receiver<()>) -> bool {
    match rx.try_recv() {
        Err(TryRecvError::Empty) => false,
        Ok(()) => {
            warn!("Received destruct signal");
            true
        }
        Err(e) => {
            error!("Failed to receive destruct signal: {}", e);
            true
        }
    }
}

/// Sends the destructor signal when dropped, unless it was sent already.
#[derive(Debug)]
struct Destructor(Option<Sender<()>>);

impl Destructor {
    fn send(&mut self) {
        if let Some(tx) = self.0.take() {
            // the task may well have finished on its own
            let _ = tx.send(());
        }
    }
}

impl Drop for Destructor {
    fn drop(&mut self) {
        self.send();
    }
}

/// A task running in the background until it is asked to stop.
///
/// Upon dropping a [TaskContext], the destructor signal is sent, so a
/// forgotten context never leaves its task running.
#[derive(Debug)]
pub struct TaskContext<T> {
    name: &'static str,
    destructor: Destructor,
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> TaskContext<T> {
    /// Spawn `task`, handing it the receiving end of its destructor
    /// channel.
    pub fn spawn<F, Fut>(name: &'static str, task: F) -> Self
    where
        F: FnOnce(Receiver<()>) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        Self {
            name,
            destructor: Destructor(Some(tx)),
            handle: tokio::spawn(task(rx)),
        }
    }
}

impl<T> TaskContext<T> {
    /// Ask the task to stop. Calling this more than once is harmless.
    pub fn destruct(&mut self) {
        self.destructor.send();
    }

    /// Wait for the task to finish, whether or not it was asked to.
    pub async fn finished(self) -> Result<T, JoinError> {
        let result = self.handle.await;
        if let Err(e) = &result {
            error!(task = self.name, "Task failed: {}", e);
        }
        result
    }
}
