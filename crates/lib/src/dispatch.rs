//! Per-phone serialization of engine turns.
//!
//! Every phone gets a worker task fed by an unbounded queue; turns for one phone run
//! one at a time in arrival order while different phones proceed in parallel. A worker
//! that stays idle retires and removes its queue. Sends only happen while holding the
//! map lock, and a retiring worker re-checks its queue under that same lock, so no job
//! is ever left in a queue nobody drains.

use crate::dialogue::{Engine, EngineError, TurnReport};
use crate::validate::EligibleMessage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};

const DEFAULT_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("worker for {0} stopped before finishing the turn")]
    WorkerGone(String),
}

struct Job {
    msg: EligibleMessage,
    done: oneshot::Sender<Result<TurnReport, EngineError>>,
}

type Queues = Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Job>>>>;

/// Pending turn; await it with [`Ticket::wait`].
pub struct Ticket {
    phone: String,
    rx: oneshot::Receiver<Result<TurnReport, EngineError>>,
}

impl Ticket {
    pub async fn wait(self) -> Result<TurnReport, DispatchError> {
        match self.rx.await {
            Ok(result) => result.map_err(DispatchError::from),
            Err(_) => Err(DispatchError::WorkerGone(self.phone)),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    engine: Arc<Engine>,
    queues: Queues,
    idle: Duration,
}

impl Dispatcher {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_idle(engine, DEFAULT_IDLE)
    }

    /// Like [`Dispatcher::new`] with a custom worker idle timeout.
    pub fn with_idle(engine: Arc<Engine>, idle: Duration) -> Self {
        Self {
            engine,
            queues: Arc::new(Mutex::new(HashMap::new())),
            idle,
        }
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Phones with a live worker.
    pub async fn active_workers(&self) -> usize {
        self.queues.lock().await.len()
    }

    /// Enqueue a turn behind any pending turns for the same phone.
    pub async fn submit(&self, msg: EligibleMessage) -> Ticket {
        let phone = msg.phone.clone();
        let (done, rx) = oneshot::channel();
        let mut job = Job { msg, done };

        let mut queues = self.queues.lock().await;
        if let Some(tx) = queues.get(&phone) {
            match tx.send(job) {
                Ok(()) => return Ticket { phone, rx },
                Err(mpsc::error::SendError(returned)) => job = returned,
            }
        }
        let (tx, queue) = mpsc::unbounded_channel();
        // Fresh channel with a live receiver; this send cannot fail.
        let _ = tx.send(job);
        queues.insert(phone.clone(), tx);
        drop(queues);

        log::debug!("dispatch: worker started for {}", phone);
        tokio::spawn(run_worker(
            phone.clone(),
            queue,
            self.engine.clone(),
            self.queues.clone(),
            self.idle,
        ));
        Ticket { phone, rx }
    }

    /// Submit and wait for the turn to finish.
    pub async fn dispatch(&self, msg: EligibleMessage) -> Result<TurnReport, DispatchError> {
        self.submit(msg).await.wait().await
    }
}

async fn run_worker(
    phone: String,
    mut queue: mpsc::UnboundedReceiver<Job>,
    engine: Arc<Engine>,
    queues: Queues,
    idle: Duration,
) {
    loop {
        let job = match tokio::time::timeout(idle, queue.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                let mut map = queues.lock().await;
                match queue.try_recv() {
                    Ok(job) => job,
                    Err(_) => {
                        map.remove(&phone);
                        log::debug!("dispatch: worker for {} retired", phone);
                        break;
                    }
                }
            }
        };
        let result = engine.handle(&job.msg).await;
        if job.done.send(result).is_err() {
            log::debug!("dispatch: result for {} dropped by caller", job.msg.correlation_id);
        }
    }
}
