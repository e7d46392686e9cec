//! Inference on a dedicated thread.
//!
//! The pipeline lives on its own OS thread and is driven by envelopes over a
//! channel. A dispatcher task routes responses: replies with an id resolve
//! the matching pending request, replies without one update session state.

use super::messages::{
    Envelope, ErrorPayload, InferenceOutput, LoadRequest, ReadyPayload, Request, Response,
};
use super::pipeline::InferencePipeline;
use crate::error::{Error, Result};
use crate::frame::PixelFrame;
use crate::inference::{Classification, Detection};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Model session state as seen from the caller side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No load requested yet.
    Unloaded,
    /// A load is in progress.
    Loading,
    /// The model is ready.
    Ready(ReadyPayload),
    /// The last load failed.
    Failed(String),
    /// The worker has shut down.
    Closed,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

fn lock(pending: &Pending) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Response>>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client handle for a pipeline running on its own thread.
#[derive(Debug)]
pub struct WorkerContext {
    requests: Mutex<Option<mpsc::UnboundedSender<Envelope<Request>>>>,
    pending: Pending,
    next_id: AtomicU64,
    state: Arc<watch::Sender<SessionState>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    dispatcher: tokio::task::JoinHandle<()>,
}

impl WorkerContext {
    /// Move the pipeline onto a new thread. Must be called inside a Tokio runtime.
    pub fn spawn(mut pipeline: InferencePipeline, name: &str) -> Result<Self> {
        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Envelope<Request>>();
        let (response_tx, mut response_rx) = mpsc::unbounded_channel::<Envelope<Response>>();

        let thread = std::thread::Builder::new()
            .name(format!("wildcam-{name}"))
            .spawn(move || {
                while let Some(envelope) = request_rx.blocking_recv() {
                    let message = envelope.message;
                    let response = panic::catch_unwind(AssertUnwindSafe(|| {
                        pipeline.handle(message)
                    }))
                    .unwrap_or_else(|_| {
                        error!("Inference pipeline panicked");
                        Response::Error(ErrorPayload::from(&Error::Inference {
                            reason: "inference pipeline panicked".to_string(),
                        }))
                    });
                    let reply = Envelope {
                        message: response,
                        id: envelope.id,
                    };
                    if response_tx.send(reply).is_err() {
                        break;
                    }
                }
                // Refuse new requests before the dispatcher sees the end of
                // the response stream.
                drop(request_rx);
                drop(response_tx);
                debug!("Inference worker thread exiting");
            })?;

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (state_tx, _) = watch::channel(SessionState::Unloaded);
        let state = Arc::new(state_tx);

        let dispatcher = {
            let pending = Arc::clone(&pending);
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                while let Some(Envelope { message, id }) = response_rx.recv().await {
                    match (id, message) {
                        (Some(id), message) => {
                            let waiter = lock(&pending).remove(&id);
                            match waiter {
                                // Receiver gone means the caller stopped waiting.
                                Some(tx) => drop(tx.send(message)),
                                None => debug!("Dropping response for unknown request {id}"),
                            }
                        }
                        (None, Response::Ready(ready)) => {
                            info!(
                                "Model ready: input {}, {} label(s)",
                                ready.input_size,
                                ready.labels.len()
                            );
                            state.send_replace(SessionState::Ready(ready));
                        }
                        (None, Response::Error(err)) => {
                            error!("Model load failed: {}", err.message);
                            state.send_replace(SessionState::Failed(err.message));
                        }
                        (None, Response::Result(_)) => {
                            debug!("Dropping unsolicited result");
                        }
                    }
                }

                // The worker is gone: nothing left in `pending` can be answered.
                let abandoned = {
                    let mut pending = lock(&pending);
                    let count = pending.len();
                    pending.clear();
                    count
                };
                if abandoned > 0 {
                    warn!("Inference worker stopped with {abandoned} request(s) pending");
                }
                state.send_replace(SessionState::Closed);
            })
        };

        Ok(Self {
            requests: Mutex::new(Some(request_tx)),
            pending,
            next_id: AtomicU64::new(1),
            state,
            thread: Mutex::new(Some(thread)),
            dispatcher,
        })
    }

    fn send(&self, envelope: Envelope<Request>) -> Result<()> {
        let guard = self.requests.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(Error::WorkerClosed)?;
        sender.send(envelope).map_err(|_| Error::WorkerClosed)
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Whether the model is ready for inference.
    pub fn is_ready(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Ready(_))
    }

    /// Ask the worker to load the model and wait for `ready` or `error`.
    pub async fn load(&self, request: LoadRequest) -> Result<ReadyPayload> {
        let mut state = self.state.subscribe();
        self.state.send_replace(SessionState::Loading);
        self.send(Envelope::unsolicited(Request::Load(request)))?;

        let settled = state
            .wait_for(|s| !matches!(s, SessionState::Loading))
            .await
            .map_err(|_| Error::WorkerClosed)?
            .clone();
        match settled {
            SessionState::Ready(ready) => Ok(ready),
            SessionState::Failed(reason) => Err(Error::ModelLoad { reason }),
            _ => Err(Error::WorkerClosed),
        }
    }

    async fn request(&self, request: Request) -> Result<InferenceOutput> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        if let Err(e) = self.send(Envelope::with_id(request, id)) {
            lock(&self.pending).remove(&id);
            return Err(e);
        }

        match rx.await.map_err(|_| Error::WorkerClosed)? {
            Response::Result(output) => Ok(output),
            Response::Error(payload) => Err(payload.into()),
            Response::Ready(_) => Err(Error::Internal {
                message: format!("request {id} answered with ready"),
            }),
        }
    }

    /// Run detection on the worker. The frame moves to the worker thread.
    pub async fn detect(&self, frame: PixelFrame) -> Result<Vec<Detection>> {
        match self.request(Request::Detect(frame)).await? {
            InferenceOutput::Detections(d) => Ok(d),
            InferenceOutput::Classifications(c) if c.is_empty() => Ok(Vec::new()),
            InferenceOutput::Classifications(_) => Err(Error::Internal {
                message: "detect answered with classifications".to_string(),
            }),
        }
    }

    /// Run classification on the worker.
    pub async fn classify(&self, frame: PixelFrame) -> Result<Vec<Classification>> {
        match self.request(Request::Classify(frame)).await? {
            InferenceOutput::Classifications(c) => Ok(c),
            // An empty array decodes as the first untagged variant.
            InferenceOutput::Detections(d) if d.is_empty() => Ok(Vec::new()),
            InferenceOutput::Detections(_) => Err(Error::Internal {
                message: "classify answered with detections".to_string(),
            }),
        }
    }

    /// Number of requests still waiting for an answer.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Stop the worker thread and fail every pending request with
    /// [`Error::WorkerClosed`].
    pub fn shutdown(&self) {
        let sender = self
            .requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let dropped = {
            let mut pending = lock(&self.pending);
            let count = pending.len();
            pending.clear();
            count
        };
        if dropped > 0 {
            debug!("Abandoned {dropped} pending inference request(s)");
        }

        self.state.send_replace(SessionState::Closed);

        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            // A model run in progress finishes first; keep that off the
            // async worker threads.
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => drop(runtime.spawn_blocking(move || join_worker(thread))),
                Err(_) => join_worker(thread),
            }
        }
        self.dispatcher.abort();
    }
}

fn join_worker(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        warn!("Inference worker thread panicked");
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
