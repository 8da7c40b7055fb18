//! Generation sessions and the orchestrator that runs them.
//!
//! A session walks `Idle -> Requesting -> Merging -> Throttling -> Emitting`,
//! looping through the last three for every partial the backend sends, and
//! ends in `Done` or `Failed`. Partials are merged strictly in arrival order.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::{pin_mut, StreamExt};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::GenerationBackend;
use crate::error::{BackendError, EngineError};
use crate::merge::merge;
use crate::request::GenerationRequest;
use crate::schema::{ForcedFields, Generative, PartialOutput};
use crate::throttle::try_throttle;

/// Throttled records of one session. The last `Ok` item is the
/// authoritative result; an `Err` item ends the stream.
pub type RecordStream<R> = BoxStream<'static, Result<R, EngineError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Requesting,
    Merging,
    Throttling,
    Emitting,
    Done,
    Failed,
}

/// Per-session bookkeeping: the request, which fields it forced, and the
/// record as of the last merge.
#[derive(Debug)]
pub struct GenerationSession<R: Generative> {
    id: Uuid,
    state: SessionState,
    request: GenerationRequest,
    forced: ForcedFields,
    current: R,
}

impl<R: Generative> GenerationSession<R> {
    pub fn new(seed: R, context: &R::Context) -> Self {
        let request = GenerationRequest::build(&seed, context);
        let forced = request.forced_fields();
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            request,
            forced,
            current: seed,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> &GenerationRequest {
        &self.request
    }

    pub fn forced(&self) -> &ForcedFields {
        &self.forced
    }

    pub fn current(&self) -> &R {
        &self.current
    }

    fn transition(&mut self, next: SessionState) {
        debug!(session = %self.id, kind = R::KIND, from = ?self.state, to = ?next, "Session transition");
        self.state = next;
    }

    pub fn start(&mut self) {
        self.transition(SessionState::Requesting);
        debug!(
            session = %self.id,
            kind = R::KIND,
            forced = self.forced.len(),
            open = R::FIELDS.len().saturating_sub(self.forced.len()),
            "Generation session started"
        );
    }

    /// Merge the next partial and hand the result to the throttle.
    pub fn absorb(&mut self, partial: &PartialOutput) -> R {
        self.transition(SessionState::Merging);
        self.current = merge(&self.current, partial, &self.forced);
        self.transition(SessionState::Throttling);
        self.current.clone()
    }

    /// The throttle let the current record through to the caller.
    pub fn emit(&mut self) {
        self.transition(SessionState::Emitting);
    }

    pub fn finish(&mut self) {
        self.transition(SessionState::Done);
        debug!(session = %self.id, kind = R::KIND, "Generation session done");
    }

    pub fn fail(&mut self, error: &BackendError) {
        self.transition(SessionState::Failed);
        warn!(session = %self.id, kind = R::KIND, error = %error, "Generation session failed");
    }
}

/// Runs generation sessions for any [`Generative`] record kind.
#[derive(Clone)]
pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    update_frequency: Duration,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn GenerationBackend>, update_frequency: Duration) -> Self {
        Self {
            backend,
            update_frequency,
        }
    }

    pub fn update_frequency(&self) -> Duration {
        self.update_frequency
    }

    /// Generate (or continue generating) `seed`.
    ///
    /// Nothing happens until the returned stream is polled. Dropping it
    /// drops the backend stream and with it any open connection.
    pub fn run<R: Generative>(&self, seed: R, context: R::Context) -> RecordStream<R> {
        let session = GenerationSession::new(seed, &context);
        let program = R::program(&context);
        let backend = Arc::clone(&self.backend);
        let request = session.request().clone();

        info!(session = %session.id(), kind = R::KIND, "Queued generation session");

        // Merging happens ahead of the throttle and emitting behind it, so
        // both sides record their transitions on the same session.
        let session = Arc::new(Mutex::new(session));

        let merged = {
            let session = Arc::clone(&session);
            stream! {
                with_session(&*session, GenerationSession::start);
                let mut partials = backend.generate(program, request);

                while let Some(item) = partials.next().await {
                    match item {
                        Ok(partial) => yield Ok(with_session(&*session, |s| s.absorb(&partial))),
                        Err(err) => {
                            yield Err(err);
                            return;
                        }
                    }
                }
            }
        };
        let throttled = try_throttle(merged, self.update_frequency);

        stream! {
            pin_mut!(throttled);
            while let Some(item) = throttled.next().await {
                match item {
                    Ok(record) => {
                        with_session(&*session, GenerationSession::emit);
                        yield Ok(record);
                    }
                    Err(err) => {
                        with_session(&*session, |s| s.fail(&err));
                        yield Err(EngineError::from(err));
                        return;
                    }
                }
            }
            with_session(&*session, GenerationSession::finish);
        }
        .boxed()
    }
}

/// The lock is never held across an await, so a poisoned session is still
/// consistent.
fn with_session<R: Generative, T>(
    session: &Mutex<GenerationSession<R>>,
    f: impl FnOnce(&mut GenerationSession<R>) -> T,
) -> T {
    let mut guard = session.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}
