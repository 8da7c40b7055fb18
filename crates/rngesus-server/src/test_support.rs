//! Fixtures shared by the service and router tests.

use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use rngesus_engine::{
    BackendError, GenerationBackend, GenerationRequest, Orchestrator, PartialOutput, PartialStream,
    Program,
};
use rngesus_store::Database;

use crate::game::GameService;

/// Replays the same snapshots for every session it serves.
pub struct ScriptedBackend {
    snapshots: Vec<PartialOutput>,
}

impl GenerationBackend for ScriptedBackend {
    fn generate(&self, _program: Program, _request: GenerationRequest) -> PartialStream {
        Box::pin(stream::iter(self.snapshots.clone().into_iter().map(Ok)))
    }
}

pub fn snapshot(pairs: &[(&str, &str)]) -> PartialOutput {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn scripted_service(snapshots: Vec<PartialOutput>) -> GameService {
    let backend = Arc::new(ScriptedBackend { snapshots });
    let orchestrator = Orchestrator::new(backend, Duration::ZERO);
    GameService::new(Database::open_in_memory().unwrap(), orchestrator)
}

/// Fails every session before any partial arrives.
pub struct FailingBackend;

impl GenerationBackend for FailingBackend {
    fn generate(&self, _program: Program, _request: GenerationRequest) -> PartialStream {
        Box::pin(stream::iter([Err(BackendError::Api {
            status: 500,
            message: "upstream exploded".into(),
        })]))
    }
}

pub fn failing_service() -> GameService {
    let orchestrator = Orchestrator::new(Arc::new(FailingBackend), Duration::ZERO);
    GameService::new(Database::open_in_memory().unwrap(), orchestrator)
}
