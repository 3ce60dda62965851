//! Long-term memory collaborator, specified at its interface only.
//!
//! The orchestrator writes each interaction into the external memory
//! store best-effort (failures are logged and swallowed) and reads
//! persona hints from it during sequential enrichment. The store itself
//! lives outside this subsystem; `NoopMemory` is the default wiring.

use futures::future::BoxFuture;

use crate::Result;

/// One interaction handed to the memory store after a request completes.
#[derive(Debug, Clone)]
pub struct InteractionRecord {
    pub run_id: String,
    pub ts: String,
    pub text: String,
    pub participants: Vec<String>,
    pub tier: String,
}

/// External long-term memory collaborator.
pub trait MemoryStore: Send + Sync {
    /// Persist one interaction. Best-effort: the orchestrator never
    /// surfaces a failure here to its caller.
    fn ingest(&self, record: InteractionRecord) -> BoxFuture<'_, Result<()>>;

    /// Persona hints for the given participants, used during the
    /// sequential enrichment step of the merge.
    fn persona_hints(&self, participants: &[String]) -> BoxFuture<'_, Result<Vec<String>>>;
}

/// Default store: remembers nothing, hints nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMemory;

impl MemoryStore for NoopMemory {
    fn ingest(&self, _record: InteractionRecord) -> BoxFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn persona_hints(&self, _participants: &[String]) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
