//! Interaction event ingestor: session resolution, de-duplication,
//! scene watch summaries, and segment reconstruction (`SPEC_FULL.md`
//! §4.6).

pub mod ingest;
pub mod playback;
pub mod segments;
pub mod session;
pub mod store;

pub use ingest::{ingest_events, IngestResult, InboundEvent};
pub use session::find_or_create_session_id;
pub use store::InteractionStore;
