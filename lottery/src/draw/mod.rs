//! Draw service: the PLANNED → ACTIVE → COMPLETED / CANCELLED state machine
//! and the events announcing its transitions.

mod event;
mod memory;
mod model;
mod repository;
mod service;

pub use event::{DrawEvent, DrawEventKind};
pub use memory::{DrawTables, InMemoryDrawRepository};
pub use model::{Draw, DrawResult, DrawStatus, NewDraw};
pub use repository::{DrawRepository, PgDrawRepository};
pub use service::{DrawError, DrawLifecycle};
