pub mod scheduler;
pub mod session;

pub use scheduler::{Completion, RequestTicket, SyncScheduler, SyncState};
pub use session::{CameraStatus, Session, SessionReport, SessionSettings};
