//! Lock countdown: session bookkeeping, cancel gesture and the coordinator

pub mod coordinator;
pub mod gesture;
pub mod handle;
pub mod notice;
pub mod session;

pub use coordinator::{CountdownCoordinator, Effect, Phase, Signal};
pub use gesture::{CancelGesture, CANCEL_WINDOW};
pub use handle::CoordinatorHandle;
pub use notice::{CancelReason, Notice};
pub use session::{clamp_countdown, CountdownSession, MAX_COUNTDOWN_SECONDS, MIN_COUNTDOWN_SECONDS};
