pub mod readiness;
pub mod relay;
pub mod session;
pub mod shutdown;

pub use readiness::{Readiness, ReadinessError, ReadinessSignal};
pub use relay::{FrameRelay, LoopExit, RelayReport, RelayState, RelayStats};
pub use session::run_session;
pub use shutdown::shutdown_signal;
