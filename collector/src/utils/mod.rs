pub mod error;
pub mod logging;
pub mod scheduled_executor;

pub use error::{TracerError, TracerResult};
pub use logging::{LoggingGuard, init_logging};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
