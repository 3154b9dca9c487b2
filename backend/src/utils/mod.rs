pub mod crypto;
pub mod error;
pub mod scheduled_executor;

pub use crypto::SecretBox;
pub use error::{ApiError, ApiResult};
pub use scheduled_executor::{ScheduledExecutor, ScheduledTask};
