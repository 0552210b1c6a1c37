pub mod config;
pub mod error;
pub mod logging;
pub mod notifications;
pub mod session_store;

pub use config::{ConfigManager, WanderConfig};
pub use error::{ErrorCategory, WanderError};
pub use notifications::{AppNotification, NotificationStore, NotificationType};
pub use session_store::{EphemeralStore, MemorySessionStore};
