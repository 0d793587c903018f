pub mod clock;
pub mod config;
pub mod error;
pub mod handlers;
pub mod key_resolver;
pub mod metrics;
pub mod middleware;
pub mod rate_limit_config;
pub mod rate_limiter;
pub mod response;
pub mod server;
pub mod sweeper;
pub mod throttler;
pub mod window_counter;

pub use config::Config;
pub use error::{Result, ThrottlerError};
pub use key_resolver::{KeyResolver, Principal};
pub use rate_limit_config::{RateLimitSettings, SettingsHandle};
pub use server::{create_admin_app, create_app};
pub use throttler::{Admission, Throttler};
