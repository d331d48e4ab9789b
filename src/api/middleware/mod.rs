pub mod error_handler;
pub mod logging;

pub use error_handler::{handle_panic, normalize_errors};
pub use logging::logging_middleware;
