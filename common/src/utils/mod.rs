pub mod cancellation_token;
pub mod clock;
pub mod logging;
