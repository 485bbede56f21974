mod health;
mod metrics;
mod photobooth;

pub use health::health_handler;
pub use metrics::metrics_handler;
pub use photobooth::photobooth_handler;
