use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};


lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("photobooth_requests_total", "Total number of proxy requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("photobooth_rate_limited_total", "Requests rejected by the rate limiter").unwrap();
    pub static ref UPSTREAM_ERRORS: Counter =
        register_counter!("photobooth_upstream_errors_total", "Failed or non-200 upstream calls").unwrap();
    pub static ref UPSTREAM_LATENCY: Histogram = register_histogram!(
        "photobooth_upstream_latency_seconds",
        "Upstream call latency in seconds"
    )
    .unwrap();
    pub static ref WINDOW_LOAD: Gauge =
        register_gauge!("photobooth_rate_window_load", "Admissions inside the current rate window").unwrap();
}
