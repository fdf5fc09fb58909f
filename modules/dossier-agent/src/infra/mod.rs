pub mod limited;
pub mod rate_limiter;
pub mod retry;
pub mod telemetry;

pub use limited::{LimitedGenerator, LimitedSearch};
pub use rate_limiter::RateLimiter;
pub use retry::RetryPolicy;
pub use telemetry::{NoopTelemetry, TelemetrySink, TracingTelemetry};
