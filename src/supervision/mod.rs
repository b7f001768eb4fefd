//! §5 supervisory fabric: a three-state circuit breaker per broker endpoint
//! (generalised from the teacher's binary `DataSourceKillSwitch`), a
//! sliding-window rate limiter (generalised from `middleware::rate_limit`'s
//! per-IP layer to a per-endpoint layer), a PID-keyed singleton lock, and a
//! health registry the HTTP surface's `/health` reads from.

pub mod circuit_breaker;
pub mod health;
pub mod rate_limiter;
pub mod singleton_lock;

pub use circuit_breaker::CircuitBreaker;
pub use health::HealthRegistry;
pub use rate_limiter::RateLimiter;
pub use singleton_lock::SingletonLock;
