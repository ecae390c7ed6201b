//! Repository implementations for SQLite storage

pub mod audit;
pub mod brute_force;
pub mod device_session;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod user;

pub use audit::SqliteAuditRepository;
pub use brute_force::SqliteBruteForceRepository;
pub use device_session::SqliteDeviceSessionRepository;
pub use password::SqlitePasswordRepository;
pub use rate_limit::SqliteRateLimitRepository;
pub use session::SqliteSessionRepository;
pub use user::SqliteUserRepository;
