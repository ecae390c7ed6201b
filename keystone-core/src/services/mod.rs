//! Service layer
//!
//! Each service is generic over the repository traits it needs. The
//! orchestrating services ([`LoginService`], [`RegistrationService`]) are
//! generic over a whole [`crate::repositories::RepositoryProvider`] and are
//! built from the component services.

pub mod audit;
pub mod brute_force;
pub mod device_session;
pub mod login;
pub mod password;
pub mod rate_limit;
pub mod registration;
pub mod session;
pub mod two_factor;
pub mod user;

#[cfg(test)]
pub(crate) mod mock;

pub use audit::AuditLogger;
pub use brute_force::BruteForceProtectionService;
pub use device_session::SessionRegistryService;
pub use login::{LoginOutcome, LoginService, TwoFactorLogin};
pub use password::PasswordIdentityProvider;
pub use rate_limit::{FailurePolicy, RateLimiterService};
pub use registration::RegistrationService;
pub use session::SessionService;
pub use two_factor::TwoFactorService;
pub use user::UserService;
