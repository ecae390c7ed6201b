//! Core functionality for the keystone account-security layer
//!
//! This crate holds the domain types, the error taxonomy, the repository
//! traits storage backends implement, and the services that take the security
//! decisions: rate limiting, brute-force protection, two-factor
//! authentication, audit logging and device session tracking.
//!
//! It is not intended to be used directly by application code. Use the
//! `keystone` crate, which wires the services together over one
//! [`repositories::RepositoryProvider`].
pub mod audit;
pub mod brute_force;
pub mod context;
pub mod crypto;
pub mod device_session;
pub mod error;
pub mod id;
pub mod identity;
pub mod rate_limit;
pub mod repositories;
pub mod services;
pub mod session;
pub mod two_factor;
pub mod user;
pub mod user_agent;
pub mod validation;

pub use audit::{AuditEvent, AuditEventType, NewAuditEvent};
pub use brute_force::{BruteForceProtectionConfig, BruteForceStatus};
pub use context::RequestContext;
pub use device_session::{DeviceSession, DeviceSessionId};
pub use error::Error;
pub use identity::IdentityProvider;
pub use rate_limit::{RateLimitAction, RateLimitDecision, RateLimitPolicy, RateLimitRecord};
pub use session::{Session, SessionConfig, SessionToken, TwoFactorChallenge};
pub use two_factor::{BackupCodeStatus, TotpConfig, TwoFactorSetup, TwoFactorVerification};
pub use user::{NewUser, TwoFactorCredential, User, UserId};
pub use user_agent::DeviceInfo;
