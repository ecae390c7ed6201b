//! Token and backup-code hashing
//!
//! Session tokens and backup codes are stored as SHA-256 hashes and compared
//! in constant time with the `subtle` crate. Both are high-entropy random
//! values, so a fast hash is sufficient; passwords go through `password-auth`
//! instead.

use std::collections::HashSet;

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Symbols used in backup codes. 32 entries, no `0`, `O`, `1`, `I`.
const BACKUP_CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Number of symbols in one backup code, excluding the dash.
const BACKUP_CODE_SYMBOLS: usize = 8;

/// Generate a cryptographically secure random token.
///
/// 256 bits of OS randomness encoded as URL-safe base64 (43 characters).
///
/// # Panics
///
/// Panics if the OS random number generator fails.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Hex-encoded SHA-256 of a token, used for storage and lookups.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify a token against a stored hash with constant-time comparison.
pub fn verify_token_hash(token: &str, stored_hash: &str) -> bool {
    let computed_hash = hash_token(token);
    constant_time_compare(computed_hash.as_bytes(), stored_hash.as_bytes())
}

/// Constant-time comparison of two byte slices.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Generate `count` distinct backup codes of the form `XXXX-XXXX`.
///
/// # Panics
///
/// Panics if the OS random number generator fails.
pub fn generate_backup_codes(count: usize) -> Vec<String> {
    let mut seen = HashSet::with_capacity(count);
    let mut codes = Vec::with_capacity(count);

    while codes.len() < count {
        let code = generate_backup_code();
        if seen.insert(code.clone()) {
            codes.push(code);
        }
    }

    codes
}

fn generate_backup_code() -> String {
    let mut bytes = [0u8; BACKUP_CODE_SYMBOLS];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");

    // 256 is a multiple of 32, so the modulo is unbiased
    let symbols: String = bytes
        .iter()
        .map(|b| BACKUP_CODE_ALPHABET[(*b as usize) % BACKUP_CODE_ALPHABET.len()] as char)
        .collect();

    format!("{}-{}", &symbols[..4], &symbols[4..])
}

/// Canonical form of a user-typed backup code: upper case, no dashes or spaces.
pub fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// The stored form of a backup code.
pub fn hash_backup_code(code: &str) -> String {
    hash_token(&normalize_backup_code(code))
}

/// Position of the stored hash matching `code`, if any.
///
/// Every stored hash is compared so the time taken does not depend on which
/// entry matched.
pub fn find_backup_code(code: &str, stored_hashes: &[String]) -> Option<usize> {
    let candidate = hash_backup_code(code);
    let mut found = None;
    for (index, stored) in stored_hashes.iter().enumerate() {
        if constant_time_compare(candidate.as_bytes(), stored.as_bytes()) && found.is_none() {
            found = Some(index);
        }
    }
    found
}
