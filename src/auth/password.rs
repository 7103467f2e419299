use once_cell::sync::Lazy;

use crate::auth::AuthError;
use crate::config;

/// Hashed at the configured cost so a lookup miss costs as much as a real check
static UNKNOWN_USER_HASH: Lazy<Option<String>> = Lazy::new(|| hash_password("campus-hub/unknown-user").ok());

/// Minimum accepted password length for new or changed passwords
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    hash_password_with_cost(password, config::config().security.bcrypt_cost)
}

pub fn hash_password_with_cost(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}

/// Malformed stored hashes count as a mismatch rather than an error
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Runs one bcrypt verification for an email with no account; always false
pub fn verify_unknown_user(password: &str) -> bool {
    if let Some(hash) = UNKNOWN_USER_HASH.as_deref() {
        let _ = verify_password(password, hash);
    }
    false
}

pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!("Password must be at least {} characters", MIN_PASSWORD_LENGTH));
    }
    if password.trim().is_empty() {
        return Err("Password cannot be blank".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original() {
        let hash = hash_password_with_cost("correct horse", 4).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn garbage_hash_is_a_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }

    #[test]
    fn unknown_user_check_does_real_bcrypt_work() {
        let hash = UNKNOWN_USER_HASH.as_deref().expect("dummy hash");
        assert!(hash.starts_with("$2"));
        assert!(bcrypt::verify("campus-hub/unknown-user", hash).unwrap());
        assert!(!verify_unknown_user("campus-hub/unknown-user"));
        assert!(!verify_unknown_user("guess"));
    }

    #[test]
    fn short_passwords_are_rejected() {
        assert!(validate_password_strength("short").is_err());
        assert!(validate_password_strength("long enough").is_ok());
    }
}
