use chrono::{Duration, NaiveDateTime, Utc};
use rand::RngCore;

pub const VERIFICATION_TTL_HOURS: i64 = 24;
pub const RESET_TTL_HOURS: i64 = 1;

/// A single-use token and the moment it stops being accepted.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub value: String,
    pub expires_at: NaiveDateTime,
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn issue(ttl_hours: i64) -> IssuedToken {
    IssuedToken {
        value: generate_token(),
        expires_at: Utc::now().naive_utc() + Duration::hours(ttl_hours),
    }
}

pub fn verification_token() -> IssuedToken {
    issue(VERIFICATION_TTL_HOURS)
}

pub fn reset_token() -> IssuedToken {
    issue(RESET_TTL_HOURS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_hex_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_follows_ttl() {
        let now = Utc::now().naive_utc();
        let t = verification_token();
        assert!(t.expires_at > now + Duration::hours(23));
        assert!(t.expires_at <= Utc::now().naive_utc() + Duration::hours(24));
        let r = reset_token();
        assert!(r.expires_at <= Utc::now().naive_utc() + Duration::hours(1));
    }
}
