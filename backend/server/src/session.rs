//! Signed session cookie: `session=<user id>.<expiry unix secs>.<hex hmac>`.
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, header::COOKIE};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const COOKIE_NAME: &str = "session";

pub struct SessionKeys {
    secret: Vec<u8>,
    ttl: Duration,
}

impl SessionKeys {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            ttl,
        }
    }

    fn mac(&self, payload: &str) -> HmacSha256 {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.secret)
            .unwrap_or_else(|_| unreachable!());
        mac.update(payload.as_bytes());
        mac
    }

    pub fn token(&self, user_id: i64, now: i64) -> String {
        let payload = format!("{user_id}.{}", now + self.ttl.as_secs() as i64);
        let signature = hex::encode(self.mac(&payload).finalize().into_bytes());

        format!("{payload}.{signature}")
    }

    /// User id carried by `token` if the signature holds and it has not expired.
    pub fn verify(&self, token: &str, now: i64) -> Option<i64> {
        let (payload, signature) = token.rsplit_once('.')?;
        let (user_id, expires) = payload.split_once('.')?;
        let signature = hex::decode(signature).ok()?;

        self.mac(payload).verify_slice(&signature).ok()?;
        if expires.parse::<i64>().ok()? <= now {
            return None;
        }
        user_id.parse().ok()
    }

    pub fn set_cookie(&self, user_id: i64) -> Option<HeaderValue> {
        let token = self.token(user_id, Utc::now().timestamp());

        HeaderValue::from_str(&format!(
            "{COOKIE_NAME}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
            self.ttl.as_secs()
        ))
        .ok()
    }

    pub fn user_id(&self, headers: &HeaderMap) -> Option<i64> {
        let now = Utc::now().timestamp();

        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == COOKIE_NAME)
            .find_map(|(_, token)| self.verify(token, now))
    }
}

pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("session=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SessionKeys {
        SessionKeys::new("test-secret", Duration::from_secs(60))
    }

    #[test]
    fn test_token_round_trip() {
        let token = keys().token(42, 1_000);

        assert_eq!(keys().verify(&token, 1_000), Some(42));
        assert_eq!(keys().verify(&token, 1_060), None);
    }

    #[test]
    fn test_tampered_tokens_fail() {
        let token = keys().token(42, 1_000);
        let forged = token.replacen("42.", "43.", 1);

        assert_eq!(keys().verify(&forged, 1_000), None);
        assert_eq!(
            SessionKeys::new("other", Duration::from_secs(60)).verify(&token, 1_000),
            None
        );
        assert_eq!(keys().verify("garbage", 1_000), None);
    }

    #[test]
    fn test_cookie_header_lookup() {
        let keys = keys();
        let token = keys.token(7, Utc::now().timestamp());
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session={token}")).unwrap(),
        );

        assert_eq!(keys.user_id(&headers), Some(7));
        assert_eq!(keys.user_id(&HeaderMap::new()), None);
    }
}
