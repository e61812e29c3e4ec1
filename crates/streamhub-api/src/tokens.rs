use anyhow::{Result, bail};
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use streamhub_types::api::{AccessClaims, RefreshClaims};
use streamhub_types::models::User;

/// One signing secret plus the lifetime of the tokens it mints.
struct KeySet {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: TimeDelta,
}

impl KeySet {
    fn new(secret: &str, ttl: TimeDelta) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    fn window(&self) -> (usize, usize) {
        let now = Utc::now();
        let iat = now.timestamp().max(0) as usize;
        let exp = (now + self.ttl).timestamp().max(0) as usize;
        (iat, exp)
    }
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Mints and verifies access and refresh tokens. The two kinds use
/// separate secrets, so neither verifies as the other.
pub struct TokenService {
    access: KeySet,
    refresh: KeySet,
}

impl TokenService {
    pub fn new(
        access_secret: &str,
        access_ttl: TimeDelta,
        refresh_secret: &str,
        refresh_ttl: TimeDelta,
    ) -> Self {
        Self {
            access: KeySet::new(access_secret, access_ttl),
            refresh: KeySet::new(refresh_secret, refresh_ttl),
        }
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair> {
        Ok(TokenPair {
            access_token: self.create_access_token(user)?,
            refresh_token: self.create_refresh_token(user.id)?,
        })
    }

    pub fn create_access_token(&self, user: &User) -> Result<String> {
        let (iat, exp) = self.access.window();
        let claims = AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            iat,
            exp,
            jti: Uuid::new_v4(),
        };
        Ok(encode(&Header::default(), &claims, &self.access.encoding)?)
    }

    pub fn create_refresh_token(&self, user_id: Uuid) -> Result<String> {
        let (iat, exp) = self.refresh.window();
        let claims = RefreshClaims {
            sub: user_id,
            iat,
            exp,
            jti: Uuid::new_v4(),
        };
        Ok(encode(&Header::default(), &claims, &self.refresh.encoding)?)
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        let data = decode::<AccessClaims>(token, &self.access.decoding, &Validation::default())?;
        Ok(data.claims)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        let data = decode::<RefreshClaims>(token, &self.refresh.decoding, &Validation::default())?;
        Ok(data.claims)
    }
}

/// Parse an expiry such as `15m`, `1d`, `10d`, `12h`, `30s` or bare seconds.
pub fn parse_duration(raw: &str) -> Result<TimeDelta> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("empty duration");
    }

    let (digits, unit) = match raw.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
        Some((idx, _)) => raw.split_at(idx),
        None => (raw, "s"),
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid duration: {}", raw))?;

    let delta = match unit {
        "s" => TimeDelta::try_seconds(value),
        "m" => TimeDelta::try_minutes(value),
        "h" => TimeDelta::try_hours(value),
        "d" => TimeDelta::try_days(value),
        _ => bail!("unknown duration unit in {:?} (use s, m, h or d)", raw),
    };
    match delta {
        Some(d) if value > 0 => Ok(d),
        _ => bail!("duration out of range: {}", raw),
    }
}
