use bcrypt::{BcryptError, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::db::entities::user;
use crate::web::models::Claims;

#[cfg(not(test))]
const HASH_COST: u32 = bcrypt::DEFAULT_COST;
#[cfg(test)]
const HASH_COST: u32 = 4;

pub fn hash_password(password: &str) -> Result<String, BcryptError> {
    hash(password, HASH_COST)
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool, BcryptError> {
    verify(password, password_hash)
}

/// Signs a token for `user` valid for `ttl`.
pub fn issue_token(
    user: &user::Model,
    jwt_secret: &str,
    ttl: Duration,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.username.clone(),
        user_id: user.id,
        exp: (Utc::now() + ttl).timestamp() as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(jwt_secret.as_ref()))
}

/// Verifies signature and expiry and returns the claims.
pub fn decode_token(token: &str, jwt_secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> user::Model {
        user::Model {
            id: 7,
            email: "cook@example.com".to_string(),
            username: "cook".to_string(),
            first_name: "Test".to_string(),
            last_name: "Cook".to_string(),
            password_hash: String::new(),
            avatar: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_hash_and_verify() {
        let hashed = hash_password("s3cret-pass").unwrap();
        assert_ne!(hashed, "s3cret-pass");
        assert!(verify_password("s3cret-pass", &hashed).unwrap());
        assert!(!verify_password("wrong-pass", &hashed).unwrap());
    }

    #[test]
    fn test_token_round_trip() {
        let token = issue_token(&sample_user(), "secret", Duration::hours(1)).unwrap();
        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.user_id, 7);
        assert_eq!(claims.sub, "cook");
    }

    #[test]
    fn test_wrong_secret_and_expired_tokens_fail() {
        let token = issue_token(&sample_user(), "secret", Duration::hours(1)).unwrap();
        assert!(decode_token(&token, "other").is_err());

        let expired = issue_token(&sample_user(), "secret", Duration::hours(-2)).unwrap();
        assert!(decode_token(&expired, "secret").is_err());
    }
}
