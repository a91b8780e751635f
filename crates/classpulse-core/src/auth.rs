use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ROLE_TEACHER: &str = "teacher";

/// JWT claims for the teacher identity. Credential issuance lives outside the
/// coordination core; this module only mints and validates the tokens the
/// HTTP layer consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
}

impl Claims {
    pub fn is_teacher(&self) -> bool {
        self.role == ROLE_TEACHER
    }
}

pub fn issue_token(
    subject: &str,
    role: &str,
    secret: &str,
    expiry_seconds: u64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        exp: chrono::Utc::now().timestamp() + expiry_seconds as i64,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}
