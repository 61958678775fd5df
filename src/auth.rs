//! Caller identity and credential hashing.
//!
//! Authentication itself happens upstream; the gateway forwards the verified
//! identity in `x-user-*` headers which are read here.

use std::str::FromStr;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::Argon2;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_DEPARTMENT_HEADER: &str = "x-user-department";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Hod,
    Principal,
    Faculty,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Hod => "HOD",
            Role::Principal => "PRINCIPAL",
            Role::Faculty => "FACULTY",
            Role::Student => "STUDENT",
        }
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "HOD" => Ok(Role::Hod),
            "PRINCIPAL" => Ok(Role::Principal),
            "FACULTY" => Ok(Role::Faculty),
            "STUDENT" => Ok(Role::Student),
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
    pub department: Option<String>,
}

impl Principal {
    pub fn require(&self, allowed: &[Role]) -> Result<(), AuthError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(self.role))
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication required")]
    Unauthenticated,
    #[error("role {0} may not access this resource")]
    Forbidden(Role),
}

/// Resolves who is calling from the request headers.
pub trait Authorizer: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError>;
}

/// Trusts identity headers injected by the fronting gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayAuthorizer;

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl Authorizer for GatewayAuthorizer {
    fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        let user_id = header(headers, USER_ID_HEADER)
            .and_then(|value| Uuid::parse_str(value).ok())
            .ok_or(AuthError::Unauthenticated)?;
        let role: Role = header(headers, USER_ROLE_HEADER)
            .ok_or(AuthError::Unauthenticated)?
            .parse()?;

        Ok(Principal {
            user_id,
            role,
            department: header(headers, USER_DEPARTMENT_HEADER).map(str::to_string),
        })
    }
}

pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> anyhow::Result<String>;
}

/// Argon2id with the crate's default cost parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2Hasher;

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }
}
