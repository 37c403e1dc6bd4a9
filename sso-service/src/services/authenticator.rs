use crate::models::Principal;
use crate::services::SsoError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Raw credential presented at login or with a renew grant.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Credential verification boundary. Real deployments plug LDAP, a database,
/// or an external IdP in here.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, credential: &Credential) -> Result<Principal, SsoError>;
}

/// Authenticates against a fixed username/password map from configuration.
pub struct StaticAuthenticator {
    users: HashMap<String, String>,
}

impl StaticAuthenticator {
    pub fn new(users: HashMap<String, String>) -> Self {
        Self { users }
    }

    /// Parse the `user:password,user:password` config format.
    pub fn from_spec(spec: &str) -> Self {
        let users = spec
            .split(',')
            .filter_map(|pair| {
                let (user, password) = pair.trim().split_once(':')?;
                Some((user.to_string(), password.to_string()))
            })
            .collect();
        Self { users }
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, credential: &Credential) -> Result<Principal, SsoError> {
        match self.users.get(&credential.username) {
            Some(expected) if expected == &credential.password => {
                Ok(Principal::new(credential.username.clone()))
            }
            _ => {
                tracing::info!(username = %credential.username, "Authentication rejected");
                Err(SsoError::AuthenticationFailure)
            }
        }
    }
}
