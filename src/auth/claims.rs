use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Decoded claims of a verified Firebase ID token
///
/// Holds every claim in the token: the registered ones (`sub`, `iss`, `exp`, ...), Firebase's
/// own (`firebase`, `email`, ...) and the custom claims set by the claim-update function
/// (`dbRole`, `committeeRank`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthClaims(BTreeMap<String, Value>);

impl AuthClaims {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Claim value when it is a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Firebase user ID
    pub fn subject(&self) -> Option<&str> {
        self.get_str("sub")
    }

    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }
}

impl FromIterator<(String, Value)> for AuthClaims {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
