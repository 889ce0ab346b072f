use std::collections::hash_map::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecurityMode {
    #[default]
    Best,
    Sign,
    SignAndEncrypt,
    None,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CredentialType {
    #[default]
    None,
    UserName,
    X509Certificate,
    JwtToken,
}

/// User identity used when opening the session
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CredentialModel {
    #[serde(default)]
    pub credential_type: CredentialType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointModel {
    pub url: String,
    #[serde(default)]
    pub security_mode: SecurityMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_policy: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticsLevel {
    #[default]
    None,
    Status,
    Operations,
    Diagnostics,
    Verbose,
}

/// Request scoped diagnostics context; not part of connection identity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsModel {
    #[serde(default)]
    pub level: DiagnosticsLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_id: Option<String>,
}

/// Connection to one field device endpoint.
///
/// Two connections are the same when endpoint, security and user match;
/// the diagnostics context is ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionModel {
    pub endpoint: EndpointModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<CredentialModel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<DiagnosticsModel>,
}

impl PartialEq for ConnectionModel {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.endpoint == other.endpoint && self.user == other.user
    }
}

impl Eq for ConnectionModel {}

impl Hash for ConnectionModel {
    fn hash<H: Hasher>(
        &self,
        state: &mut H,
    ) {
        self.endpoint.hash(state);
        self.user.hash(state);
    }
}

impl ConnectionModel {
    pub fn new(endpoint: EndpointModel) -> Self {
        Self {
            endpoint,
            user: None,
            diagnostics: None,
        }
    }

    pub fn with_user(
        mut self,
        user: Option<CredentialModel>,
    ) -> Self {
        self.user = user;
        self
    }

    /// Same endpoint and security, regardless of the user credential
    pub fn is_same_endpoint(
        &self,
        other: &ConnectionModel,
    ) -> bool {
        self.endpoint == other.endpoint
    }

    /// Readable id, stable within the process, that never leaks credential values
    pub fn connection_id(&self) -> String {
        let mut id = format!("{}_{:?}", self.endpoint.url, self.endpoint.security_mode);
        if let Some(user) = &self.user {
            let mut hasher = DefaultHasher::new();
            user.hash(&mut hasher);
            id.push_str(&format!("_{:?}_{:x}", user.credential_type, hasher.finish()));
        }
        id
    }
}
