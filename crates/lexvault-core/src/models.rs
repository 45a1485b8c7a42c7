//! Core data models used throughout LexVault.
//!
//! These types describe who is asking ([`Identity`]), what is stored
//! ([`Document`], [`Chunk`]), what was recorded ([`AuditEntry`]), and what
//! a question produces ([`QueryAnswer`]).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Authorization role attached to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: '{}'", other)),
        }
    }
}

/// The authenticated caller of a single request.
///
/// Built once at login (or token lookup) and passed explicitly to every
/// component call. Nothing in the system keeps a "current user" around.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A stored user credential. `password_hash` is a PHC string.
#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: i64,
}

impl Credential {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.id.clone(),
            username: self.username.clone(),
            role: self.role,
        }
    }
}

/// Metadata row for an uploaded document.
///
/// The plaintext never lives here; `ciphertext_ref` names the encrypted
/// blob and `content_hash` is the SHA-256 of the plaintext, checked after
/// every decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub owner_id: String,
    pub ciphertext_ref: String,
    pub content_hash: String,
    /// Upload time, Unix seconds.
    pub uploaded_at: i64,
    pub description: String,
    /// Set once the ingestion pipeline committed this document's chunks.
    pub indexed_at: Option<i64>,
}

/// A window of a document's extracted text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub document_id: String,
    pub sequence_index: i64,
    pub text: String,
    /// SHA-256 of `text`.
    pub hash: String,
    pub filename: String,
    pub owner_id: String,
}

impl Chunk {
    /// Stable key used by index upserts: `{document_id}:{sequence_index}`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.document_id, self.sequence_index)
    }
}

/// Kinds of security-relevant actions written to the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Login,
    Logout,
    Register,
    Upload,
    Query,
    Delete,
    Analyze,
    /// Outcome of an ingestion run; details carry `status` and either
    /// `chunks` or `reason`.
    Index,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Login => "LOGIN",
            ActionKind::Logout => "LOGOUT",
            ActionKind::Register => "REGISTER",
            ActionKind::Upload => "UPLOAD",
            ActionKind::Query => "QUERY",
            ActionKind::Delete => "DELETE",
            ActionKind::Analyze => "ANALYZE",
            ActionKind::Index => "INDEX",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOGIN" => Ok(ActionKind::Login),
            "LOGOUT" => Ok(ActionKind::Logout),
            "REGISTER" => Ok(ActionKind::Register),
            "UPLOAD" => Ok(ActionKind::Upload),
            "QUERY" => Ok(ActionKind::Query),
            "DELETE" => Ok(ActionKind::Delete),
            "ANALYZE" => Ok(ActionKind::Analyze),
            "INDEX" => Ok(ActionKind::Index),
            other => Err(format!("unknown audit action: '{}'", other)),
        }
    }
}

/// One immutable audit record.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    /// Server-assigned, strictly increasing, Unix microseconds.
    pub timestamp: i64,
    pub actor_id: String,
    pub action: ActionKind,
    pub details: serde_json::Value,
}

/// Structured details of a `QUERY` audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDetails {
    pub prompt: String,
    pub response: String,
    pub refs: BTreeSet<String>,
}

/// Result of a retrieval-augmented question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: BTreeSet<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_kind_roundtrips_through_str() {
        for kind in [
            ActionKind::Login,
            ActionKind::Logout,
            ActionKind::Register,
            ActionKind::Upload,
            ActionKind::Query,
            ActionKind::Delete,
            ActionKind::Analyze,
            ActionKind::Index,
        ] {
            assert_eq!(kind.as_str().parse::<ActionKind>().unwrap(), kind);
        }
        assert!("SHUTDOWN".parse::<ActionKind>().is_err());
    }

    #[test]
    fn test_query_details_json_shape() {
        let details = QueryDetails {
            prompt: "What is the notice period?".to_string(),
            response: "30 days.".to_string(),
            refs: ["lease.pdf".to_string()].into_iter().collect(),
        };
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["prompt"], "What is the notice period?");
        assert_eq!(json["refs"], serde_json::json!(["lease.pdf"]));
    }

    #[test]
    fn test_chunk_key() {
        let chunk = Chunk {
            document_id: "doc-1".to_string(),
            sequence_index: 3,
            text: String::new(),
            hash: String::new(),
            filename: "a.txt".to_string(),
            owner_id: "u1".to_string(),
        };
        assert_eq!(chunk.key(), "doc-1:3");
    }
}
