use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::session::errors::SessionError;
use crate::storage::CacheData;
use crate::utils::gen_random_string;

const SESSION_ID_MAX_LEN: usize = 256;
const SESSION_ID_RANDOM_BYTES: usize = 32;

/// Opaque session identifier.
///
/// Ids arrive from untrusted cookies and end up inside store keys, so only
/// `[A-Za-z0-9,-._]` is accepted, up to 256 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, SessionError> {
        let id = id.into();
        if id.is_empty() || id.len() > SESSION_ID_MAX_LEN {
            return Err(SessionError::InvalidSessionId(format!(
                "length must be between 1 and {SESSION_ID_MAX_LEN}, got {}",
                id.len()
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ',' | '.')))
        {
            return Err(SessionError::InvalidSessionId(format!(
                "unexpected character {c:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Mint a fresh random id.
    pub fn generate() -> Result<Self, SessionError> {
        Ok(Self(gen_random_string(SESSION_ID_RANDOM_BYTES)?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// In-memory data of one session.
///
/// Keys are kept sorted so encoding the same record always yields the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionRecord(BTreeMap<String, Value>);

impl SessionRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }
}

impl From<BTreeMap<String, Value>> for SessionRecord {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl From<SessionRecord> for BTreeMap<String, Value> {
    fn from(record: SessionRecord) -> Self {
        record.0
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for SessionRecord {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for SessionRecord {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Serialized form of a [`SessionRecord`] as it sits in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPayload(Vec<u8>);

impl StoredPayload {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<StoredPayload> for CacheData {
    fn from(payload: StoredPayload) -> Self {
        Self { value: payload.0 }
    }
}

impl From<CacheData> for StoredPayload {
    fn from(data: CacheData) -> Self {
        Self(data.value)
    }
}

/// Where a [`SessionLifecycleManager`](crate::SessionLifecycleManager) is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Active,
    Flushed,
    Destroyed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Active => "active",
            Self::Flushed => "flushed",
            Self::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Value of the `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Strict => "Strict",
            Self::Lax => "Lax",
            Self::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(Self::Strict),
            "lax" => Ok(Self::Lax),
            "none" => Ok(Self::None),
            other => Err(format!("Unknown SameSite value: {other}")),
        }
    }
}
