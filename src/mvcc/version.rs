//! Version - Immutable row version
//!
//! - A version is either a complete row document or an explicit tombstone
//! - Every version carries the store version it was committed at
//! - Updates and deletes create new versions; nothing is edited in place

use std::sync::Arc;

use serde_json::Value;

use super::VersionStamp;

/// The payload of a version: either a document or an explicit tombstone.
///
/// Tombstone is explicit, NOT represented via Option.
#[derive(Clone, Debug, PartialEq)]
pub enum VersionPayload {
    /// A complete row document. Shared so readers never copy row data.
    Document(Arc<Value>),
    /// An explicit deletion marker.
    Tombstone,
}

impl VersionPayload {
    /// Returns true if this payload is a tombstone.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        matches!(self, VersionPayload::Tombstone)
    }
}

/// A single immutable row version.
#[derive(Clone, Debug, PartialEq)]
pub struct Version {
    payload: VersionPayload,
    committed_at: VersionStamp,
}

impl Version {
    /// Creates a new document version.
    pub fn with_document(document: Value, committed_at: VersionStamp) -> Self {
        Self {
            payload: VersionPayload::Document(Arc::new(document)),
            committed_at,
        }
    }

    /// Creates a new tombstone version.
    pub fn with_tombstone(committed_at: VersionStamp) -> Self {
        Self {
            payload: VersionPayload::Tombstone,
            committed_at,
        }
    }

    /// Returns the payload.
    #[inline]
    pub fn payload(&self) -> &VersionPayload {
        &self.payload
    }

    /// Returns the document, or None for a tombstone.
    #[inline]
    pub fn document(&self) -> Option<&Arc<Value>> {
        match &self.payload {
            VersionPayload::Document(doc) => Some(doc),
            VersionPayload::Tombstone => None,
        }
    }

    /// Returns the store version this row version was committed at.
    #[inline]
    pub fn committed_at(&self) -> VersionStamp {
        self.committed_at
    }

    /// Returns true if this version is a tombstone.
    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.payload.is_tombstone()
    }
}
