//! Contact header type and identifiers.
//!
//! `ContactId` encapsulates the "external = row + 1" rule at the storage
//! boundary (Design Note "Id translation"); nothing outside `codec`/`connection`
//! should ever see a zero-based row id.

use std::fmt;

use crate::detail::Detail;

/// A stable, nonzero, externally-visible contact id. Zero means "no id".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContactId(i64);

impl ContactId {
    pub const NONE: ContactId = ContactId(0);

    /// Construct from an external id, which must be nonzero for anything
    /// other than the sentinel `NONE`.
    pub fn new(external: i64) -> Self { ContactId(external) }

    pub fn is_none(self) -> bool { self.0 == 0 }

    pub fn get(self) -> i64 { self.0 }

    /// Translate a zero-based SQLite rowid into an external id.
    pub(crate) fn from_row_id(row_id: i64) -> Self { ContactId(row_id + 1) }

    /// Translate this external id back into a zero-based SQLite rowid.
    pub(crate) fn row_id(self) -> i64 { self.0 - 1 }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// The sync-target tag every contact carries exactly one of (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SyncTarget {
    Local,
    Aggregate,
    Provider(String),
}

impl SyncTarget {
    pub fn as_str(&self) -> &str {
        match self {
            SyncTarget::Local => "local",
            SyncTarget::Aggregate => "aggregate",
            SyncTarget::Provider(tag) => tag.as_str(),
        }
    }

    pub fn from_str(tag: &str) -> Self {
        match tag {
            "local" => SyncTarget::Local,
            "aggregate" => SyncTarget::Aggregate,
            other => SyncTarget::Provider(other.to_string()),
        }
    }

    pub fn is_aggregate(&self) -> bool { matches!(self, SyncTarget::Aggregate) }

    pub fn is_local(&self) -> bool { matches!(self, SyncTarget::Local) }
}

/// The structured name parts carried by the unique `Name` detail, but also
/// surfaced on the contact header for convenience during matching (C5).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameParts {
    pub first: String,
    pub last: String,
    pub middle: String,
    pub prefix: String,
    pub suffix: String,
    pub custom_label: String,
}

impl NameParts {
    pub fn is_empty(&self) -> bool {
        self.first.is_empty()
            && self.last.is_empty()
            && self.middle.is_empty()
            && self.prefix.is_empty()
            && self.suffix.is_empty()
            && self.custom_label.is_empty()
    }
}

/// Gender marker used by both the scalar header and the `Gender` detail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Gender(pub String);

impl Gender {
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// A contact record: scalar header plus a flat detail list (spec.md §3).
#[derive(Debug, Clone)]
pub struct Contact {
    /// Zero until persisted by `create`.
    pub id: ContactId,
    pub display_label: String,
    pub name: NameParts,
    pub sync_target: SyncTarget,
    pub created: Option<chrono::DateTime<chrono::Utc>>,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub gender: Gender,
    pub favorite: bool,
    pub details: Vec<Detail>,
}

impl Contact {
    pub fn new(sync_target: SyncTarget) -> Self {
        Contact {
            id: ContactId::NONE,
            display_label: String::new(),
            name: NameParts::default(),
            sync_target,
            created: None,
            modified: None,
            gender: Gender::default(),
            favorite: false,
            details: Vec::new(),
        }
    }
}
