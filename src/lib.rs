//! A local contact-database write path: header/detail persistence, a
//! presence reducer, an entity-matcher, and an aggregation engine that
//! composes per-provider "constituent" contacts into merged "aggregate"
//! contacts (spec.md §1-2).
//!
//! Reading rows back into [`Contact`] values, rendering UI, cross-device
//! sync, and schema migration all live outside this crate — see the
//! [`Reader`] / [`DisplayLabeler`] / [`PhoneNormalizer`] / [`NotificationSink`]
//! traits for the seams this crate expects its host to fill in.

mod codec;
mod composer;
mod connection;
mod contact;
mod delta;
mod detail;
mod error;
mod external;
mod identity;
mod matcher;
mod presence;
mod relationship;
mod relationships_store;
mod schema;
mod txn;
mod writer;

pub use connection::SqliteConfig;
pub use contact::{Contact, ContactId, Gender, NameParts, SyncTarget};
pub use detail::{AccessConstraints, Detail, DetailEnvelope, DetailKind, DetailMask, PresenceState};
pub use error::{ErrorMap, RetrievalError, StoreError, WriteError};
pub use external::{DisplayLabeler, FetchHint, NotificationSink, NullNotificationSink, PhoneNormalizer, Reader};
pub use identity::IdentityKind;
pub use matcher::MATCH_THRESHOLD;
pub use relationship::{Relationship, RelationshipKind};
pub use writer::{ContactWriter, ContactWriterConfig};
