//! External collaborators consumed (not implemented) by this crate
//! (spec.md §1 "Out of scope", §6 "External interfaces").

use async_trait::async_trait;

use crate::contact::{Contact, ContactId};
use crate::detail::DetailMask;
use crate::error::RetrievalError;

/// Fetch hint passed to the reader: an optional detail-kind mask. Manager-wide
/// concerns (filters, sort orders, fetch hints beyond a detail-name mask) are
/// only referenced at the boundary (spec.md §1) — this crate does not
/// interpret them further.
#[derive(Debug, Clone, Default)]
pub struct FetchHint {
    pub detail_mask: DetailMask,
}

/// The reader subsystem that materializes contacts from rows. Must return an
/// empty list (not an error) for unknown ids (spec.md §6).
#[async_trait]
pub trait Reader: Send + Sync {
    async fn read_contacts(&self, ids: &[ContactId], hint: &FetchHint) -> Result<Vec<Contact>, RetrievalError>;

    async fn read_all_aggregates(&self, hint: &FetchHint) -> Result<Vec<Contact>, RetrievalError>;

    /// Convenience wrapper over `read_contacts` for the common single-id case.
    async fn read_contact(&self, id: ContactId, hint: &FetchHint) -> Result<Option<Contact>, RetrievalError> {
        Ok(self.read_contacts(&[id], hint).await?.into_iter().next())
    }
}

/// Pure function `(Contact) -> String` whose result replaces the contact's
/// `displayLabel` field before persistence.
pub trait DisplayLabeler: Send + Sync {
    fn label(&self, contact: &Contact) -> String;
}

/// Pure function `(string) -> string` used to fill the `normalizedNumber`
/// column on `PhoneNumber` inserts.
pub trait PhoneNormalizer: Send + Sync {
    fn normalize(&self, number: &str) -> String;
}

/// Three post-commit signal lists, called only inside `commit`
/// (Design Note "Notification side-channel").
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn contacts_added(&self, ids: Vec<ContactId>);
    async fn contacts_changed(&self, ids: Vec<ContactId>);
    async fn contacts_removed(&self, ids: Vec<ContactId>);
}

/// A `NotificationSink` that drops every signal, for tests and standalone use.
pub struct NullNotificationSink;

#[async_trait]
impl NotificationSink for NullNotificationSink {
    async fn contacts_added(&self, _ids: Vec<ContactId>) {}
    async fn contacts_changed(&self, _ids: Vec<ContactId>) {}
    async fn contacts_removed(&self, _ids: Vec<ContactId>) {}
}
