//! Detail model & equivalence (C1).
//!
//! The source models details as a subclass hierarchy; re-architected here as
//! a tagged sum per Design Note "Detail polymorphism" — one enum of kinds,
//! each variant carrying its fields, plus a shared envelope for URI, linked
//! URIs, contexts, and constraints.
//!
//! Scalar header kinds (`Name`, `Timestamp`, `Gender`, `Favorite`,
//! `SyncTarget`, `DisplayLabel`) are represented as fields directly on
//! [`crate::contact::Contact`] rather than as entries in this enum, since
//! they persist onto `Contacts` header columns rather than a per-kind table
//! (spec.md §6 schema; original source's `insertContact`/`updateContact`).
//! Every other kind named in spec.md §3 — including the two remaining
//! unique kinds, `Type` and `GlobalPresence` — is a variant here.

use std::collections::BTreeSet;

/// Access-constraint flag set (spec.md §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessConstraints {
    pub read_only: bool,
    pub irremovable: bool,
}

impl AccessConstraints {
    pub const NONE: AccessConstraints = AccessConstraints { read_only: false, irremovable: false };

    pub fn read_only_and_irremovable() -> Self { AccessConstraints { read_only: true, irremovable: true } }

    /// Pack into the single integer column the generic `Details` table stores.
    pub fn to_bits(self) -> i64 { (self.read_only as i64) | ((self.irremovable as i64) << 1) }

    pub fn from_bits(bits: i64) -> Self { AccessConstraints { read_only: bits & 0b01 != 0, irremovable: bits & 0b10 != 0 } }
}

/// The envelope shared by every table-backed detail: a URI, linked URIs,
/// contexts, and an access-constraint flag set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetailEnvelope {
    pub uri: Option<String>,
    pub linked_uris: Vec<String>,
    pub contexts: Vec<String>,
    pub constraints: AccessConstraints,
}

/// The known detail kinds that persist via a per-kind table plus the
/// generic `Details` table (spec.md §3, minus the header-column kinds).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailKind {
    Address { street: String, locality: String, region: String, postcode: String, country: String, po_box: String },
    Anniversary { original_date: String, sub_type: String },
    Avatar { image_url: String, video_url: String },
    Birthday { date: String },
    EmailAddress { address: String },
    GlobalPresence { state: PresenceState, timestamp: String, nickname: String, message: String },
    Guid { guid: String },
    Hobby { hobby: String },
    Nickname { nickname: String },
    Note { note: String },
    OnlineAccount { account_uri: String, protocol: String, service_provider: String },
    Organization { name: String, role: String, title: String, department: String },
    PhoneNumber { number: String, normalized_number: String, sub_types: Vec<String> },
    Presence { state: PresenceState, timestamp: String, nickname: String, message: String },
    Ringtone { audio_ringtone_url: String },
    Tag { tag: String },
    Url { url: String },
    TpMetadata { telepathy_id: String, account_id: String },
    Type { value: String },
}

/// Presence state codes; lower is "more available" (spec.md §4.7). `Unknown`
/// is the sentinel that always loses to any concrete state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PresenceState {
    Available = 0,
    Away = 1,
    ExtendedAway = 2,
    Busy = 3,
    Hidden = 4,
    Offline = 5,
    Unknown = 99,
}

impl PresenceState {
    pub fn code(self) -> i32 { self as i32 }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PresenceState::Available,
            1 => PresenceState::Away,
            2 => PresenceState::ExtendedAway,
            3 => PresenceState::Busy,
            4 => PresenceState::Hidden,
            5 => PresenceState::Offline,
            _ => PresenceState::Unknown,
        }
    }
}

impl DetailKind {
    pub fn name(&self) -> &'static str {
        match self {
            DetailKind::Address { .. } => "Address",
            DetailKind::Anniversary { .. } => "Anniversary",
            DetailKind::Avatar { .. } => "Avatar",
            DetailKind::Birthday { .. } => "Birthday",
            DetailKind::EmailAddress { .. } => "EmailAddress",
            DetailKind::GlobalPresence { .. } => "GlobalPresence",
            DetailKind::Guid { .. } => "Guid",
            DetailKind::Hobby { .. } => "Hobby",
            DetailKind::Nickname { .. } => "Nickname",
            DetailKind::Note { .. } => "Note",
            DetailKind::OnlineAccount { .. } => "OnlineAccount",
            DetailKind::Organization { .. } => "Organization",
            DetailKind::PhoneNumber { .. } => "PhoneNumber",
            DetailKind::Presence { .. } => "Presence",
            DetailKind::Ringtone { .. } => "Ringtone",
            DetailKind::Tag { .. } => "Tag",
            DetailKind::Url { .. } => "Url",
            DetailKind::TpMetadata { .. } => "TpMetadata",
            DetailKind::Type { .. } => "Type",
        }
    }

    /// Kinds with at most one instance per contact (spec.md §3), restricted
    /// to the kinds actually represented in this enum (the header-column
    /// unique kinds live on `Contact` directly).
    pub fn is_unique(&self) -> bool { matches!(self, DetailKind::GlobalPresence { .. } | DetailKind::Type { .. }) }

    /// All known kind names, for §4.6.4's "every detail kind in the full
    /// known set" sweep.
    pub fn all_kind_names() -> &'static [&'static str] {
        &[
            "Address",
            "Anniversary",
            "Avatar",
            "Birthday",
            "EmailAddress",
            "GlobalPresence",
            "Guid",
            "Hobby",
            "Nickname",
            "Note",
            "OnlineAccount",
            "Organization",
            "PhoneNumber",
            "Presence",
            "Ringtone",
            "Tag",
            "Url",
            "TpMetadata",
            "Type",
        ]
    }
}

/// A detail attached to a contact: kind plus shared envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detail {
    pub kind: DetailKind,
    pub envelope: DetailEnvelope,
}

impl Detail {
    pub fn new(kind: DetailKind) -> Self { Detail { kind, envelope: DetailEnvelope::default() } }

    pub fn kind_name(&self) -> &'static str { self.kind.name() }

    /// Two details are equivalent iff their kind matches and their
    /// kind-specific value fields are equal; access constraints (and the
    /// rest of the envelope) are disregarded (spec.md §3 "Equivalence").
    pub fn equivalent(&self, other: &Detail) -> bool { self.kind == other.kind }
}

/// Kinds that never flow constituent → aggregate (spec.md §4.4, Glossary).
/// `SyncTarget` and `DisplayLabel` are header fields and are simply never
/// copied by the header-composition step; `Guid` and `Type` are the two
/// detail-vec members of this set.
pub fn is_unpromoted_detail_kind(name: &str) -> bool { matches!(name, "SyncTarget" | "Guid" | "Type" | "DisplayLabel") }

/// An optional detail-kind mask: if non-empty, only listed kinds are
/// considered (spec.md §4.4, §4.5, §4.6.4).
#[derive(Debug, Clone, Default)]
pub struct DetailMask(BTreeSet<String>);

impl DetailMask {
    pub fn all() -> Self { DetailMask(BTreeSet::new()) }

    pub fn only(kinds: impl IntoIterator<Item = impl Into<String>>) -> Self { DetailMask(kinds.into_iter().map(Into::into).collect()) }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Whether `kind` is allowed through this mask (an empty mask allows
    /// everything).
    pub fn allows(&self, kind: &str) -> bool { self.0.is_empty() || self.0.contains(kind) }
}
