//! Delta engine (C7, spec.md §4.5). Computes what changed between a freshly
//! recomposed aggregate and the one currently stored, so the orchestrator can
//! write only the difference and demote it onto the edited constituent.
//! Grounded on `calculateDelta` / `dbIsSuperset` in
//! `original_source/src/engine/contactwriter.cpp` (~line 1340).

use crate::contact::{Contact, Gender, NameParts};
use crate::detail::{Detail, DetailKind, DetailMask};

/// The detail-vec half of a delta: entries present in the new aggregate but
/// not the stored one (`added`), and vice versa (`removed`).
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub added: Vec<Detail>,
    pub removed: Vec<Detail>,
}

/// The header half of a delta: `Some` for a field iff it differs between the
/// new and stored aggregate. Unlike detail-vec kinds these are scalar and
/// unique, so there's no add/remove pair — just the new value to adopt.
#[derive(Debug, Clone, Default)]
pub struct HeaderDelta {
    pub name: Option<NameParts>,
    pub modified: Option<chrono::DateTime<chrono::Utc>>,
    pub gender: Option<Gender>,
    pub favorite: Option<bool>,
}

impl HeaderDelta {
    pub fn is_empty(&self) -> bool { self.name.is_none() && self.modified.is_none() && self.gender.is_none() && self.favorite.is_none() }
}

/// Diffs the header fields composed onto `new_aggregate` against what's
/// already in `stored_aggregate` (spec.md §4.5).
pub fn calculate_header_delta(new_aggregate: &Contact, stored_aggregate: &Contact, mask: &DetailMask) -> HeaderDelta {
    let mut delta = HeaderDelta::default();

    if mask.allows("Name") && new_aggregate.name != stored_aggregate.name {
        delta.name = Some(new_aggregate.name.clone());
    }
    if mask.allows("Timestamp") && new_aggregate.modified != stored_aggregate.modified {
        delta.modified = new_aggregate.modified;
    }
    if mask.allows("Gender") && new_aggregate.gender != stored_aggregate.gender {
        delta.gender = Some(new_aggregate.gender.clone());
    }
    if mask.allows("Favorite") && new_aggregate.favorite != stored_aggregate.favorite {
        delta.favorite = Some(new_aggregate.favorite);
    }

    delta
}

/// Adopts a `HeaderDelta` onto `local` (spec.md §4.5). Header kinds are
/// unique and scalar, so "applying" a changed field means overwriting it
/// outright rather than the add/remove dance detail-vec kinds go through.
pub fn apply_header_delta(delta: &HeaderDelta, local: &mut Contact) {
    if let Some(name) = &delta.name {
        local.name = name.clone();
    }
    if let Some(modified) = delta.modified {
        local.modified = Some(modified);
    }
    if let Some(gender) = &delta.gender {
        local.gender = gender.clone();
    }
    if let Some(favorite) = delta.favorite {
        local.favorite = favorite;
    }
}

/// Diffs the detail-vecs of `new_aggregate` and `stored_aggregate` (spec.md
/// §4.5). `Type` is excluded — it's a per-constituent tag, never part of the
/// composed aggregate delta. Two passes:
///
/// 1. Exact equivalence: a `new` detail matching a `stored` one removes both.
/// 2. Superset elimination: for a remaining same-kind pair, if every
///    non-empty field on `new` equals the same field on `stored`, the pair is
///    considered unchanged and removes both, even if `stored` has additional
///    fields set that `new` left empty (`dbIsSuperset`).
pub fn calculate_delta(new_aggregate: &Contact, stored_aggregate: &Contact, mask: &DetailMask) -> Delta {
    let relevant = |d: &&Detail| mask.allows(d.kind_name()) && d.kind_name() != "Type";
    let mut added: Vec<Detail> = new_aggregate.details.iter().filter(relevant).cloned().collect();
    let mut removed: Vec<Detail> = stored_aggregate.details.iter().filter(relevant).cloned().collect();

    let mut i = 0;
    while i < added.len() {
        if let Some(pos) = removed.iter().position(|s| s.equivalent(&added[i])) {
            removed.remove(pos);
            added.remove(i);
        } else {
            i += 1;
        }
    }

    let mut i = 0;
    'outer: while i < added.len() {
        let kind_name = added[i].kind_name();
        for j in 0..removed.len() {
            if removed[j].kind_name() == kind_name && is_superset_match(&added[i].kind, &removed[j].kind) {
                removed.remove(j);
                added.remove(i);
                continue 'outer;
            }
        }
        i += 1;
    }

    Delta { added, removed }
}

/// True if every non-empty scalar field on `new` equals the same-named field
/// on `stored` — i.e. `stored` already covers everything `new` actually sets.
fn is_superset_match(new: &DetailKind, stored: &DetailKind) -> bool {
    if new.name() != stored.name() {
        return false;
    }
    let new_vals = crate::codec::value_params(new);
    let stored_vals = crate::codec::value_params(stored);
    new_vals.iter().zip(stored_vals.iter()).all(|(n, s)| n.is_empty() || n == s)
}
