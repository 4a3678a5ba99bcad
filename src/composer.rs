//! Composer (C6, spec.md §4.4). Grounded on `promoteDetailsToAggregate` /
//! `promoteDetailsToLocal` in `original_source/src/engine/contactwriter.cpp`
//! (~line 1710 / ~1410).

use crate::contact::Contact;
use crate::detail::{is_unpromoted_detail_kind, Detail, DetailMask};

const AGGREGATE_URI_PREFIX: &str = "aggregate:";

fn rewrite_uri_for_aggregate(uri: &str) -> String {
    if uri.is_empty() {
        String::new()
    } else {
        format!("{}{}", AGGREGATE_URI_PREFIX, uri)
    }
}

fn strip_aggregate_prefix(uri: &str) -> String { uri.strip_prefix(AGGREGATE_URI_PREFIX).unwrap_or(uri).to_string() }

fn promote_envelope(constituent: &Contact, detail: &Detail) -> Detail {
    let mut d = detail.clone();
    if let Some(uri) = &d.envelope.uri {
        d.envelope.uri = Some(rewrite_uri_for_aggregate(uri));
    }
    d.envelope.linked_uris = d.envelope.linked_uris.iter().map(|u| rewrite_uri_for_aggregate(u)).collect();
    if !constituent.sync_target.as_str().is_empty() && !constituent.sync_target.is_local() {
        d.envelope.constraints = crate::detail::AccessConstraints::read_only_and_irremovable();
    }
    d
}

/// Merges `constituent` into `aggregate` in place: unique-detail
/// composition (fill empty fields, never overwrite) plus multi-detail
/// duplication with equivalence suppression (spec.md §4.4).
pub fn promote_to_aggregate(constituent: &Contact, aggregate: &mut Contact, mask: &DetailMask) {
    // Header-level unique kinds (Name, Timestamp, Gender, Favorite) compose
    // directly on the scalar fields.
    if mask.allows("Name") {
        let c = &constituent.name;
        let a = &mut aggregate.name;
        if !c.prefix.is_empty() && a.prefix.is_empty() {
            a.prefix = c.prefix.clone();
        }
        if !c.first.is_empty() && a.first.is_empty() {
            a.first = c.first.clone();
        }
        if !c.middle.is_empty() && a.middle.is_empty() {
            a.middle = c.middle.clone();
        }
        if !c.last.is_empty() && a.last.is_empty() {
            a.last = c.last.clone();
        }
        if !c.suffix.is_empty() && a.suffix.is_empty() {
            a.suffix = c.suffix.clone();
        }
        if !c.custom_label.is_empty() && a.custom_label.is_empty() {
            a.custom_label = c.custom_label.clone();
        }
    }

    if mask.allows("Timestamp") {
        if let Some(modified) = constituent.modified {
            if aggregate.modified.is_none() || modified > aggregate.modified.unwrap() {
                aggregate.modified = Some(modified);
            }
        }
    }

    if mask.allows("Gender") && !constituent.gender.is_empty() && aggregate.gender.is_empty() {
        aggregate.gender = constituent.gender.clone();
    }

    if mask.allows("Favorite") && constituent.favorite && !aggregate.favorite {
        aggregate.favorite = true;
    }

    // Detail-vec kinds: skip unpromoted kinds and the derived GlobalPresence
    // (which the aggregate recomputes from its own merged Presence details
    // at write time via the presence reducer, C9).
    for detail in &constituent.details {
        let kind = detail.kind_name();
        if is_unpromoted_detail_kind(kind) || kind == "GlobalPresence" {
            continue;
        }
        if !mask.allows(kind) {
            continue;
        }

        if detail.kind.is_unique() {
            if !aggregate.details.iter().any(|d| d.kind_name() == kind) {
                aggregate.details.push(promote_envelope(constituent, detail));
            }
        } else if !aggregate.details.iter().any(|d| d.equivalent(detail)) {
            aggregate.details.push(promote_envelope(constituent, detail));
        }
    }
}

/// The inverse of `promote_to_aggregate`: applies the detail-vec half of an
/// (add, remove) delta computed against the stored aggregate onto the
/// `local` constituent (spec.md §4.4). The header-field half (Name,
/// Timestamp, Gender, Favorite) is applied separately via
/// `crate::delta::apply_header_delta`, since those fields don't live in
/// `Contact::details`. Removals that can't be matched on `local` (because
/// the value came from a different constituent) are logged, not erred, and
/// tracked so the corresponding addition is not blindly re-applied — this
/// mirrors the original's `notPresentInLocal` bookkeeping.
pub fn demote_to_local(add_delta: &[Detail], remove_delta: &[Detail], local: &mut Contact, mask: &DetailMask) {
    let mut not_present_in_local: Vec<Detail> = Vec::new();

    for detail in remove_delta {
        let kind = detail.kind_name();
        if is_unpromoted_detail_kind(kind) || !mask.allows(kind) {
            continue;
        }

        if let Some(pos) = local.details.iter().position(|d| d.equivalent(detail)) {
            local.details.remove(pos);
        } else {
            tracing::debug!(kind, "demote_to_local: removal not present on local, ignoring");
            not_present_in_local.push(detail.clone());
        }
    }

    for detail in add_delta {
        let kind = detail.kind_name();
        if is_unpromoted_detail_kind(kind) || !mask.allows(kind) {
            continue;
        }

        if detail.kind.is_unique() {
            local.details.retain(|d| d.kind_name() != kind);
            let mut d = detail.clone();
            if let Some(uri) = &d.envelope.uri {
                d.envelope.uri = Some(strip_aggregate_prefix(uri));
            }
            local.details.push(d);
            continue;
        }

        let already_present =
            local.details.iter().any(|d| d.equivalent(detail)) || not_present_in_local.iter().any(|d| d.equivalent(detail));
        if already_present {
            continue;
        }

        let mut d = detail.clone();
        if let Some(uri) = &d.envelope.uri {
            d.envelope.uri = Some(strip_aggregate_prefix(uri));
        }
        d.envelope.linked_uris = d.envelope.linked_uris.iter().map(|u| strip_aggregate_prefix(u)).collect();
        local.details.push(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{Contact, NameParts, SyncTarget};
    use crate::detail::DetailKind;

    #[test]
    fn promote_fills_empty_aggregate_name_fields_only() {
        let mut constituent = Contact::new(SyncTarget::Local);
        constituent.name = NameParts { first: "Jane".into(), last: "Doe".into(), ..Default::default() };
        let mut aggregate = Contact::new(SyncTarget::Aggregate);
        aggregate.name.last = "Existing".into();

        promote_to_aggregate(&constituent, &mut aggregate, &DetailMask::all());

        assert_eq!(aggregate.name.first, "Jane");
        assert_eq!(aggregate.name.last, "Existing", "never overwrite a populated field");
    }

    #[test]
    fn promote_duplicates_multi_details_unless_equivalent() {
        let mut constituent = Contact::new(SyncTarget::Provider("telepathy".into()));
        constituent.details.push(Detail::new(DetailKind::PhoneNumber { number: "555".into(), normalized_number: "555".into(), sub_types: vec![] }));
        let mut aggregate = Contact::new(SyncTarget::Aggregate);
        aggregate.details.push(Detail::new(DetailKind::PhoneNumber { number: "555".into(), normalized_number: "555".into(), sub_types: vec![] }));

        promote_to_aggregate(&constituent, &mut aggregate, &DetailMask::all());

        assert_eq!(aggregate.details.len(), 1, "equivalent detail should be suppressed, not duplicated");
    }

    #[test]
    fn promote_marks_non_local_details_read_only_irremovable() {
        let mut constituent = Contact::new(SyncTarget::Provider("telepathy".into()));
        constituent.details.push(Detail::new(DetailKind::Nickname { nickname: "JD".into() }));
        let mut aggregate = Contact::new(SyncTarget::Aggregate);

        promote_to_aggregate(&constituent, &mut aggregate, &DetailMask::all());

        let d = &aggregate.details[0];
        assert!(d.envelope.constraints.read_only);
        assert!(d.envelope.constraints.irremovable);
    }

    #[test]
    fn demote_appends_addition_with_stripped_uri_prefix() {
        let mut local = Contact::new(SyncTarget::Local);
        let mut add = Detail::new(DetailKind::Nickname { nickname: "JD".into() });
        add.envelope.uri = Some("aggregate:nick-1".into());

        demote_to_local(&[add], &[], &mut local, &DetailMask::all());

        assert_eq!(local.details.len(), 1);
        assert_eq!(local.details[0].envelope.uri.as_deref(), Some("nick-1"));
    }

    #[test]
    fn demote_suppresses_addition_matching_an_unmatched_removal() {
        let mut local = Contact::new(SyncTarget::Local);
        let shared = Detail::new(DetailKind::Nickname { nickname: "JD".into() });
        // `shared` is both removed (but not found on local, since it came from
        // another constituent) and re-added in the same delta; it should not
        // be reintroduced onto local.
        demote_to_local(std::slice::from_ref(&shared), std::slice::from_ref(&shared), &mut local, &DetailMask::all());

        assert!(local.details.is_empty());
    }
}
