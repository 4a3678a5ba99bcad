//! Matcher (C5, spec.md §4.3). Pure function scoring two contacts for
//! "same entity", 0..10. Grounded on the original's `matchContact` scoring
//! rules (`original_source/src/engine/contactwriter.cpp` ~line 1828).

use crate::contact::Contact;
use crate::detail::DetailKind;

/// Orchestrator-level default: the first aggregate with score >= 7 is the
/// merge target (spec.md §4.3; REDESIGN FLAG / Open Question: candidate
/// order is unspecified, so "first encountered" may tie-break by id).
pub const MATCH_THRESHOLD: u8 = 7;

fn clamp(score: i32) -> u8 { score.clamp(0, 10) as u8 }

fn eq_ci(a: &str, b: &str) -> bool { a.eq_ignore_ascii_case(b) }

fn prefix_ci(a: &str, b: &str) -> bool {
    let (shorter, longer) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    !shorter.is_empty() && longer.to_ascii_lowercase().starts_with(&shorter.to_ascii_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailMatch {
    Matched,
    BothEmpty,
    NoMatch,
}

fn detail_match(kind_name: &str, a: &Contact, b: &Contact) -> DetailMatch {
    let a_details: Vec<&DetailKind> = a.details.iter().filter(|d| d.kind_name() == kind_name).map(|d| &d.kind).collect();
    let b_details: Vec<&DetailKind> = b.details.iter().filter(|d| d.kind_name() == kind_name).map(|d| &d.kind).collect();

    if a_details.is_empty() || b_details.is_empty() {
        return DetailMatch::BothEmpty;
    }
    for x in &a_details {
        for y in &b_details {
            if x == y {
                return DetailMatch::Matched;
            }
        }
    }
    DetailMatch::NoMatch
}

/// Scores `constituent` against `candidate_aggregate` for "same entity".
/// `is_not_related` reflects whether an `IsNot` relationship exists between
/// the two in either direction (checked by the caller against the
/// relationship store).
pub fn likelihood(constituent: &Contact, candidate_aggregate: &Contact, is_not_related: bool) -> u8 {
    if is_not_related {
        return 0;
    }

    let mut score: i32 = 10;

    let last_a = constituent.name.last.trim();
    let last_b = candidate_aggregate.name.last.trim();
    if !last_a.is_empty() && !last_b.is_empty() {
        score -= if eq_ci(last_a, last_b) { 0 } else { 6 };
    } else if last_a.is_empty() != last_b.is_empty() {
        score -= 2;
    }

    let first_a = constituent.name.first.trim();
    let first_b = candidate_aggregate.name.first.trim();
    if !first_a.is_empty() && !first_b.is_empty() {
        if eq_ci(first_a, first_b) {
            // no reduction
        } else if prefix_ci(first_a, first_b) {
            score -= 1;
        } else {
            score -= 3;
        }
    } else {
        score -= 3;
    }

    let oa_match = detail_match("OnlineAccount", constituent, candidate_aggregate);
    score += match oa_match {
        DetailMatch::Matched => 1,
        DetailMatch::BothEmpty => 0,
        DetailMatch::NoMatch => -1,
    };

    let phone_match = detail_match("PhoneNumber", constituent, candidate_aggregate);
    if phone_match == DetailMatch::Matched {
        return clamp(score);
    }
    let email_match = detail_match("EmailAddress", constituent, candidate_aggregate);
    if email_match == DetailMatch::Matched {
        return clamp(score);
    }

    if phone_match == DetailMatch::BothEmpty && email_match == DetailMatch::BothEmpty {
        score -= 1;
    }
    if phone_match == DetailMatch::NoMatch {
        score -= 2;
    }
    if email_match == DetailMatch::NoMatch {
        score -= 2;
    }

    clamp(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contact::{Contact, NameParts, SyncTarget};
    use crate::detail::{Detail, DetailKind};

    fn contact(first: &str, last: &str) -> Contact {
        let mut c = Contact::new(SyncTarget::Local);
        c.name = NameParts { first: first.into(), last: last.into(), ..Default::default() };
        c
    }

    #[test]
    fn is_not_relationship_forces_zero() {
        let a = contact("Jane", "Doe");
        let b = contact("Jane", "Doe");
        assert_eq!(likelihood(&a, &b, true), 0);
    }

    #[test]
    fn exact_name_and_phone_match_is_high() {
        let mut a = contact("Jane", "Doe");
        a.details.push(Detail::new(DetailKind::PhoneNumber { number: "+15550100".into(), normalized_number: "+15550100".into(), sub_types: vec![] }));
        let mut b = contact("Jane", "Doe");
        b.details.push(Detail::new(DetailKind::PhoneNumber { number: "+15550100".into(), normalized_number: "+15550100".into(), sub_types: vec![] }));
        assert!(likelihood(&a, &b, false) >= MATCH_THRESHOLD);
    }

    #[test]
    fn prefix_first_name_with_matching_last_crosses_threshold() {
        let a = contact("Jon", "Smith");
        let mut b = contact("John", "Smith");
        b.details.push(Detail::new(DetailKind::EmailAddress { address: "[email protected]".into() }));
        let mut a2 = a.clone();
        a2.details.push(Detail::new(DetailKind::EmailAddress { address: "[email protected]".into() }));
        assert!(likelihood(&a2, &b, false) >= MATCH_THRESHOLD);
    }

    #[test]
    fn mismatched_last_names_score_low() {
        let a = contact("Jane", "Doe");
        let b = contact("Jane", "Smith");
        assert!(likelihood(&a, &b, false) < MATCH_THRESHOLD);
    }

    #[test]
    fn monotone_adding_matching_detail_never_lowers_score() {
        let a = contact("Jane", "Doe");
        let b = contact("Jane", "Doe");
        let base = likelihood(&a, &b, false);

        let mut a2 = a.clone();
        let mut b2 = b.clone();
        a2.details.push(Detail::new(DetailKind::OnlineAccount { account_uri: "x".into(), protocol: "p".into(), service_provider: "s".into() }));
        b2.details.push(Detail::new(DetailKind::OnlineAccount { account_uri: "x".into(), protocol: "p".into(), service_provider: "s".into() }));
        let after = likelihood(&a2, &b2, false);
        assert!(after >= base);
    }
}
