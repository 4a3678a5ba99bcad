//! Presence reducer (C9, spec.md §4.7).

use rusqlite::Connection;

use crate::contact::ContactId;
use crate::detail::{Detail, DetailKind, PresenceState};
use crate::error::WriteError;
use crate::schema::{self, DETAILS_TABLE};

/// Clears old presence rows and the derived global-presence row, then
/// selects the presence detail with the strictly lowest state code
/// (`Unknown` always loses), ties broken by first-seen order. Inserts all
/// presence rows and one global-presence row carrying the winner's fields.
/// Returns the derived `GlobalPresence` detail so the caller can set it back
/// on the in-memory contact, or `None` if there were no presence details.
pub fn write_presence(conn: &Connection, id: ContactId, presence_details: &[Detail]) -> Result<Option<Detail>, WriteError> {
    for kind in ["Presence", "GlobalPresence"] {
        let table = schema::detail_table_name(kind);
        conn.execute(&format!(r#"DELETE FROM "{}" WHERE "contactId" = ?1"#, table), rusqlite::params![id.row_id()])?;
        conn.execute(
            &format!(r#"DELETE FROM "{}" WHERE "contactId" = ?1 AND "detail" = ?2"#, DETAILS_TABLE),
            rusqlite::params![id.row_id(), kind],
        )?;
    }

    let mut detail_id = 1i64;
    for d in presence_details {
        insert_presence_row(conn, id, detail_id, d)?;
        detail_id += 1;
    }

    let winner = select_winner(presence_details);
    if let Some(winning) = winner {
        let global = global_presence_from(winning);
        insert_global_presence_row(conn, id, &global)?;
        Ok(Some(global))
    } else {
        Ok(None)
    }
}

/// Select the presence detail with the lowest numeric state code, except
/// that `Unknown` loses to any other state. Ties break by first-seen order.
fn select_winner(details: &[Detail]) -> Option<&Detail> {
    let mut best: Option<&Detail> = None;
    for d in details {
        let DetailKind::Presence { state, .. } = &d.kind else { continue };
        best = match best {
            None => Some(d),
            Some(current) => {
                let DetailKind::Presence { state: current_state, .. } = &current.kind else { unreachable!() };
                if is_better(*state, *current_state) {
                    Some(d)
                } else {
                    Some(current)
                }
            }
        };
    }
    best
}

fn is_better(candidate: PresenceState, incumbent: PresenceState) -> bool {
    match (candidate, incumbent) {
        (PresenceState::Unknown, _) => false,
        (_, PresenceState::Unknown) => true,
        (c, i) => c.code() < i.code(),
    }
}

fn global_presence_from(winner: &Detail) -> Detail {
    let DetailKind::Presence { state, timestamp, nickname, message } = &winner.kind else {
        unreachable!("select_winner only returns Presence details")
    };
    Detail::new(DetailKind::GlobalPresence {
        state: *state,
        timestamp: timestamp.clone(),
        nickname: nickname.clone(),
        message: message.clone(),
    })
}

fn insert_presence_row(conn: &Connection, id: ContactId, detail_id: i64, detail: &Detail) -> Result<(), WriteError> {
    let DetailKind::Presence { state, timestamp, nickname, message } = &detail.kind else {
        return Err(WriteError::InvalidDetail("expected Presence detail".into()));
    };
    let table = schema::detail_table_name("Presence");
    conn.execute(
        &format!(r#"INSERT INTO "{}" ("contactId","detailId","state","timestamp","nickname","message") VALUES (?1,?2,?3,?4,?5,?6)"#, table),
        rusqlite::params![id.row_id(), detail_id, state.code(), timestamp, nickname, message],
    )?;
    conn.execute(
        &format!(
            r#"INSERT INTO "{}" ("contactId","detail","detailId","detailUri","linkedDetailUris","contexts","accessConstraints")
               VALUES (?1,'Presence',?2,?3,?4,?5,?6)"#,
            DETAILS_TABLE
        ),
        rusqlite::params![
            id.row_id(),
            detail_id,
            detail.envelope.uri,
            detail.envelope.linked_uris.join(";"),
            detail.envelope.contexts.join(";"),
            detail.envelope.constraints.to_bits(),
        ],
    )?;
    Ok(())
}

fn insert_global_presence_row(conn: &Connection, id: ContactId, detail: &Detail) -> Result<(), WriteError> {
    let DetailKind::GlobalPresence { state, timestamp, nickname, message } = &detail.kind else {
        return Err(WriteError::InvalidDetail("expected GlobalPresence detail".into()));
    };
    let table = schema::detail_table_name("GlobalPresence");
    conn.execute(
        &format!(r#"INSERT INTO "{}" ("contactId","detailId","state","timestamp","nickname","message") VALUES (?1,1,?2,?3,?4,?5)"#, table),
        rusqlite::params![id.row_id(), state.code(), timestamp, nickname, message],
    )?;
    conn.execute(
        &format!(
            r#"INSERT INTO "{}" ("contactId","detail","detailId","detailUri","linkedDetailUris","contexts","accessConstraints")
               VALUES (?1,'GlobalPresence',1,NULL,'','',0)"#,
            DETAILS_TABLE
        ),
        rusqlite::params![id.row_id()],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presence(state: PresenceState) -> Detail {
        Detail::new(DetailKind::Presence { state, timestamp: "t".into(), nickname: "n".into(), message: "m".into() })
    }

    #[test]
    fn lowest_state_code_wins() {
        let details = vec![presence(PresenceState::Busy), presence(PresenceState::Available), presence(PresenceState::Unknown)];
        let winner = select_winner(&details).unwrap();
        assert_eq!(winner.kind, DetailKind::Presence { state: PresenceState::Available, timestamp: "t".into(), nickname: "n".into(), message: "m".into() });
    }

    #[test]
    fn unknown_never_wins_unless_alone() {
        let details = vec![presence(PresenceState::Unknown)];
        let winner = select_winner(&details).unwrap();
        assert!(matches!(winner.kind, DetailKind::Presence { state: PresenceState::Unknown, .. }));
    }

    #[test]
    fn ties_break_by_first_seen() {
        let a = presence(PresenceState::Away);
        let b = presence(PresenceState::Away);
        let details = vec![a.clone(), b];
        let winner = select_winner(&details).unwrap();
        assert_eq!(winner, &a);
    }

    #[test]
    fn no_presence_details_yields_no_winner() {
        assert!(select_winner(&[]).is_none());
    }
}
