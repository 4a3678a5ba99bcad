//! Identity registry (C10, spec.md §4.8). Grounded on the original's
//! `selfContactId`/`setIdentity` schema constants
//! (`original_source/src/engine/contactwriter.cpp`).

use rusqlite::{params, Connection};

use crate::contact::ContactId;
use crate::error::StoreError;
use crate::schema::IDENTITIES_TABLE;

/// Identity kinds recognized by the registry. `SelfContact` is the one the
/// write path itself consults (to protect it from `remove`); anything else
/// round-trips as an opaque tag, since the original schema keys this table
/// by an arbitrary identity string rather than a closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityKind {
    SelfContact,
    Other(String),
}

impl IdentityKind {
    pub fn as_str(&self) -> &str {
        match self {
            IdentityKind::SelfContact => "SelfContact",
            IdentityKind::Other(tag) => tag.as_str(),
        }
    }
}

/// `id == ContactId::NONE` deletes the row for `kind`; otherwise upserts it
/// (spec.md §4.8).
pub fn set_identity(conn: &Connection, kind: &IdentityKind, id: ContactId) -> Result<(), StoreError> {
    if id.is_none() {
        conn.execute(&format!(r#"DELETE FROM "{}" WHERE "identity" = ?1"#, IDENTITIES_TABLE), params![kind.as_str()])?;
    } else {
        conn.execute(
            &format!(
                r#"INSERT INTO "{}" ("identity","contactId") VALUES (?1,?2)
                   ON CONFLICT("identity") DO UPDATE SET "contactId" = excluded."contactId""#,
                IDENTITIES_TABLE
            ),
            params![kind.as_str(), id.row_id()],
        )?;
    }
    Ok(())
}

/// Single-row lookup; `ContactId::NONE` if `kind` has no registered id.
pub fn get_identity(conn: &Connection, kind: &IdentityKind) -> Result<ContactId, StoreError> {
    let result = conn.query_row(&format!(r#"SELECT "contactId" FROM "{}" WHERE "identity" = ?1"#, IDENTITIES_TABLE), params![kind.as_str()], |row| row.get::<_, i64>(0));
    match result {
        Ok(row_id) => Ok(ContactId::from_row_id(row_id)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(ContactId::NONE),
        Err(e) => Err(StoreError::from(e)),
    }
}

pub fn self_contact_id(conn: &Connection) -> Result<ContactId, StoreError> { get_identity(conn, &IdentityKind::SelfContact) }

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        conn
    }

    #[test]
    fn set_then_clear_removes_the_entry() {
        let conn = conn();
        set_identity(&conn, &IdentityKind::SelfContact, ContactId::new(5)).unwrap();
        assert_eq!(get_identity(&conn, &IdentityKind::SelfContact).unwrap(), ContactId::new(5));

        set_identity(&conn, &IdentityKind::SelfContact, ContactId::NONE).unwrap();
        assert_eq!(get_identity(&conn, &IdentityKind::SelfContact).unwrap(), ContactId::NONE);
    }

    #[test]
    fn set_twice_upserts_rather_than_conflicts() {
        let conn = conn();
        set_identity(&conn, &IdentityKind::SelfContact, ContactId::new(5)).unwrap();
        set_identity(&conn, &IdentityKind::SelfContact, ContactId::new(9)).unwrap();
        assert_eq!(get_identity(&conn, &IdentityKind::SelfContact).unwrap(), ContactId::new(9));
    }

    #[test]
    fn unset_kind_reads_as_none() {
        let conn = conn();
        assert_eq!(get_identity(&conn, &IdentityKind::Other("Whatever".into())).unwrap(), ContactId::NONE);
    }
}
