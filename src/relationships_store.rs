//! Relationship store (C4, spec.md §4.2). Grounded on
//! `findRelatedForAggregate` / the commented-out batch-insert path in
//! `original_source/src/engine/contactwriter.cpp`; the REDESIGN FLAG replaces
//! that row-by-row insert (and its abandoned UNION-SELECT chain) with a
//! single multi-row `INSERT`.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection};

use crate::codec;
use crate::contact::ContactId;
use crate::error::{ErrorMap, WriteError};
use crate::relationship::{Relationship, AGGREGATES, IS_NOT};
use crate::schema::RELATIONSHIPS_TABLE;

fn load_existing(conn: &Connection) -> Result<HashMap<ContactId, HashSet<(String, ContactId)>>, WriteError> {
    let mut stmt = conn.prepare(&format!(r#"SELECT "firstId","secondId","type" FROM "{}""#, RELATIONSHIPS_TABLE))?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?)))?;
    let mut map: HashMap<ContactId, HashSet<(String, ContactId)>> = HashMap::new();
    for row in rows {
        let (first, second, kind) = row?;
        map.entry(ContactId::from_row_id(first)).or_default().insert((kind, ContactId::from_row_id(second)));
    }
    Ok(map)
}

/// Batch save (spec.md §4.2). Pre-loads the existing triple set, rejects
/// structurally invalid entries per-index, silently drops duplicates, and
/// persists the survivors in one multi-row insert.
pub fn save(conn: &Connection, relationships: &[Relationship]) -> Result<ErrorMap, WriteError> {
    let mut existing = load_existing(conn)?;
    let mut errors = ErrorMap::new();
    let mut to_insert: Vec<&Relationship> = Vec::new();

    for (i, rel) in relationships.iter().enumerate() {
        if rel.first.is_none() || rel.second.is_none() || rel.is_self_relationship() {
            errors.insert(i, WriteError::InvalidRelationship);
            continue;
        }
        if !codec::contact_exists(conn, rel.first)? || !codec::contact_exists(conn, rel.second)? {
            errors.insert(i, WriteError::InvalidRelationship);
            continue;
        }

        let key = (rel.kind.as_str().to_string(), rel.second);
        let is_duplicate = existing.get(&rel.first).map(|set| set.contains(&key)).unwrap_or(false);
        if is_duplicate {
            continue;
        }
        existing.entry(rel.first).or_default().insert(key);
        to_insert.push(rel);
    }

    if !to_insert.is_empty() {
        insert_batch(conn, &to_insert)?;
    }

    Ok(errors)
}

fn insert_batch(conn: &Connection, relationships: &[&Relationship]) -> Result<(), WriteError> {
    let mut sql = format!(r#"INSERT INTO "{}" ("firstId","secondId","type") VALUES "#, RELATIONSHIPS_TABLE);
    let mut values: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(relationships.len() * 3);
    for (i, rel) in relationships.iter().enumerate() {
        if i > 0 {
            sql.push(',');
        }
        let base = i * 3;
        sql.push_str(&format!("(?{},?{},?{})", base + 1, base + 2, base + 3));
        values.push(Box::new(rel.first.row_id()));
        values.push(Box::new(rel.second.row_id()));
        values.push(Box::new(rel.kind.as_str().to_string()));
    }
    let refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|b| b.as_ref()).collect();
    conn.execute(&sql, refs.as_slice())?;
    Ok(())
}

/// Batch remove (spec.md §4.2). Duplicate removals within the batch are
/// ignored; each remaining item is deleted independently and best-effort —
/// one item's store failure doesn't stop the rest.
pub fn remove(conn: &Connection, relationships: &[Relationship]) -> Result<ErrorMap, WriteError> {
    let mut errors = ErrorMap::new();
    let mut seen: HashSet<(ContactId, ContactId, String)> = HashSet::new();

    for (i, rel) in relationships.iter().enumerate() {
        let key = (rel.first, rel.second, rel.kind.as_str().to_string());
        if !seen.insert(key) {
            continue;
        }
        match delete_one(conn, rel) {
            Ok(true) => {}
            Ok(false) => {
                errors.insert(i, WriteError::DoesNotExist);
            }
            Err(e) => {
                errors.insert(i, WriteError::from(e));
            }
        }
    }

    Ok(errors)
}

fn delete_one(conn: &Connection, rel: &Relationship) -> Result<bool, rusqlite::Error> {
    let changed = conn.execute(
        &format!(r#"DELETE FROM "{}" WHERE "firstId" = ?1 AND "secondId" = ?2 AND "type" = ?3"#, RELATIONSHIPS_TABLE),
        params![rel.first.row_id(), rel.second.row_id(), rel.kind.as_str()],
    )?;
    Ok(changed > 0)
}

pub fn aggregates_of(conn: &Connection, constituent: ContactId) -> Result<Vec<ContactId>, crate::error::StoreError> {
    let mut stmt = conn.prepare(&format!(r#"SELECT "firstId" FROM "{}" WHERE "secondId" = ?1 AND "type" = ?2"#, RELATIONSHIPS_TABLE))?;
    let ids = stmt.query_map(params![constituent.row_id(), AGGREGATES], |row| row.get::<_, i64>(0))?.filter_map(|r| r.ok()).map(ContactId::from_row_id).collect();
    Ok(ids)
}

pub fn constituents_of(conn: &Connection, aggregate: ContactId) -> Result<Vec<ContactId>, crate::error::StoreError> {
    let mut stmt = conn.prepare(&format!(r#"SELECT "secondId" FROM "{}" WHERE "firstId" = ?1 AND "type" = ?2"#, RELATIONSHIPS_TABLE))?;
    let ids = stmt.query_map(params![aggregate.row_id(), AGGREGATES], |row| row.get::<_, i64>(0))?.filter_map(|r| r.ok()).map(ContactId::from_row_id).collect();
    Ok(ids)
}

/// True if an `IsNot` edge exists between `a` and `b` in either direction
/// (spec.md §4.3 rule 1).
pub fn is_not_related(conn: &Connection, a: ContactId, b: ContactId) -> Result<bool, crate::error::StoreError> {
    let count: i64 = conn.query_row(
        &format!(r#"SELECT COUNT(*) FROM "{}" WHERE "type" = ?1 AND (("firstId" = ?2 AND "secondId" = ?3) OR ("firstId" = ?3 AND "secondId" = ?2))"#, RELATIONSHIPS_TABLE),
        params![IS_NOT, a.row_id(), b.row_id()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_aggregates_edge(conn: &Connection, aggregate: ContactId, constituent: ContactId) -> Result<(), crate::error::StoreError> {
    conn.execute(
        &format!(r#"INSERT OR IGNORE INTO "{}" ("firstId","secondId","type") VALUES (?1,?2,?3)"#, RELATIONSHIPS_TABLE),
        params![aggregate.row_id(), constituent.row_id(), AGGREGATES],
    )?;
    Ok(())
}

pub fn delete_all_for_contact(conn: &Connection, id: ContactId) -> Result<(), crate::error::StoreError> {
    conn.execute(&format!(r#"DELETE FROM "{}" WHERE "firstId" = ?1 OR "secondId" = ?1"#, RELATIONSHIPS_TABLE), params![id.row_id()])?;
    Ok(())
}

/// Aggregates with no outgoing `Aggregates` edge left (spec.md §4.6.7 step 4).
pub fn orphan_aggregate_ids(conn: &Connection) -> Result<Vec<ContactId>, crate::error::StoreError> {
    let mut stmt = conn.prepare(&format!(
        r#"SELECT "contactId" FROM "Contacts" WHERE "syncTarget" = 'aggregate'
           AND "contactId" NOT IN (SELECT DISTINCT "firstId" FROM "{}" WHERE "type" = ?1)"#,
        RELATIONSHIPS_TABLE
    ))?;
    let ids = stmt.query_map(params![AGGREGATES], |row| row.get::<_, i64>(0))?.filter_map(|r| r.ok()).map(ContactId::from_row_id).collect();
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::RelationshipKind;

    fn open_with_contacts(n: i64) -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::schema::create_all(&conn).unwrap();
        for i in 0..n {
            conn.execute(
                r#"INSERT INTO "Contacts" ("syncTarget") VALUES (?1)"#,
                params![if i == 0 { "aggregate" } else { "local" }],
            )
            .unwrap();
        }
        conn
    }

    #[test]
    fn save_drops_exact_duplicates_within_and_across_calls() {
        let conn = open_with_contacts(2);
        let a = ContactId::from_row_id(0);
        let b = ContactId::from_row_id(1);
        let rel = Relationship::aggregates(a, b);

        let errors = save(&conn, &[rel.clone(), rel.clone()]).unwrap();
        assert!(errors.is_empty());
        let count: i64 = conn.query_row(r#"SELECT COUNT(*) FROM "Relationships""#, [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);

        let errors = save(&conn, std::slice::from_ref(&rel)).unwrap();
        assert!(errors.is_empty());
        let count: i64 = conn.query_row(r#"SELECT COUNT(*) FROM "Relationships""#, [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1, "idempotent across separate save calls");
    }

    #[test]
    fn save_rejects_self_relationships() {
        let conn = open_with_contacts(1);
        let a = ContactId::from_row_id(0);
        let rel = Relationship::new(a, a, RelationshipKind::Aggregates);

        let errors = save(&conn, &[rel]).unwrap();
        assert!(matches!(errors.get(&0), Some(WriteError::InvalidRelationship)));
    }

    #[test]
    fn remove_reports_does_not_exist_for_missing_triple() {
        let conn = open_with_contacts(2);
        let a = ContactId::from_row_id(0);
        let b = ContactId::from_row_id(1);
        let rel = Relationship::aggregates(a, b);

        let errors = remove(&conn, &[rel]).unwrap();
        assert!(matches!(errors.get(&0), Some(WriteError::DoesNotExist)));
    }
}
