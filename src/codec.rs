//! Row codec (C2): binds a contact's scalar header and each detail kind to
//! parametrized inserts. Inverse-free — the reader subsystem handles turning
//! rows back into `Contact` values (spec.md §2).

use rusqlite::Connection;

use crate::contact::{Contact, ContactId, SyncTarget};
use crate::detail::{Detail, DetailKind, DetailMask};
use crate::error::{StoreError, WriteError};
use crate::external::PhoneNormalizer;
use crate::presence;
use crate::schema::{self, DETAILS_TABLE};

fn dt_to_string(dt: Option<chrono::DateTime<chrono::Utc>>) -> Option<String> { dt.map(|d| d.to_rfc3339()) }

fn string_to_dt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> {
    s.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&chrono::Utc))
}

/// Insert the header row; the store assigns a rowid which becomes the new
/// local id (spec.md §4.6.2).
pub fn insert_header(conn: &Connection, contact: &Contact) -> Result<ContactId, StoreError> {
    conn.execute(
        r#"INSERT INTO "Contacts"
           ("displayLabel","firstName","lastName","middleName","prefix","suffix","customLabel",
            "syncTarget","created","modified","gender","isFavorite")
           VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)"#,
        rusqlite::params![
            contact.display_label,
            contact.name.first,
            contact.name.last,
            contact.name.middle,
            contact.name.prefix,
            contact.name.suffix,
            contact.name.custom_label,
            contact.sync_target.as_str(),
            dt_to_string(contact.created),
            dt_to_string(contact.modified),
            contact.gender.0,
            contact.favorite as i64,
        ],
    )?;
    Ok(ContactId::from_row_id(conn.last_insert_rowid()))
}

/// Rewrite the header row for an existing contact (spec.md §4.6.3).
pub fn update_header(conn: &Connection, id: ContactId, contact: &Contact) -> Result<(), StoreError> {
    conn.execute(
        r#"UPDATE "Contacts" SET
            "displayLabel" = ?1, "firstName" = ?2, "lastName" = ?3, "middleName" = ?4,
            "prefix" = ?5, "suffix" = ?6, "customLabel" = ?7, "syncTarget" = ?8,
            "created" = ?9, "modified" = ?10, "gender" = ?11, "isFavorite" = ?12
           WHERE "contactId" = ?13"#,
        rusqlite::params![
            contact.display_label,
            contact.name.first,
            contact.name.last,
            contact.name.middle,
            contact.name.prefix,
            contact.name.suffix,
            contact.name.custom_label,
            contact.sync_target.as_str(),
            dt_to_string(contact.created),
            dt_to_string(contact.modified),
            contact.gender.0,
            contact.favorite as i64,
            id.row_id(),
        ],
    )?;
    Ok(())
}

/// Delete the header row outright — used to roll back a failed `create`
/// in addition to transaction rollback (spec.md §4.6.2).
pub fn delete_header(conn: &Connection, id: ContactId) -> Result<(), StoreError> {
    conn.execute(r#"DELETE FROM "Contacts" WHERE "contactId" = ?1"#, rusqlite::params![id.row_id()])?;
    Ok(())
}

/// Read just the sync-target of an existing row, if present.
pub fn read_sync_target(conn: &Connection, id: ContactId) -> Result<Option<SyncTarget>, StoreError> {
    let result = conn.query_row(r#"SELECT "syncTarget" FROM "Contacts" WHERE "contactId" = ?1"#, rusqlite::params![id.row_id()], |row| {
        row.get::<_, String>(0)
    });
    match result {
        Ok(tag) => Ok(Some(SyncTarget::from_str(&tag))),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::from(e)),
    }
}

pub fn contact_exists(conn: &Connection, id: ContactId) -> Result<bool, StoreError> { Ok(read_sync_target(conn, id)?.is_some()) }

/// List every contact id currently present in the header table.
pub fn existing_ids(conn: &Connection) -> Result<Vec<ContactId>, StoreError> {
    let mut stmt = conn.prepare(r#"SELECT "contactId" FROM "Contacts""#)?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?.filter_map(|r| r.ok()).map(ContactId::from_row_id).collect();
    Ok(ids)
}

/// The scalar value fields of a detail kind, in the same order as
/// `schema::detail_value_columns`. Shared with `delta`'s superset
/// elimination pass so both stay in lockstep with the per-kind tables.
pub(crate) fn value_params(kind: &DetailKind) -> Vec<String> {
    match kind {
        DetailKind::Address { street, locality, region, postcode, country, po_box } => {
            vec![street.clone(), locality.clone(), region.clone(), postcode.clone(), country.clone(), po_box.clone()]
        }
        DetailKind::Anniversary { original_date, sub_type } => vec![original_date.clone(), sub_type.clone()],
        DetailKind::Avatar { image_url, video_url } => vec![image_url.clone(), video_url.clone()],
        DetailKind::Birthday { date } => vec![date.clone()],
        DetailKind::EmailAddress { address } => vec![address.clone()],
        DetailKind::GlobalPresence { state, timestamp, nickname, message } => {
            vec![state.code().to_string(), timestamp.clone(), nickname.clone(), message.clone()]
        }
        DetailKind::Guid { guid } => vec![guid.clone()],
        DetailKind::Hobby { hobby } => vec![hobby.clone()],
        DetailKind::Nickname { nickname } => vec![nickname.clone()],
        DetailKind::Note { note } => vec![note.clone()],
        DetailKind::OnlineAccount { account_uri, protocol, service_provider } => {
            vec![account_uri.clone(), protocol.clone(), service_provider.clone()]
        }
        DetailKind::Organization { name, role, title, department } => vec![name.clone(), role.clone(), title.clone(), department.clone()],
        DetailKind::PhoneNumber { number, normalized_number, sub_types } => {
            vec![number.clone(), normalized_number.clone(), sub_types.join(";")]
        }
        DetailKind::Presence { state, timestamp, nickname, message } => {
            vec![state.code().to_string(), timestamp.clone(), nickname.clone(), message.clone()]
        }
        DetailKind::Ringtone { audio_ringtone_url } => vec![audio_ringtone_url.clone()],
        DetailKind::Tag { tag } => vec![tag.clone()],
        DetailKind::Url { url } => vec![url.clone()],
        DetailKind::TpMetadata { telepathy_id, account_id } => vec![telepathy_id.clone(), account_id.clone()],
        DetailKind::Type { value } => vec![value.clone()],
    }
}

/// Delete all existing rows for `(contactId, kind)` in both the kind-specific
/// table and the generic `Details` table (spec.md §4.6.4).
fn delete_detail_rows(conn: &Connection, id: ContactId, kind: &str) -> Result<(), StoreError> {
    let table = schema::detail_table_name(kind);
    conn.execute(&format!(r#"DELETE FROM "{}" WHERE "contactId" = ?1"#, table), rusqlite::params![id.row_id()])?;
    conn.execute(
        &format!(r#"DELETE FROM "{}" WHERE "contactId" = ?1 AND "detail" = ?2"#, DETAILS_TABLE),
        rusqlite::params![id.row_id(), kind],
    )?;
    Ok(())
}

fn insert_detail_row(conn: &Connection, id: ContactId, detail_id: i64, detail: &Detail) -> Result<(), StoreError> {
    let kind = detail.kind_name();
    let table = schema::detail_table_name(kind);
    let columns = schema::detail_value_columns(kind);
    let values = value_params(&detail.kind);
    debug_assert_eq!(columns.len(), values.len());

    let mut col_list = String::from(r#""contactId","detailId""#);
    let mut placeholders = String::from("?1,?2");
    for (i, col) in columns.iter().enumerate() {
        col_list.push_str(&format!(r#","{}""#, col));
        placeholders.push_str(&format!(",?{}", i + 3));
    }
    let query = format!(r#"INSERT INTO "{}" ({}) VALUES ({})"#, table, col_list, placeholders);

    let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(id.row_id()), Box::new(detail_id)];
    for v in values {
        params.push(Box::new(v));
    }
    let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|b| b.as_ref()).collect();
    conn.execute(&query, param_refs.as_slice())?;

    conn.execute(
        &format!(
            r#"INSERT INTO "{}" ("contactId","detail","detailId","detailUri","linkedDetailUris","contexts","accessConstraints")
               VALUES (?1,?2,?3,?4,?5,?6,?7)"#,
            DETAILS_TABLE
        ),
        rusqlite::params![
            id.row_id(),
            kind,
            detail_id,
            detail.envelope.uri,
            detail.envelope.linked_uris.join(";"),
            detail.envelope.contexts.join(";"),
            detail.envelope.constraints.to_bits(),
        ],
    )?;
    Ok(())
}

/// Write every table-backed detail on `contact` (spec.md §4.6.4). For every
/// kind in the full known set, if the mask allows it, clears existing rows
/// for that `(contactId, kind)` pair and inserts one row per detail in input
/// order. `Presence` (and the derived `GlobalPresence`) route through the
/// presence reducer (C9) instead of the generic per-kind sweep.
pub fn write_details(
    conn: &Connection,
    id: ContactId,
    details: &[Detail],
    mask: &DetailMask,
    phone_normalizer: &dyn PhoneNormalizer,
) -> Result<Option<Detail>, WriteError> {
    // Unknown detail kind would fail validation before any write; the typed
    // `DetailKind` enum makes this unreachable in practice, but the check is
    // kept to document the invariant (spec.md §4.6.4).
    for d in details {
        if !DetailKind::all_kind_names().contains(&d.kind_name()) {
            return Err(WriteError::InvalidDetail(format!("unknown detail kind {}", d.kind_name())));
        }
    }

    let mut normalized: Vec<Detail> = Vec::with_capacity(details.len());
    for d in details {
        if let DetailKind::PhoneNumber { number, sub_types, .. } = &d.kind {
            let mut nd = d.clone();
            nd.kind = DetailKind::PhoneNumber {
                number: number.clone(),
                normalized_number: phone_normalizer.normalize(number),
                sub_types: sub_types.clone(),
            };
            normalized.push(nd);
        } else {
            normalized.push(d.clone());
        }
    }

    for kind in DetailKind::all_kind_names() {
        if *kind == "Presence" || *kind == "GlobalPresence" {
            continue;
        }
        if !mask.allows(kind) {
            continue;
        }
        delete_detail_rows(conn, id, kind)?;
        let mut detail_id = 1i64;
        for d in normalized.iter().filter(|d| d.kind_name() == *kind) {
            insert_detail_row(conn, id, detail_id, d)?;
            detail_id += 1;
        }
    }

    let presence_details: Vec<Detail> = normalized.into_iter().filter(|d| d.kind_name() == "Presence").collect();
    if mask.allows("Presence") || mask.allows("GlobalPresence") {
        presence::write_presence(conn, id, &presence_details)
    } else {
        Ok(None)
    }
}

pub fn parse_dt(s: Option<String>) -> Option<chrono::DateTime<chrono::Utc>> { string_to_dt(s) }
