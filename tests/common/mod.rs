//! Shared test doubles for the orchestrator's injected collaborators
//! (spec.md §1 "External interfaces"). `SqliteTestReader` materializes
//! `Contact` values straight off the documented persistent schema (spec.md
//! §6) — a stand-in for whatever reader subsystem a host would plug in.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use contactdb_writer::{
    AccessConstraints, Contact, ContactId, Detail, DetailEnvelope, DetailKind, DetailMask, FetchHint, Gender, NameParts,
    NotificationSink, PhoneNormalizer, PresenceState, Reader, RetrievalError, SyncTarget,
};
use rusqlite::Connection;

/// Scalar value column names per detail kind, mirroring spec.md §6's
/// per-kind tables.
fn value_columns(kind: &str) -> &'static [&'static str] {
    match kind {
        "Address" => &["street", "locality", "region", "postcode", "country", "poBox"],
        "Anniversary" => &["originalDate", "subType"],
        "Avatar" => &["imageUrl", "videoUrl"],
        "Birthday" => &["date"],
        "EmailAddress" => &["address"],
        "GlobalPresence" => &["state", "timestamp", "nickname", "message"],
        "Guid" => &["guid"],
        "Hobby" => &["hobby"],
        "Nickname" => &["nickname"],
        "Note" => &["note"],
        "OnlineAccount" => &["accountUri", "protocol", "serviceProvider"],
        "Organization" => &["name", "role", "title", "department"],
        "PhoneNumber" => &["number", "normalizedNumber", "subTypes"],
        "Presence" => &["state", "timestamp", "nickname", "message"],
        "Ringtone" => &["audioRingtoneUrl"],
        "Tag" => &["tag"],
        "Url" => &["url"],
        "TpMetadata" => &["telepathyId", "accountId"],
        "Type" => &["value"],
        _ => &[],
    }
}

fn table_name(kind: &str) -> String { format!("{kind}s") }

fn build_detail_kind(kind: &str, values: &[String]) -> DetailKind {
    let v = |i: usize| values.get(i).cloned().unwrap_or_default();
    match kind {
        "Address" => DetailKind::Address { street: v(0), locality: v(1), region: v(2), postcode: v(3), country: v(4), po_box: v(5) },
        "Anniversary" => DetailKind::Anniversary { original_date: v(0), sub_type: v(1) },
        "Avatar" => DetailKind::Avatar { image_url: v(0), video_url: v(1) },
        "Birthday" => DetailKind::Birthday { date: v(0) },
        "EmailAddress" => DetailKind::EmailAddress { address: v(0) },
        "GlobalPresence" => {
            DetailKind::GlobalPresence { state: PresenceState::from_code(v(0).parse().unwrap_or(99)), timestamp: v(1), nickname: v(2), message: v(3) }
        }
        "Guid" => DetailKind::Guid { guid: v(0) },
        "Hobby" => DetailKind::Hobby { hobby: v(0) },
        "Nickname" => DetailKind::Nickname { nickname: v(0) },
        "Note" => DetailKind::Note { note: v(0) },
        "OnlineAccount" => DetailKind::OnlineAccount { account_uri: v(0), protocol: v(1), service_provider: v(2) },
        "Organization" => DetailKind::Organization { name: v(0), role: v(1), title: v(2), department: v(3) },
        "PhoneNumber" => DetailKind::PhoneNumber { number: v(0), normalized_number: v(1), sub_types: v(2).split(';').filter(|s| !s.is_empty()).map(String::from).collect() },
        "Presence" => {
            DetailKind::Presence { state: PresenceState::from_code(v(0).parse().unwrap_or(99)), timestamp: v(1), nickname: v(2), message: v(3) }
        }
        "Ringtone" => DetailKind::Ringtone { audio_ringtone_url: v(0) },
        "Tag" => DetailKind::Tag { tag: v(0) },
        "Url" => DetailKind::Url { url: v(0) },
        "TpMetadata" => DetailKind::TpMetadata { telepathy_id: v(0), account_id: v(1) },
        "Type" => DetailKind::Type { value: v(0) },
        other => unreachable!("unknown detail kind {other}"),
    }
}

fn read_kind_rows(conn: &Connection, row_id: i64, kind: &str) -> rusqlite::Result<Vec<Detail>> {
    let columns = value_columns(kind);
    if columns.is_empty() {
        return Ok(Vec::new());
    }
    let col_list: String = columns.iter().map(|c| format!(r#""{c}""#)).collect::<Vec<_>>().join(",");
    let table = table_name(kind);
    let query = format!(r#"SELECT "detailId",{col_list} FROM "{table}" WHERE "contactId" = ?1 ORDER BY "detailId""#);
    let mut stmt = conn.prepare(&query)?;
    let mut out = Vec::new();
    let mut rows = stmt.query([row_id])?;
    while let Some(row) = rows.next()? {
        let detail_id: i64 = row.get(0)?;
        let values: Vec<String> = (0..columns.len()).map(|i| row.get::<_, String>(i + 1).unwrap_or_default()).collect();

        let envelope = conn
            .query_row(
                r#"SELECT "detailUri","linkedDetailUris","contexts","accessConstraints" FROM "Details"
                   WHERE "contactId" = ?1 AND "detail" = ?2 AND "detailId" = ?3"#,
                rusqlite::params![row_id, kind, detail_id],
                |r| {
                    Ok(DetailEnvelope {
                        uri: r.get::<_, Option<String>>(0)?,
                        linked_uris: r.get::<_, String>(1)?.split(';').filter(|s| !s.is_empty()).map(String::from).collect(),
                        contexts: r.get::<_, String>(2)?.split(';').filter(|s| !s.is_empty()).map(String::from).collect(),
                        constraints: AccessConstraints::from_bits(r.get::<_, i64>(3)?),
                    })
                },
            )
            .unwrap_or_default();

        out.push(Detail { kind: build_detail_kind(kind, &values), envelope });
    }
    Ok(out)
}

fn read_contact_blocking(path: &PathBuf, id: ContactId, mask: &DetailMask) -> Option<Contact> {
    let conn = Connection::open(path).expect("open test db");
    let row_id = id.get() - 1;

    let header = conn.query_row(
        r#"SELECT "displayLabel","firstName","lastName","middleName","prefix","suffix","customLabel",
                  "syncTarget","created","modified","gender","isFavorite"
           FROM "Contacts" WHERE "contactId" = ?1"#,
        [row_id],
        |row| {
            Ok((
                row.get::<_, Option<String>>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, i64>(11)?,
            ))
        },
    );

    let (display_label, first, last, middle, prefix, suffix, custom_label, sync_target, created, modified, gender, favorite) = match header {
        Ok(h) => h,
        Err(rusqlite::Error::QueryReturnedNoRows) => return None,
        Err(e) => panic!("test reader header query failed: {e}"),
    };

    let mut contact = Contact::new(SyncTarget::from_str(&sync_target));
    contact.id = id;
    contact.display_label = display_label.unwrap_or_default();
    contact.name = NameParts { first, last, middle, prefix, suffix, custom_label };
    contact.created = created.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&chrono::Utc));
    contact.modified = modified.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&chrono::Utc));
    contact.gender = Gender(gender);
    contact.favorite = favorite != 0;

    for kind in DetailKind::all_kind_names() {
        if !mask.allows(kind) {
            continue;
        }
        let rows = read_kind_rows(&conn, row_id, kind).unwrap_or_default();
        contact.details.extend(rows);
    }

    Some(contact)
}

/// A `Reader` backed by a real SQLite file shared with the `ContactWriter`
/// under test, so the orchestrator's aggregation lookups see committed data.
pub struct SqliteTestReader {
    path: PathBuf,
}

impl SqliteTestReader {
    pub fn new(path: PathBuf) -> Self { SqliteTestReader { path } }
}

#[async_trait]
impl Reader for SqliteTestReader {
    async fn read_contacts(&self, ids: &[ContactId], hint: &FetchHint) -> Result<Vec<Contact>, RetrievalError> {
        let path = self.path.clone();
        let ids = ids.to_vec();
        let mask = hint.detail_mask.clone();
        tokio::task::spawn_blocking(move || ids.into_iter().filter_map(|id| read_contact_blocking(&path, id, &mask)).collect())
            .await
            .map_err(|e| RetrievalError::Storage(contactdb_writer::StoreError::TaskJoin(e.to_string())))
    }

    async fn read_all_aggregates(&self, hint: &FetchHint) -> Result<Vec<Contact>, RetrievalError> {
        let path = self.path.clone();
        let mask = hint.detail_mask.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).expect("open test db");
            let mut stmt = conn.prepare(r#"SELECT "contactId" FROM "Contacts" WHERE "syncTarget" = 'aggregate'"#).expect("prepare");
            let row_ids: Vec<i64> = stmt.query_map([], |row| row.get::<_, i64>(0)).expect("query").filter_map(|r| r.ok()).collect();
            drop(stmt);
            row_ids.into_iter().filter_map(|rid| read_contact_blocking(&path, ContactId::new(rid + 1), &mask)).collect::<Vec<Contact>>()
        })
        .await
        .map_err(|e| RetrievalError::Storage(contactdb_writer::StoreError::TaskJoin(e.to_string())))
    }
}

pub struct UppercaseLabeler;
impl contactdb_writer::DisplayLabeler for UppercaseLabeler {
    fn label(&self, contact: &Contact) -> String { format!("{} {}", contact.name.first, contact.name.last).trim().to_string() }
}

pub struct DigitsOnlyNormalizer;
impl PhoneNormalizer for DigitsOnlyNormalizer {
    fn normalize(&self, number: &str) -> String { number.chars().filter(|c| c.is_ascii_digit()).collect() }
}

#[derive(Default)]
pub struct RecordingNotificationSink {
    pub added: Mutex<Vec<ContactId>>,
    pub changed: Mutex<Vec<ContactId>>,
    pub removed: Mutex<Vec<ContactId>>,
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn contacts_added(&self, ids: Vec<ContactId>) { self.added.lock().unwrap().extend(ids); }
    async fn contacts_changed(&self, ids: Vec<ContactId>) { self.changed.lock().unwrap().extend(ids); }
    async fn contacts_removed(&self, ids: Vec<ContactId>) { self.removed.lock().unwrap().extend(ids); }
}

/// A throwaway SQLite file path under the system temp dir, unique enough for
/// concurrent test runs without pulling in a temp-file crate.
pub fn temp_db_path(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
    std::env::temp_dir().join(format!("contactdb-writer-test-{tag}-{}-{nanos}.sqlite3", std::process::id()))
}
