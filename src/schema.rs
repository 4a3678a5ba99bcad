//! DDL for the write path's own tables (spec.md §6 "Persistent schema").
//!
//! SQL dialect and schema provisioning beyond these tables is out of scope
//! (spec.md §1) — this module only owns what nothing else in the system
//! does, mirroring `ankurah_storage_sqlite::engine`'s `create_state_table`.

use rusqlite::Connection;

use crate::error::StoreError;

pub const CONTACTS_TABLE: &str = "Contacts";
pub const RELATIONSHIPS_TABLE: &str = "Relationships";
pub const IDENTITIES_TABLE: &str = "Identities";
pub const DETAILS_TABLE: &str = "Details";

/// Table name for a multi/unique detail kind, e.g. `PhoneNumbers`.
pub fn detail_table_name(kind: &str) -> String { format!("{}s", kind) }

pub fn create_all(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS "Contacts" (
            "contactId" INTEGER PRIMARY KEY,
            "displayLabel" TEXT,
            "firstName" TEXT NOT NULL DEFAULT '',
            "lastName" TEXT NOT NULL DEFAULT '',
            "middleName" TEXT NOT NULL DEFAULT '',
            "prefix" TEXT NOT NULL DEFAULT '',
            "suffix" TEXT NOT NULL DEFAULT '',
            "customLabel" TEXT NOT NULL DEFAULT '',
            "syncTarget" TEXT NOT NULL,
            "created" TEXT,
            "modified" TEXT,
            "gender" TEXT NOT NULL DEFAULT '',
            "isFavorite" INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS "Relationships" (
            "firstId" INTEGER NOT NULL,
            "secondId" INTEGER NOT NULL,
            "type" TEXT NOT NULL,
            PRIMARY KEY ("firstId", "secondId", "type")
        );
        CREATE INDEX IF NOT EXISTS "relationships_first_idx" ON "Relationships"("firstId", "type");
        CREATE INDEX IF NOT EXISTS "relationships_second_idx" ON "Relationships"("secondId", "type");

        CREATE TABLE IF NOT EXISTS "Identities" (
            "identity" TEXT PRIMARY KEY,
            "contactId" INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS "Details" (
            "contactId" INTEGER NOT NULL,
            "detail" TEXT NOT NULL,
            "detailId" INTEGER NOT NULL,
            "detailUri" TEXT,
            "linkedDetailUris" TEXT NOT NULL DEFAULT '',
            "contexts" TEXT NOT NULL DEFAULT '',
            "accessConstraints" INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY ("contactId", "detail", "detailId")
        );
        CREATE INDEX IF NOT EXISTS "details_contact_idx" ON "Details"("contactId", "detail");
        "#,
    )?;

    for kind in crate::detail::DetailKind::all_kind_names() {
        create_detail_table(conn, kind)?;
    }

    Ok(())
}

fn create_detail_table(conn: &Connection, kind: &str) -> Result<(), StoreError> {
    let table = detail_table_name(kind);
    // The generic Details table carries uri/linkedUris/contexts/constraints
    // for every kind (spec.md §6); per-kind tables only need scalar value
    // columns plus a detailId to join back, and contactId for direct scans.
    let columns = detail_value_columns(kind);
    let cols_sql: String = columns.iter().map(|c| format!(r#""{}" TEXT NOT NULL DEFAULT ''"#, c)).collect::<Vec<_>>().join(",\n            ");
    let query = format!(
        r#"CREATE TABLE IF NOT EXISTS "{table}" (
            "contactId" INTEGER NOT NULL,
            "detailId" INTEGER NOT NULL,
            {cols_sql}
        );
        CREATE INDEX IF NOT EXISTS "{table}_contact_idx" ON "{table}"("contactId");
        "#,
        table = table,
        cols_sql = cols_sql,
    );
    conn.execute_batch(&query)?;
    Ok(())
}

/// The scalar value column names for a kind's per-kind table. Must agree
/// with `crate::codec`'s bind/extract logic.
pub fn detail_value_columns(kind: &str) -> &'static [&'static str] {
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
