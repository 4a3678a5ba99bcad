//! Write orchestrator (C8) and crate-shell facade (C0, spec.md §4.6).
//! `ContactWriter` wires the connection pool and injected collaborators
//! together the way `SqliteStorageEngine` wires a `bb8::Pool` plus its
//! `Bucket` implementations in the teacher crate.

use std::sync::Arc;

use crate::codec;
use crate::composer;
use crate::connection::{PooledConnection, SqliteConnectionManager};
use crate::contact::{Contact, ContactId, SyncTarget};
use crate::delta;
use crate::detail::DetailMask;
use crate::error::{ErrorMap, StoreError, WriteError};
use crate::external::{DisplayLabeler, FetchHint, NotificationSink, PhoneNormalizer, Reader};
use crate::identity::{self, IdentityKind};
use crate::matcher;
use crate::relationship::Relationship;
use crate::relationships_store;
use crate::schema;
use crate::txn::{self, TxnState};

/// Tunables for the aggregation policy (spec.md §9 "Configuration").
/// Constructed programmatically — there is no config-file format, matching
/// the teacher crate's own constructor-parameter-only posture.
#[derive(Debug, Clone)]
pub struct ContactWriterConfig {
    /// Minimum `likelihood` score (0..10) for a constituent to join an
    /// existing aggregate rather than spawn a new one.
    pub match_threshold: u8,
    pub aggregation_enabled: bool,
    /// `bb8` pool size. The write path is single-writer (spec.md §5); sizes
    /// above 1 only help if the underlying store tolerates concurrent
    /// connections serializing via its own locking (e.g. file-backed WAL).
    pub pool_size: u32,
}

impl Default for ContactWriterConfig {
    fn default() -> Self { ContactWriterConfig { match_threshold: matcher::MATCH_THRESHOLD, aggregation_enabled: true, pool_size: 1 } }
}

pub struct ContactWriter {
    pool: bb8::Pool<SqliteConnectionManager>,
    reader: Arc<dyn Reader>,
    labeler: Arc<dyn DisplayLabeler>,
    phone_normalizer: Arc<dyn PhoneNormalizer>,
    notifier: Arc<dyn NotificationSink>,
    config: ContactWriterConfig,
    txn: tokio::sync::Mutex<TxnState>,
}

impl ContactWriter {
    pub async fn open(
        path: impl Into<std::path::PathBuf>,
        reader: Arc<dyn Reader>,
        labeler: Arc<dyn DisplayLabeler>,
        phone_normalizer: Arc<dyn PhoneNormalizer>,
        notifier: Arc<dyn NotificationSink>,
        config: ContactWriterConfig,
    ) -> Result<Self, StoreError> {
        Self::build(SqliteConnectionManager::file(path.into()), reader, labeler, phone_normalizer, notifier, config).await
    }

    pub async fn open_in_memory(
        reader: Arc<dyn Reader>,
        labeler: Arc<dyn DisplayLabeler>,
        phone_normalizer: Arc<dyn PhoneNormalizer>,
        notifier: Arc<dyn NotificationSink>,
        mut config: ContactWriterConfig,
    ) -> Result<Self, StoreError> {
        // An in-memory SQLite database lives only on the connection that
        // created it, so pooling more than one would each see an empty store.
        config.pool_size = 1;
        Self::build(SqliteConnectionManager::memory(), reader, labeler, phone_normalizer, notifier, config).await
    }

    async fn build(
        manager: SqliteConnectionManager,
        reader: Arc<dyn Reader>,
        labeler: Arc<dyn DisplayLabeler>,
        phone_normalizer: Arc<dyn PhoneNormalizer>,
        notifier: Arc<dyn NotificationSink>,
        config: ContactWriterConfig,
    ) -> Result<Self, StoreError> {
        let pool = bb8::Pool::builder().max_size(config.pool_size).build(manager).await.map_err(|e| StoreError::Pool(e.to_string()))?;

        let pooled = pool.get().await.map_err(|e| StoreError::Pool(e.to_string()))?;
        let conn: PooledConnection = (*pooled).clone();
        conn.with_connection(|c| schema::create_all(c)).await?;
        drop(pooled);

        Ok(ContactWriter { pool, reader, labeler, phone_normalizer, notifier, config, txn: tokio::sync::Mutex::new(TxnState::default()) })
    }

    async fn conn(&self) -> Result<PooledConnection, WriteError> {
        let pooled = self.pool.get().await.map_err(|e| WriteError::Unspecified(StoreError::Pool(e.to_string())))?;
        Ok((*pooled).clone())
    }

    pub async fn self_contact_id(&self) -> Result<ContactId, WriteError> {
        let conn = self.conn().await?;
        conn.with_connection(identity::self_contact_id).await.map_err(WriteError::from)
    }

    pub async fn set_identity(&self, kind: IdentityKind, id: ContactId) -> Result<(), WriteError> {
        let conn = self.conn().await?;
        txn::begin(&conn).await.map_err(WriteError::from)?;
        let result = conn.with_connection(move |c| identity::set_identity(c, &kind, id)).await;
        let mut state = self.txn.lock().await;
        match result {
            Ok(()) => txn::commit(&conn, &mut state, self.notifier.as_ref()).await.map_err(WriteError::from),
            Err(e) => {
                let _ = txn::rollback(&conn, &mut state).await;
                Err(WriteError::from(e))
            }
        }
    }

    /// `save(contacts, mask)` (spec.md §4.6.1). Top-level entry: dispatches
    /// each input to `create` or `update` by whether its id is zero, within
    /// one transaction.
    pub async fn save(&self, contacts: &mut [Contact], mask: &DetailMask) -> Result<ErrorMap, WriteError> {
        let conn = self.conn().await?;
        self.save_inner(&conn, contacts, mask, false, false).await
    }

    /// `bypass_aggregation` is set only by reentrant saves issued from within
    /// the aggregation pipeline itself (`update_or_create_aggregate`,
    /// `regenerate_aggregates`) so that rewriting an aggregate's own header
    /// and details does not recurse back into `update_local_and_aggregate`
    /// or `update_or_create_aggregate` (spec.md §4.6.3, "not a reentrant call
    /// from the aggregate update path").
    async fn save_inner(
        &self,
        conn: &PooledConnection,
        contacts: &mut [Contact],
        mask: &DetailMask,
        within_txn: bool,
        bypass_aggregation: bool,
    ) -> Result<ErrorMap, WriteError> {
        if !within_txn {
            txn::begin(conn).await.map_err(WriteError::from)?;
        }

        let mut errors = ErrorMap::new();
        let mut newly_added: Vec<usize> = Vec::new();

        for (i, contact) in contacts.iter_mut().enumerate() {
            let was_new = contact.id.is_none();
            let result =
                if was_new { self.create(conn, contact, mask).await } else { self.update(conn, contact, mask, bypass_aggregation).await };
            match result {
                Ok(()) => {
                    if was_new {
                        newly_added.push(i);
                    }
                }
                Err(e) => {
                    errors.insert(i, e);
                }
            }
        }

        if !errors.is_empty() {
            if !within_txn {
                let mut state = self.txn.lock().await;
                let _ = txn::rollback(conn, &mut state).await;
            }
            for i in newly_added {
                contacts[i].id = ContactId::NONE;
                errors.insert(i, WriteError::Locked);
            }
            return Ok(errors);
        }

        if !within_txn {
            let mut state = self.txn.lock().await;
            txn::commit(conn, &mut state, self.notifier.as_ref()).await.map_err(WriteError::from)?;
        }

        Ok(errors)
    }

    /// `create(contact, mask)` (spec.md §4.6.2).
    async fn create(&self, conn: &PooledConnection, contact: &mut Contact, mask: &DetailMask) -> Result<(), WriteError> {
        contact.display_label = self.labeler.label(contact);
        let snapshot = contact.clone();
        let id = conn.with_connection(move |c| codec::insert_header(c, &snapshot)).await.map_err(WriteError::from)?;
        contact.id = id;

        if let Err(e) = self.write(conn, id, contact, mask).await {
            let _ = conn.with_connection(move |c| codec::delete_header(c, id)).await;
            contact.id = ContactId::NONE;
            return Err(e);
        }

        {
            let mut state = self.txn.lock().await;
            state.record_added(id);
        }

        if self.config.aggregation_enabled && !contact.sync_target.is_aggregate() {
            self.update_or_create_aggregate(conn, contact, mask).await?;
        }

        Ok(())
    }

    /// `update(contact, mask)` (spec.md §4.6.3). `bypass_aggregation` is true
    /// only for a reentrant save issued by the aggregation pipeline itself,
    /// in which case an aggregate-typed contact is just rewritten in place
    /// rather than diverted into `update_local_and_aggregate`.
    async fn update(&self, conn: &PooledConnection, contact: &mut Contact, mask: &DetailMask, bypass_aggregation: bool) -> Result<(), WriteError> {
        let id = contact.id;
        let old_sync_target =
            conn.with_connection(move |c| codec::read_sync_target(c, id)).await.map_err(WriteError::from)?.ok_or(WriteError::DoesNotExist)?;

        if old_sync_target != contact.sync_target && !old_sync_target.is_local() {
            return Err(WriteError::InvalidDetail("cannot change sync-target of a non-local contact".into()));
        }

        if self.config.aggregation_enabled && old_sync_target.is_aggregate() && !bypass_aggregation {
            return self.update_local_and_aggregate(conn, contact, mask).await;
        }

        contact.display_label = self.labeler.label(contact);
        let snapshot = contact.clone();
        conn.with_connection(move |c| codec::update_header(c, id, &snapshot)).await.map_err(WriteError::from)?;
        self.write(conn, id, contact, mask).await?;

        {
            let mut state = self.txn.lock().await;
            state.record_changed(id);
        }

        if !contact.sync_target.is_aggregate() {
            let aggregate_ids = conn.with_connection(move |c| relationships_store::aggregates_of(c, id)).await.map_err(WriteError::from)?;
            if !aggregate_ids.is_empty() {
                self.regenerate_aggregates(conn, &aggregate_ids, mask).await?;
            }
        }

        Ok(())
    }

    /// `write(contactId, contact, mask)` (spec.md §4.6.4).
    async fn write(&self, conn: &PooledConnection, id: ContactId, contact: &mut Contact, mask: &DetailMask) -> Result<(), WriteError> {
        let details = contact.details.clone();
        let normalizer = self.phone_normalizer.clone();
        let mask = mask.clone();
        let global_presence = conn.with_connection_as(move |c| codec::write_details(c, id, &details, &mask, normalizer.as_ref())).await?;

        if let Some(global) = global_presence {
            contact.details.retain(|d| d.kind_name() != "GlobalPresence");
            contact.details.push(global);
        }
        Ok(())
    }

    /// `updateOrCreateAggregate(contact, mask)` (spec.md §4.6.5).
    async fn update_or_create_aggregate(&self, conn: &PooledConnection, constituent: &Contact, mask: &DetailMask) -> Result<(), WriteError> {
        let hint = FetchHint { detail_mask: mask.clone() };
        let candidates = self.reader.read_all_aggregates(&hint).await.map_err(WriteError::from)?;

        let mut target: Option<Contact> = None;
        for candidate in candidates {
            let a = constituent.id;
            let b = candidate.id;
            let is_not = conn.with_connection(move |c| relationships_store::is_not_related(c, a, b)).await.map_err(WriteError::from)?;
            if matcher::likelihood(constituent, &candidate, is_not) >= self.config.match_threshold {
                target = Some(candidate);
                break;
            }
        }

        let (mut aggregate, newly_created) = match target {
            Some(agg) => (agg, false),
            None => (Contact::new(SyncTarget::Aggregate), true),
        };

        composer::promote_to_aggregate(constituent, &mut aggregate, mask);
        aggregate.display_label = self.labeler.label(&aggregate);

        let mut batch = [aggregate];
        let errors = self.save_inner(conn, &mut batch, mask, true, true).await?;
        let [aggregate] = batch;

        if let Some(err) = errors.into_values().next() {
            return Err(err);
        }

        let aggregate_id = aggregate.id;
        let constituent_id = constituent.id;
        let rel_result = conn.with_connection(move |c| relationships_store::insert_aggregates_edge(c, aggregate_id, constituent_id)).await;

        if let Err(e) = rel_result {
            if newly_created {
                let _ = conn.with_connection(move |c| codec::delete_header(c, aggregate_id)).await;
            }
            return Err(WriteError::from(e));
        }

        Ok(())
    }

    /// `updateLocalAndAggregate(aggregateContact, mask)` (spec.md §4.6.6).
    async fn update_local_and_aggregate(&self, conn: &PooledConnection, aggregate_contact: &mut Contact, mask: &DetailMask) -> Result<(), WriteError> {
        let hint = FetchHint { detail_mask: mask.clone() };
        let stored = self.reader.read_contact(aggregate_contact.id, &hint).await.map_err(WriteError::from)?.ok_or(WriteError::DoesNotExist)?;

        let detail_delta = delta::calculate_delta(aggregate_contact, &stored, mask);
        let header_delta = delta::calculate_header_delta(aggregate_contact, &stored, mask);
        if detail_delta.added.is_empty() && detail_delta.removed.is_empty() && header_delta.is_empty() {
            return Ok(());
        }

        let aggregate_id = aggregate_contact.id;
        let member_ids = conn.with_connection(move |c| relationships_store::constituents_of(c, aggregate_id)).await.map_err(WriteError::from)?;

        let mut local: Option<Contact> = None;
        for member_id in &member_ids {
            if let Some(candidate) = self.reader.read_contact(*member_id, &FetchHint::default()).await.map_err(WriteError::from)? {
                if candidate.sync_target.is_local() {
                    local = Some(candidate);
                    break;
                }
            }
        }

        let synthesized = local.is_none();
        let mut local = local.unwrap_or_else(|| {
            let mut c = Contact::new(SyncTarget::Local);
            c.name = aggregate_contact.name.clone();
            c
        });

        composer::demote_to_local(&detail_delta.added, &detail_delta.removed, &mut local, mask);
        delta::apply_header_delta(&header_delta, &mut local);

        let mut batch = [local];
        let errors = self.save_inner(conn, &mut batch, mask, true, false).await?;
        let [local] = batch;

        if let Some(err) = errors.into_values().next() {
            // `save_inner` already zeroed the id and marked it `Locked` if it
            // was newly synthesized and failed to persist.
            let _ = synthesized;
            return Err(err);
        }

        let already_regenerated = {
            let state = self.txn.lock().await;
            state.changed.contains(&aggregate_id) || state.added.contains(&aggregate_id)
        };

        if !already_regenerated {
            aggregate_contact.display_label = self.labeler.label(aggregate_contact);
            let snapshot = aggregate_contact.clone();
            conn.with_connection(move |c| codec::update_header(c, aggregate_id, &snapshot)).await.map_err(WriteError::from)?;
            self.write(conn, aggregate_id, aggregate_contact, mask).await?;
            let mut state = self.txn.lock().await;
            state.record_changed(aggregate_id);
        }

        let _ = local;
        Ok(())
    }

    /// `regenerateAggregates(ids, mask)` (spec.md §4.6.8).
    async fn regenerate_aggregates(&self, conn: &PooledConnection, ids: &[ContactId], mask: &DetailMask) -> Result<(), WriteError> {
        if ids.is_empty() {
            return Ok(());
        }

        let hint = FetchHint { detail_mask: DetailMask::all() };
        let mut regenerated = Vec::with_capacity(ids.len());

        for &aggregate_id in ids {
            let member_ids = conn.with_connection(move |c| relationships_store::constituents_of(c, aggregate_id)).await.map_err(WriteError::from)?;
            if member_ids.is_empty() {
                continue;
            }

            let mut constituents = self.reader.read_contacts(&member_ids, &hint).await.map_err(WriteError::from)?;
            let existing = self.reader.read_contact(aggregate_id, &hint).await.map_err(WriteError::from)?;

            let mut fresh = Contact::new(SyncTarget::Aggregate);
            fresh.id = aggregate_id;
            if let Some(existing) = existing {
                fresh.details = existing
                    .details
                    .into_iter()
                    .filter(|d| crate::detail::is_unpromoted_detail_kind(d.kind_name()) || !mask.allows(d.kind_name()))
                    .collect();
            }

            constituents.sort_by_key(|c| if c.sync_target.is_local() { 0 } else { 1 });
            for constituent in &constituents {
                composer::promote_to_aggregate(constituent, &mut fresh, mask);
            }
            fresh.display_label = self.labeler.label(&fresh);

            regenerated.push(fresh);
        }

        if regenerated.is_empty() {
            return Ok(());
        }

        let errors = self.save_inner(conn, &mut regenerated, mask, true, true).await?;
        if let Some(err) = errors.into_values().next() {
            return Err(err);
        }
        Ok(())
    }

    /// `remove(contactIds)` (spec.md §4.6.7).
    pub async fn remove(&self, contact_ids: &[ContactId]) -> Result<ErrorMap, WriteError> {
        let conn = self.conn().await?;
        txn::begin(&conn).await.map_err(WriteError::from)?;

        match self.remove_inner(&conn, contact_ids).await {
            Ok(errors) => {
                let mut state = self.txn.lock().await;
                txn::commit(&conn, &mut state, self.notifier.as_ref()).await.map_err(WriteError::from)?;
                Ok(errors)
            }
            Err(e) => {
                let mut state = self.txn.lock().await;
                let _ = txn::rollback(&conn, &mut state).await;
                Err(e)
            }
        }
    }

    async fn remove_inner(&self, conn: &PooledConnection, contact_ids: &[ContactId]) -> Result<ErrorMap, WriteError> {
        let self_id = conn.with_connection(identity::self_contact_id).await.map_err(WriteError::from)?;
        let existing_ids = conn.with_connection(codec::existing_ids).await.map_err(WriteError::from)?;
        let existing_set: std::collections::HashSet<ContactId> = existing_ids.into_iter().collect();

        let mut errors = ErrorMap::new();
        let mut valid: Vec<ContactId> = Vec::new();
        for (i, &id) in contact_ids.iter().enumerate() {
            if !self_id.is_none() && id == self_id {
                errors.insert(i, WriteError::BadArgument("cannot remove the self-contact".into()));
            } else if !existing_set.contains(&id) {
                errors.insert(i, WriteError::DoesNotExist);
            } else {
                valid.push(id);
            }
        }

        let mut aggregate_ids: Vec<ContactId> = Vec::new();
        let mut constituent_ids: Vec<ContactId> = Vec::new();
        for id in valid {
            let sync_target = conn.with_connection(move |c| codec::read_sync_target(c, id)).await.map_err(WriteError::from)?;
            match sync_target {
                Some(tag) if tag.is_aggregate() => aggregate_ids.push(id),
                _ => constituent_ids.push(id),
            }
        }

        let mut affected_aggregates: std::collections::HashSet<ContactId> = std::collections::HashSet::new();
        for &id in &constituent_ids {
            let parents = conn.with_connection(move |c| relationships_store::aggregates_of(c, id)).await.map_err(WriteError::from)?;
            affected_aggregates.extend(parents);
            self.delete_contact_row(conn, id).await?;
        }

        for &agg_id in &aggregate_ids {
            let members = conn.with_connection(move |c| relationships_store::constituents_of(c, agg_id)).await.map_err(WriteError::from)?;
            for member in members {
                self.delete_contact_row(conn, member).await?;
            }
            self.delete_contact_row(conn, agg_id).await?;
        }

        let orphans = conn.with_connection(relationships_store::orphan_aggregate_ids).await.map_err(WriteError::from)?;
        for orphan in orphans {
            self.delete_contact_row(conn, orphan).await?;
        }

        let mut regen_ids: Vec<ContactId> = Vec::new();
        for agg_id in affected_aggregates {
            if conn.with_connection(move |c| codec::contact_exists(c, agg_id)).await.map_err(WriteError::from)? {
                regen_ids.push(agg_id);
            }
        }
        if !regen_ids.is_empty() {
            self.regenerate_aggregates(conn, &regen_ids, &DetailMask::all()).await?;
        }

        Ok(errors)
    }

    async fn delete_contact_row(&self, conn: &PooledConnection, id: ContactId) -> Result<(), WriteError> {
        conn.with_connection(move |c| {
            relationships_store::delete_all_for_contact(c, id)?;
            codec::delete_header(c, id)
        })
        .await
        .map_err(WriteError::from)?;
        let mut state = self.txn.lock().await;
        state.record_removed(id);
        Ok(())
    }

    /// `save(relationships)` (spec.md §4.2, §5).
    pub async fn save_relationships(&self, relationships: &[Relationship]) -> Result<ErrorMap, WriteError> {
        let conn = self.conn().await?;
        txn::begin(&conn).await.map_err(WriteError::from)?;

        let rels = relationships.to_vec();
        let result = conn.with_connection_as(move |c| relationships_store::save(c, &rels)).await;

        let mut state = self.txn.lock().await;
        match result {
            Ok(errors) => {
                txn::commit(&conn, &mut state, self.notifier.as_ref()).await.map_err(WriteError::from)?;
                Ok(errors)
            }
            Err(e) => {
                let _ = txn::rollback(&conn, &mut state).await;
                Err(e)
            }
        }
    }

    /// `remove(relationships)` (spec.md §4.2, §5).
    pub async fn remove_relationships(&self, relationships: &[Relationship]) -> Result<ErrorMap, WriteError> {
        let conn = self.conn().await?;
        txn::begin(&conn).await.map_err(WriteError::from)?;

        let rels = relationships.to_vec();
        let result = conn.with_connection_as(move |c| relationships_store::remove(c, &rels)).await;

        let mut state = self.txn.lock().await;
        match result {
            Ok(errors) => {
                txn::commit(&conn, &mut state, self.notifier.as_ref()).await.map_err(WriteError::from)?;
                Ok(errors)
            }
            Err(e) => {
                let _ = txn::rollback(&conn, &mut state).await;
                Err(e)
            }
        }
    }
}
