// SPDX-FileCopyrightText: 2026 Mirrorgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation engine: decides, for every observed event, whether it is
//! new content, an edit, a duplicate, or our own relay coming back.
//!
//! The local write always commits before any mirror or session call, so an
//! external failure only ever leaves a failed relation behind, never a lost
//! message. Every decision between creating and updating a mirror copy is
//! taken under the local message's lock, from state re-read after the lock
//! was acquired, so concurrent live events and retries of one message
//! serialize and converge on a single mirror copy.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use mirrorgate_core::types::{
    Authority, BridgePolicy, ChatPatch, DeliveryStatus, Direction, LocalMessageEvent, Message,
    MirrorCreate, MirrorMessageEvent, MirrorMessageRef, MirrorMetadata, MirrorUpdate, NewMessage,
    Notification, RelationDirection, RelationDraft, RelationFailure, SessionSend, SyncRelation,
    SyncStatus, UpsertOutcome,
};
use mirrorgate_core::{
    ChatStore, FailureKind, MessageStore, MirrorClient, MirrorgateError, Notifier, PolicyStore,
    RelationStore, SessionSender, StorageAdapter,
};
use tracing::{debug, info, warn};

use crate::locks::MessageLocks;
use crate::metrics;
use crate::retry::RetryPolicy;
use crate::tokens;

/// Extension key holding the platform id a mirror reply was delivered under.
pub const DELIVERED_REMOTE_ID: &str = "delivered_remote_id";

const DEFAULT_CONVERSATION_TEMPLATE: &str = "{session}:{chat}";

/// Result of [`ReconciliationEngine::handle_local`].
#[derive(Debug, Clone, PartialEq)]
pub enum LocalOutcome {
    /// Mirroring is disabled for the session. The message is stored.
    Disabled { message_id: i64 },
    /// The chat is on the exclusion list. The message is stored.
    Excluded { message_id: i64 },
    /// A historical message older than the import window.
    OutsideImportWindow { message_id: i64 },
    /// A message deleted before it was ever mirrored.
    DeletedBeforeSync { message_id: i64 },
    /// The platform reporting a mirror reply we delivered.
    Echo { message_id: i64, relation_id: i64 },
    /// A repeat delivery with nothing to push to the mirror.
    Unchanged { message_id: i64, relation_id: i64 },
    /// An edit left alone because the mirror copy is authoritative.
    MirrorAuthoritative { message_id: i64, relation_id: i64 },
    /// The mirror holds the current content. `created` is false for re-syncs.
    Synced { relation: SyncRelation, created: bool },
    /// The mirror call failed; the relation is recorded as failed.
    Failed {
        relation: SyncRelation,
        kind: FailureKind,
    },
}

/// Result of [`ReconciliationEngine::handle_mirror`].
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorOutcome {
    /// The event carries a token we minted: our own relay reflected back.
    Echo { relation_id: i64 },
    /// The mirror message already has a relation.
    Duplicate { relation_id: i64 },
    Disabled,
    Excluded { chat_address: String },
    /// Stored locally and sent through the session.
    Delivered { relation: SyncRelation, message_id: i64 },
    /// Stored locally; the session send failed and is recorded for retry.
    Failed {
        relation: SyncRelation,
        message_id: i64,
        kind: FailureKind,
    },
}

/// Result of [`ReconciliationEngine::retry_relation`].
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Synced(SyncRelation),
    Failed {
        relation: SyncRelation,
        kind: FailureKind,
    },
    Skipped {
        relation_id: i64,
        reason: &'static str,
    },
}

enum Attempt {
    Synced(SyncRelation),
    Failed(SyncRelation, FailureKind),
}

impl Attempt {
    fn into_local(self, created: bool) -> LocalOutcome {
        match self {
            Attempt::Synced(relation) => LocalOutcome::Synced { relation, created },
            Attempt::Failed(relation, kind) => LocalOutcome::Failed { relation, kind },
        }
    }

    fn into_retry(self) -> RetryOutcome {
        match self {
            Attempt::Synced(relation) => RetryOutcome::Synced(relation),
            Attempt::Failed(relation, kind) => RetryOutcome::Failed { relation, kind },
        }
    }
}

/// Bridges one platform session store with the mirror system.
pub struct ReconciliationEngine {
    storage: Arc<dyn StorageAdapter>,
    mirror: Arc<dyn MirrorClient>,
    session: Arc<dyn SessionSender>,
    policies: Arc<dyn PolicyStore>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    conversation_template: String,
    locks: MessageLocks,
}

impl ReconciliationEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        mirror: Arc<dyn MirrorClient>,
        session: Arc<dyn SessionSender>,
        policies: Arc<dyn PolicyStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            storage,
            mirror,
            session,
            policies,
            notifier,
            retry: RetryPolicy::default(),
            conversation_template: DEFAULT_CONVERSATION_TEMPLATE.to_string(),
            locks: MessageLocks::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Template for mirror conversation references; `{session}` and `{chat}`
    /// are substituted.
    pub fn with_conversation_template(mut self, template: impl Into<String>) -> Self {
        self.conversation_template = template.into();
        self
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The mirror conversation reference for a chat.
    pub fn conversation_ref(&self, session_id: &str, chat_address: &str) -> String {
        self.conversation_template
            .replace("{session}", session_id)
            .replace("{chat}", chat_address)
    }

    /// Inverse of [`conversation_ref`](Self::conversation_ref), when the
    /// template allows it.
    pub fn chat_from_conversation(&self, session_id: &str, conversation: &str) -> Option<String> {
        let template = self.conversation_template.replace("{session}", session_id);
        let (prefix, suffix) = template.split_once("{chat}")?;
        let chat = conversation.strip_prefix(prefix)?.strip_suffix(suffix)?;
        (!chat.is_empty()).then(|| chat.to_string())
    }

    // --- Local (platform) events ---

    /// Store a platform message and mirror it.
    pub async fn handle_local(
        &self,
        event: LocalMessageEvent,
    ) -> Result<LocalOutcome, MirrorgateError> {
        tokens::check_session_id(&event.session_id)?;
        let historical = event.historical;
        let new_message = event.into_new_message();
        new_message.validate()?;

        let outcome = self.storage.upsert_message(&new_message).await?;
        self.announce_upsert(&outcome).await;
        let message = &outcome.message;
        let session_id = message.session_id.as_str();
        let chat_address = new_message.chat_address.as_str();

        if let Some(relation) = self
            .storage
            .find_by_source_token(session_id, &tokens::source_token(session_id, &message.remote_id))
            .await?
            .filter(|r| r.direction == RelationDirection::InboundFromMirror)
        {
            debug!(
                session = %session_id,
                remote_id = %message.remote_id,
                relation_id = relation.id,
                "platform echo of a delivered mirror reply"
            );
            return Ok(LocalOutcome::Echo {
                message_id: message.id,
                relation_id: relation.id,
            });
        }

        let policy = self.policies.policy(session_id).await?;
        if !policy.enabled {
            return Ok(LocalOutcome::Disabled {
                message_id: message.id,
            });
        }
        if policy.is_excluded(chat_address) {
            debug!(session = %session_id, chat = %chat_address, "chat excluded from mirroring");
            return Ok(LocalOutcome::Excluded {
                message_id: message.id,
            });
        }

        let _guard = self.locks.lock(message.id).await?;
        // Another attempt may have mirrored or edited the message while we
        // waited, so decide from the committed state.
        let current = self
            .storage
            .get_message(message.id)
            .await?
            .unwrap_or_else(|| message.clone());
        match self.storage.find_by_local_message(current.id).await? {
            None => {
                self.mirror_new_message(&current, chat_address, historical, &policy)
                    .await
            }
            Some(relation) => {
                self.resync_message(relation, &outcome, &current, chat_address, &policy)
                    .await
            }
        }
    }

    async fn mirror_new_message(
        &self,
        message: &Message,
        chat_address: &str,
        historical: bool,
        policy: &BridgePolicy,
    ) -> Result<LocalOutcome, MirrorgateError> {
        if historical && !policy.within_import_window(message.timestamp, Utc::now()) {
            return Ok(LocalOutcome::OutsideImportWindow {
                message_id: message.id,
            });
        }
        if message.is_deleted() {
            return Ok(LocalOutcome::DeletedBeforeSync {
                message_id: message.id,
            });
        }

        let draft = RelationDraft {
            echo_token: Some(tokens::mint_echo_token()),
            source_token: Some(tokens::source_token(&message.session_id, &message.remote_id)),
            ..RelationDraft::outbound(&message.session_id, message.id)
        };
        let relation = self.storage.create_or_update(&draft).await?;
        let attempt = self.push_to_mirror(relation, message, chat_address).await?;
        Ok(attempt.into_local(true))
    }

    /// `outcome` is this event's own upsert; `message` is the current row.
    /// A first insert that finds a relation lost the race to a concurrent
    /// delivery of the same event, which already pushed this content.
    async fn resync_message(
        &self,
        relation: SyncRelation,
        outcome: &UpsertOutcome,
        message: &Message,
        chat_address: &str,
        policy: &BridgePolicy,
    ) -> Result<LocalOutcome, MirrorgateError> {
        let changed = outcome.content_changed || outcome.newly_deleted;
        if relation.direction == RelationDirection::InboundFromMirror || !changed {
            return Ok(LocalOutcome::Unchanged {
                message_id: message.id,
                relation_id: relation.id,
            });
        }
        if message.is_deleted() && relation.mirror_ref().is_none() {
            self.abandon_unmirrored(relation).await?;
            return Ok(LocalOutcome::DeletedBeforeSync {
                message_id: message.id,
            });
        }
        if policy.authoritative == Authority::Mirror && relation.status == SyncStatus::Synced {
            debug!(
                relation_id = relation.id,
                "edit not re-sent, mirror copy is authoritative"
            );
            return Ok(LocalOutcome::MirrorAuthoritative {
                message_id: message.id,
                relation_id: relation.id,
            });
        }

        let relation = self.transition(&relation, SyncStatus::Pending, None).await?;
        let attempt = self.push_to_mirror(relation, message, chat_address).await?;
        Ok(attempt.into_local(false))
    }

    /// Create or update the mirror copy and record the result on the relation.
    async fn push_to_mirror(
        &self,
        relation: SyncRelation,
        message: &Message,
        chat_address: &str,
    ) -> Result<Attempt, MirrorgateError> {
        let metadata = relay_markers(&relation);
        let started = Instant::now();
        let result = match relation.mirror_ref() {
            Some(target) => self
                .mirror
                .update_message(MirrorUpdate {
                    target: target.clone(),
                    content: message.content.clone(),
                    deleted: message.is_deleted(),
                    metadata,
                })
                .await
                .map(|()| target),
            None => {
                self.mirror
                    .create_message(MirrorCreate {
                        session_id: message.session_id.clone(),
                        conversation_ref: self.conversation_ref(&message.session_id, chat_address),
                        chat_address: chat_address.to_string(),
                        direction: message.direction,
                        content: message.content.clone(),
                        metadata,
                    })
                    .await
            }
        };
        metrics::record_mirror_call(started.elapsed().as_secs_f64());

        match result {
            Ok(mirror_ref) => {
                let draft = RelationDraft {
                    mirror_conversation_id: Some(mirror_ref.conversation_id.clone()),
                    mirror_message_id: Some(mirror_ref.message_id.clone()),
                    status: SyncStatus::Synced,
                    ..RelationDraft::outbound(&message.session_id, message.id)
                };
                let relation = self.storage.create_or_update(&draft).await?;
                match relation.mirror_ref() {
                    Some(kept) if kept != mirror_ref => {
                        self.converge_on_kept(relation, kept, mirror_ref, message)
                            .await
                    }
                    _ => Ok(self.synced(relation)),
                }
            }
            Err(e) => self.record_failure(relation, e).await,
        }
    }

    /// The relation already carried mirror ids from another writer, so the
    /// store kept those. The copy just created is orphaned; the kept one is
    /// brought up to the current content.
    async fn converge_on_kept(
        &self,
        relation: SyncRelation,
        kept: MirrorMessageRef,
        orphaned: MirrorMessageRef,
        message: &Message,
    ) -> Result<Attempt, MirrorgateError> {
        metrics::record_mirror_conflict();
        warn!(
            session = %relation.session_id,
            relation_id = relation.id,
            kept = %kept.message_id,
            orphaned = %orphaned.message_id,
            "mirror ids already assigned, updating the kept copy"
        );
        let relation = self.transition(&relation, SyncStatus::Pending, None).await?;
        let result = self
            .mirror
            .update_message(MirrorUpdate {
                target: kept,
                content: message.content.clone(),
                deleted: message.is_deleted(),
                metadata: relay_markers(&relation),
            })
            .await;
        match result {
            Ok(()) => {
                let relation = self.transition(&relation, SyncStatus::Synced, None).await?;
                Ok(self.synced(relation))
            }
            Err(e) => self.record_failure(relation, e).await,
        }
    }

    // --- Mirror-system events ---

    /// Ingest a message created in the mirror system and deliver it through
    /// the session.
    pub async fn handle_mirror(
        &self,
        event: MirrorMessageEvent,
    ) -> Result<MirrorOutcome, MirrorgateError> {
        event.validate()?;
        tokens::check_session_id(&event.session_id)?;
        let session_id = event.session_id.as_str();

        let markers = MirrorMetadata::from_value(&event.metadata);
        if let Some(relation) = self.find_echo(session_id, &markers).await? {
            metrics::record_echo_suppressed();
            debug!(
                session = %session_id,
                mirror_message_id = %event.mirror_message_id,
                relation_id = relation.id,
                "echo of our own relay suppressed"
            );
            return Ok(MirrorOutcome::Echo {
                relation_id: relation.id,
            });
        }

        let mirror_ref = event.mirror_ref();
        if let Some(existing) = self
            .storage
            .find_by_mirror_message(session_id, &mirror_ref)
            .await?
        {
            debug!(relation_id = existing.id, "duplicate mirror event discarded");
            return Ok(MirrorOutcome::Duplicate {
                relation_id: existing.id,
            });
        }

        let policy = self.policies.policy(session_id).await?;
        if !policy.enabled {
            return Ok(MirrorOutcome::Disabled);
        }
        let chat_address = self.resolve_chat_address(&event).await?;
        if policy.is_excluded(&chat_address) {
            return Ok(MirrorOutcome::Excluded { chat_address });
        }
        if !policy.auto_create_chat
            && self
                .storage
                .get_chat(session_id, &chat_address)
                .await?
                .is_none()
        {
            return Err(MirrorgateError::Validation(format!(
                "chat `{chat_address}` does not exist and auto-create is disabled"
            )));
        }

        let new_message = NewMessage {
            session_id: session_id.to_string(),
            chat_address: chat_address.clone(),
            remote_id: mirror_remote_id(&mirror_ref),
            direction: Direction::FromOther,
            content: event.content.clone(),
            sender: None,
            quoted_remote_id: None,
            status: DeliveryStatus::Pending,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
            deleted: false,
            reaction: None,
            metadata: Some(serde_json::json!({
                "mirror_conversation_id": mirror_ref.conversation_id,
                "mirror_message_id": mirror_ref.message_id,
            })),
            chat: ChatPatch::default(),
        };
        let outcome = self.storage.upsert_message(&new_message).await?;
        self.announce_upsert(&outcome).await;
        let message = outcome.message;

        let _guard = self.locks.lock(message.id).await?;
        if let Some(existing) = self.storage.find_by_local_message(message.id).await? {
            debug!(
                relation_id = existing.id,
                "mirror event already ingested by a concurrent delivery"
            );
            return Ok(MirrorOutcome::Duplicate {
                relation_id: existing.id,
            });
        }

        // Pending until the session accepts it, so a crash before delivery
        // leaves something for the sweeper.
        let draft = RelationDraft {
            status: SyncStatus::Pending,
            ..RelationDraft::inbound(session_id, message.id, mirror_ref)
        };
        let relation = self.storage.create_or_update(&draft).await?;
        info!(
            session = %session_id,
            relation_id = relation.id,
            mirror_message_id = %event.mirror_message_id,
            "mirror message ingested"
        );

        let message_id = message.id;
        Ok(
            match self.deliver_to_session(relation, &message, &chat_address).await? {
                Attempt::Synced(relation) => MirrorOutcome::Delivered {
                    relation,
                    message_id,
                },
                Attempt::Failed(relation, kind) => MirrorOutcome::Failed {
                    relation,
                    message_id,
                    kind,
                },
            },
        )
    }

    async fn find_echo(
        &self,
        session_id: &str,
        markers: &MirrorMetadata,
    ) -> Result<Option<SyncRelation>, MirrorgateError> {
        if let Some(token) = &markers.echo_token
            && let Some(relation) = self.storage.find_by_echo_token(session_id, token).await?
        {
            return Ok(Some(relation));
        }
        if let Some(token) = &markers.source_token
            && tokens::source_token_matches_session(token, session_id)
        {
            return self.storage.find_by_source_token(session_id, token).await;
        }
        Ok(None)
    }

    async fn resolve_chat_address(
        &self,
        event: &MirrorMessageEvent,
    ) -> Result<String, MirrorgateError> {
        if let Some(address) = event.chat_address.as_deref().filter(|a| !a.trim().is_empty()) {
            return Ok(address.to_string());
        }
        if let Some(chat) = self
            .storage
            .find_chat_by_mirror_conversation(&event.session_id, &event.conversation_id)
            .await?
        {
            return Ok(chat.address);
        }
        self.chat_from_conversation(&event.session_id, &event.conversation_id)
            .ok_or_else(|| {
                MirrorgateError::Validation(format!(
                    "no chat known for mirror conversation `{}`",
                    event.conversation_id
                ))
            })
    }

    /// Send a mirror reply through the session. On success the platform id
    /// becomes the relation's source token so the platform's own report of
    /// the sent message is recognized as an echo.
    async fn deliver_to_session(
        &self,
        relation: SyncRelation,
        message: &Message,
        chat_address: &str,
    ) -> Result<Attempt, MirrorgateError> {
        let Some(mirror_ref) = relation.mirror_ref() else {
            return Err(MirrorgateError::Internal(format!(
                "inbound relation {} has no mirror identifiers",
                relation.id
            )));
        };
        let sent = self
            .session
            .send(SessionSend {
                session_id: message.session_id.clone(),
                chat_address: chat_address.to_string(),
                content: message.content.clone(),
                quoted_remote_id: message.quoted_remote_id.clone(),
            })
            .await;

        match sent {
            Ok(remote_id) => {
                let mut draft = RelationDraft::inbound(&message.session_id, message.id, mirror_ref);
                draft.source_token = Some(tokens::source_token(&message.session_id, &remote_id));
                draft
                    .extensions
                    .insert(DELIVERED_REMOTE_ID.to_string(), serde_json::json!(remote_id));
                let relation = self.storage.create_or_update(&draft).await?;
                self.storage
                    .update_delivery_status(message.id, DeliveryStatus::Sent)
                    .await?;
                Ok(self.synced(relation))
            }
            Err(e) => self.record_failure(relation, e).await,
        }
    }

    // --- Retry path ---

    /// Re-attempt a pending or failed relation. Mirror identifiers already
    /// recorded are reused, so a retry never creates a second mirror message.
    ///
    /// The passed relation only identifies the work; its state is re-read
    /// under the message lock because a live event may have moved it on.
    pub async fn retry_relation(
        &self,
        relation: SyncRelation,
    ) -> Result<RetryOutcome, MirrorgateError> {
        let relation_id = relation.id;
        let _guard = self.locks.lock(relation.local_message_id).await?;
        let Some(relation) = self.storage.get_relation(relation_id).await? else {
            return Ok(RetryOutcome::Skipped {
                relation_id,
                reason: "relation no longer exists",
            });
        };
        if relation.status == SyncStatus::Synced {
            return Ok(RetryOutcome::Skipped {
                relation_id: relation.id,
                reason: "already synced",
            });
        }
        let Some(message) = self.storage.get_message(relation.local_message_id).await? else {
            return Ok(RetryOutcome::Skipped {
                relation_id: relation.id,
                reason: "message no longer exists",
            });
        };
        let policy = self.policies.policy(&relation.session_id).await?;
        if !policy.enabled {
            return Ok(RetryOutcome::Skipped {
                relation_id: relation.id,
                reason: "mirroring disabled",
            });
        }
        let Some(chat) = self.storage.get_chat_by_id(message.chat_id).await? else {
            return Ok(RetryOutcome::Skipped {
                relation_id: relation.id,
                reason: "chat no longer exists",
            });
        };

        match relation.direction {
            RelationDirection::OutboundToMirror => {
                if message.is_deleted() && relation.mirror_ref().is_none() {
                    return Ok(self.abandon_unmirrored(relation).await?.into_retry());
                }
                let relation = self.transition(&relation, SyncStatus::Pending, None).await?;
                info!(
                    relation_id = relation.id,
                    attempt = relation.retry_count + 1,
                    "retrying mirror sync"
                );
                let attempt = self.push_to_mirror(relation, &message, &chat.address).await?;
                Ok(attempt.into_retry())
            }
            RelationDirection::InboundFromMirror => {
                let relation = self.transition(&relation, SyncStatus::Pending, None).await?;
                if relation.source_token.is_some() {
                    // Delivered earlier; only the status write was lost.
                    let relation = self.transition(&relation, SyncStatus::Synced, None).await?;
                    return Ok(self.synced(relation).into_retry());
                }
                info!(
                    relation_id = relation.id,
                    attempt = relation.retry_count + 1,
                    "retrying session delivery"
                );
                let attempt = self
                    .deliver_to_session(relation, &message, &chat.address)
                    .await?;
                Ok(attempt.into_retry())
            }
        }
    }

    /// Operator-triggered retry of one relation, regardless of backoff.
    pub async fn retry_by_id(&self, relation_id: i64) -> Result<RetryOutcome, MirrorgateError> {
        let relation = self
            .storage
            .get_relation(relation_id)
            .await?
            .ok_or_else(|| MirrorgateError::NotFound {
                entity: "relation",
                key: relation_id.to_string(),
            })?;
        self.retry_relation(relation).await
    }

    // --- Chat administration ---

    /// Delete a chat with its messages and relations.
    pub async fn delete_chat(
        &self,
        session_id: &str,
        address: &str,
    ) -> Result<Option<u64>, MirrorgateError> {
        let removed = self.storage.delete_chat(session_id, address).await?;
        if let Some(relations) = removed {
            info!(session = %session_id, chat = %address, relations, "chat deleted");
            self.notifier.notify(Notification::ChatDeleted {
                session_id: session_id.to_string(),
                address: address.to_string(),
            });
        }
        Ok(removed)
    }

    // --- Bookkeeping ---

    fn synced(&self, relation: SyncRelation) -> Attempt {
        metrics::record_relation_synced();
        info!(
            session = %relation.session_id,
            relation_id = relation.id,
            mirror_message_id = relation.mirror_message_id.as_deref().unwrap_or_default(),
            "relation synced"
        );
        self.notifier.notify(Notification::RelationSynced {
            relation: relation.clone(),
        });
        Attempt::Synced(relation)
    }

    async fn record_failure(
        &self,
        relation: SyncRelation,
        error: MirrorgateError,
    ) -> Result<Attempt, MirrorgateError> {
        let kind = error.failure_kind();
        let attempt = relation.retry_count + 1;
        let failure = RelationFailure {
            kind,
            detail: error.to_string(),
            next_retry_at: self.retry.next_retry_at(attempt, kind, Utc::now()),
        };
        warn!(
            session = %relation.session_id,
            relation_id = relation.id,
            attempt,
            kind = %kind,
            retry_scheduled = failure.next_retry_at.is_some(),
            error = %error,
            "relation sync failed"
        );
        let failed = self
            .transition(&relation, SyncStatus::Failed, Some(&failure))
            .await?;
        metrics::record_relation_failed(kind);
        self.notifier.notify(Notification::RelationFailed {
            relation: failed.clone(),
        });
        Ok(Attempt::Failed(failed, kind))
    }

    /// Permanently fails a relation whose message was deleted before any
    /// mirror copy existed. There is nothing to update and a create would
    /// publish deleted content.
    async fn abandon_unmirrored(&self, relation: SyncRelation) -> Result<Attempt, MirrorgateError> {
        self.record_failure(
            relation,
            MirrorgateError::Validation("message deleted before it was mirrored".to_string()),
        )
        .await
    }

    /// Status write checked against the sync state machine. Synced is only
    /// reached from pending, and a synced relation re-enters pending before
    /// it can fail again.
    async fn transition(
        &self,
        relation: &SyncRelation,
        next: SyncStatus,
        failure: Option<&RelationFailure>,
    ) -> Result<SyncRelation, MirrorgateError> {
        if !relation.status.can_transition_to(next) {
            return Err(MirrorgateError::Conflict {
                entity: "relation",
                key: format!("{} ({} -> {next})", relation.id, relation.status),
            });
        }
        self.storage.update_status(relation.id, next, failure).await
    }

    async fn announce_upsert(&self, outcome: &UpsertOutcome) {
        let message = &outcome.message;
        if outcome.created {
            metrics::record_message_ingested(message.direction);
            match self.storage.get_chat_by_id(message.chat_id).await {
                Ok(Some(chat)) => self.notifier.notify(Notification::ChatUpserted { chat }),
                Ok(None) => {}
                Err(e) => warn!(error = %e, chat_id = message.chat_id, "chat reload failed"),
            }
        }
        let notification = if outcome.newly_deleted {
            Notification::MessageDeleted {
                message: message.clone(),
            }
        } else {
            Notification::MessageUpserted {
                message: message.clone(),
            }
        };
        self.notifier.notify(notification);
    }
}

fn relay_markers(relation: &SyncRelation) -> MirrorMetadata {
    MirrorMetadata {
        echo_token: relation.echo_token.clone(),
        source_token: relation.source_token.clone(),
    }
}

/// Remote id given to local copies of mirror-originated messages.
pub fn mirror_remote_id(mirror: &MirrorMessageRef) -> String {
    format!("mirror:{}:{}", mirror.conversation_id, mirror.message_id)
}
