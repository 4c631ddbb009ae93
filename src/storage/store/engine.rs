use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{error, info, warn};

use crate::core::error::HubError;
use crate::core::util::FarcasterTime;
use crate::core::validations::worker::ValidationWorkerPool;
use crate::core::validations::ValidationError;
use crate::jobs::revoke_messages;
use crate::proto::{
    self, message_data::Body, FarcasterNetwork, HubEvent, IdRegisterEventType, MessageType,
    OnChainEvent, SignerEventType, UserDataType,
};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};
use crate::storage::store::account::{
    get_message, make_ts_hash_from_message, type_to_set_postfix, MessagesPage,
    OnchainEventStorageError, UserDataStore, UsernameProofStore,
};
use crate::storage::store::stores::{Limits, StoreLimits, Stores, StoresError};
use crate::storage::trie::errors::TrieError;
use crate::storage::trie::merkle_trie::{MerkleTrie, NodeMetadata, TrieKey};
use crate::utils::statsd_wrapper::StatsdClientWrapper;

/// Stripes for the per-fid submission locks. Writes to one fid serialize;
/// distinct fids proceed in parallel up to the commit section.
const FID_LOCK_STRIPES: usize = 256;

const MAX_SYNC_IDS_PER_PREFIX: usize = 1024;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    TrieError(#[from] TrieError),

    #[error(transparent)]
    StoreError(#[from] HubError),

    #[error("unsupported message type")]
    UnsupportedMessageType(MessageType),

    #[error(transparent)]
    MergeOnchainEventError(#[from] OnchainEventStorageError),

    #[error("Unable to get usage count")]
    UsageCountError,
}

#[derive(Error, Debug)]
pub enum MessageValidationError {
    #[error("message has no data")]
    NoMessageData,

    #[error("unknown fid")]
    MissingFid,

    #[error("invalid signer")]
    MissingSigner,

    #[error(transparent)]
    MessageValidationError(#[from] ValidationError),

    #[error("invalid message type")]
    InvalidMessageType(i32),

    #[error(transparent)]
    StoreError(#[from] HubError),

    #[error("fname is not registered for fid")]
    MissingFname,
}

impl MessageValidationError {
    /// The boundary form: callers never see internal error types, only the
    /// coded taxonomy.
    pub fn into_hub_error(self) -> HubError {
        match self {
            MessageValidationError::StoreError(inner) => inner,
            other => HubError::validation_failure(&other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct Senders {
    pub events_tx: broadcast::Sender<HubEvent>,
}

impl Senders {
    pub fn new() -> Senders {
        let (events_tx, _events_rx) = broadcast::channel::<HubEvent>(10_000);
        Senders { events_tx }
    }
}

/// The state engine: routes validated messages and on-chain events into the
/// typed stores, keeps the sync trie and storage cache in step with every
/// commit, runs the revocation cascades, and feeds the event stream.
pub struct HubEngine {
    pub network: FarcasterNetwork,
    pub db: Arc<RocksDB>,
    stores: Stores,
    /// Owns the trie and doubles as the single-writer commit lock: whoever
    /// holds it builds and commits the next transaction.
    trie: Mutex<MerkleTrie>,
    senders: Senders,
    validation_pool: ValidationWorkerPool,
    fid_locks: Vec<Mutex<()>>,
    statsd: StatsdClientWrapper,
}

impl HubEngine {
    pub async fn new(
        db: Arc<RocksDB>,
        network: FarcasterNetwork,
        store_limits: StoreLimits,
        statsd: StatsdClientWrapper,
        validation_workers: usize,
    ) -> Result<HubEngine, HubError> {
        let mut trie = MerkleTrie::new();
        trie.initialize(&db)
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;

        let stores = Stores::new(db.clone(), network, store_limits)?;

        let engine = HubEngine {
            network,
            db,
            stores,
            trie: Mutex::new(trie),
            senders: Senders::new(),
            validation_pool: ValidationWorkerPool::new(validation_workers, network),
            fid_locks: (0..FID_LOCK_STRIPES).map(|_| Mutex::new(())).collect(),
            statsd,
        };

        // Devnet engines are throwaway test instances; skip migrations there
        if network != FarcasterNetwork::Devnet {
            let runner =
                crate::storage::store::migrations::MigrationRunner::new(engine.db.clone());
            runner.run_pending_migrations().await?;
        }

        Ok(engine)
    }

    pub fn get_stores(&self) -> &Stores {
        &self.stores
    }

    pub fn get_senders(&self) -> Senders {
        self.senders.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.senders.events_tx.subscribe()
    }

    /// Full submission pipeline: pure validation on the worker pool, state
    /// checks against the on-chain views, quota admission, then the merge,
    /// trie update, event append, and commit as one transaction. Quota
    /// pruning rides the same transaction so the limit invariant holds at
    /// every commit point.
    pub async fn submit_message(&self, message: proto::Message) -> Result<HubEvent, HubError> {
        self.validation_pool
            .validate(&message)
            .await
            .map_err(|e| MessageValidationError::from(e).into_hub_error())?;

        let fid = message.fid();
        let _fid_guard = self.fid_locks[(fid as usize) % FID_LOCK_STRIPES]
            .lock()
            .await;

        self.validate_message_state(&message)
            .map_err(|e| e.into_hub_error())?;

        let msg_type = message.msg_type();
        let postfix = type_to_set_postfix(msg_type).as_u8();
        let (used, max_count) = self
            .stores
            .get_usage(fid, msg_type)
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        if max_count == 0 {
            return Err(HubError {
                code: "bad_request.prunable".to_string(),
                message: "fid has no registered storage".to_string(),
            });
        }
        let ts_hash = make_ts_hash_from_message(&message)?;
        if self
            .stores
            .storage_cache
            .is_prunable(fid, postfix, used, max_count, &ts_hash)
        {
            return Err(HubError {
                code: "bad_request.prunable".to_string(),
                message: "message would be immediately pruned".to_string(),
            });
        }

        // Single-writer section
        let mut trie = self.trie.lock().await;
        let mut txn = self.db.txn();

        let mut events = self
            .merge_message(&message, &mut txn)
            .map_err(|e| e.into_hub_error())?;
        for event in &events {
            trie.update_for_event(&self.db, event, &mut txn)
                .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        }

        let merged_delta = Self::count_delta_for_type(&events, msg_type);
        let current_count = (used as i64 + merged_delta).max(0) as u32;
        let prune_events = self
            .prune_messages(fid, msg_type, current_count, max_count, &mut txn)
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        for event in &prune_events {
            trie.update_for_event(&self.db, event, &mut txn)
                .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        }
        events.extend(prune_events);

        self.commit_and_emit(&mut trie, txn, &events)?;

        self.statsd.count("engine.merge_message", 1);
        let merge_event = events
            .iter()
            .find(|e| e.r#type() == proto::HubEventType::MergeMessage)
            .cloned()
            .ok_or(HubError::invalid_internal_state("merge produced no event"))?;
        Ok(merge_event)
    }

    /// State-dependent checks that pure validation cannot do: the fid must be
    /// registered, the signer must be an active delegate, and a username
    /// claim must be backed by a proof.
    fn validate_message_state(
        &self,
        message: &proto::Message,
    ) -> Result<(), MessageValidationError> {
        let data = message
            .data
            .as_ref()
            .ok_or(MessageValidationError::NoMessageData)?;

        self.stores
            .onchain_event_store
            .get_id_register_event_by_fid(data.fid)
            .map_err(|_| MessageValidationError::MissingFid)?
            .ok_or(MessageValidationError::MissingFid)?;

        self.stores
            .onchain_event_store
            .get_active_signer(data.fid, &message.signer)
            .map_err(|_| MessageValidationError::MissingSigner)?
            .ok_or(MessageValidationError::MissingSigner)?;

        if let Some(Body::UserDataBody(user_data)) = &data.body {
            if user_data.r#type == UserDataType::Username as i32 {
                self.validate_username(data.fid, &user_data.value)?;
            }
        }

        Ok(())
    }

    fn validate_username(&self, fid: u64, name: &str) -> Result<(), MessageValidationError> {
        if name.is_empty() {
            // Clearing a username needs no proof
            return Ok(());
        }
        let proof = UsernameProofStore::get_username_proof_by_name(
            &self.stores.username_proof_store,
            name.as_bytes(),
        )
        .map_err(MessageValidationError::StoreError)?;
        match proof {
            Some(proof_message) if proof_message.fid() == fid => Ok(()),
            _ => Err(MessageValidationError::MissingFname),
        }
    }

    fn merge_message(
        &self,
        msg: &proto::Message,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, MessageValidationError> {
        let data = msg
            .data
            .as_ref()
            .ok_or(MessageValidationError::NoMessageData)?;
        let mt = MessageType::try_from(data.r#type)
            .or(Err(MessageValidationError::InvalidMessageType(data.r#type)))?;

        let events = match mt {
            MessageType::CastAdd | MessageType::CastRemove => vec![self
                .stores
                .cast_store
                .merge(msg, txn)
                .map_err(MessageValidationError::StoreError)?],
            MessageType::LinkAdd | MessageType::LinkRemove | MessageType::LinkCompactState => {
                vec![self
                    .stores
                    .link_store
                    .merge(msg, txn)
                    .map_err(MessageValidationError::StoreError)?]
            }
            MessageType::ReactionAdd | MessageType::ReactionRemove => vec![self
                .stores
                .reaction_store
                .merge(msg, txn)
                .map_err(MessageValidationError::StoreError)?],
            MessageType::UserDataAdd => vec![self
                .stores
                .user_data_store
                .merge(msg, txn)
                .map_err(MessageValidationError::StoreError)?],
            MessageType::VerificationAddEthAddress | MessageType::VerificationRemove => vec![self
                .stores
                .verification_store
                .merge(msg, txn)
                .map_err(MessageValidationError::StoreError)?],
            MessageType::UsernameProof => {
                UsernameProofStore::merge(&self.stores.username_proof_store, msg, txn)
                    .map_err(MessageValidationError::StoreError)?
            }
            unhandled_type => {
                return Err(MessageValidationError::InvalidMessageType(
                    unhandled_type as i32,
                ));
            }
        };
        Ok(events)
    }

    /// Net change to the owning store's row count from a batch of events.
    fn count_delta_for_type(events: &[HubEvent], msg_type: MessageType) -> i64 {
        let store_type = Limits::message_type_to_store_type(msg_type);
        let mut delta = 0i64;
        for event in events {
            if let Some(proto::hub_event::Body::MergeMessageBody(body)) = &event.body {
                if let Some(message) = &body.message {
                    if Limits::message_type_to_store_type(message.msg_type()) == store_type {
                        delta += 1;
                    }
                }
                for deleted in &body.deleted_messages {
                    if Limits::message_type_to_store_type(deleted.msg_type()) == store_type {
                        delta -= 1;
                    }
                }
            }
        }
        delta
    }

    fn prune_messages(
        &self,
        fid: u64,
        msg_type: MessageType,
        current_count: u32,
        max_count: u32,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, EngineError> {
        let events = match msg_type {
            MessageType::CastAdd | MessageType::CastRemove => self
                .stores
                .cast_store
                .prune_messages(fid, current_count, max_count, txn)?,
            MessageType::LinkAdd | MessageType::LinkRemove | MessageType::LinkCompactState => self
                .stores
                .link_store
                .prune_messages(fid, current_count, max_count, txn)?,
            MessageType::ReactionAdd | MessageType::ReactionRemove => self
                .stores
                .reaction_store
                .prune_messages(fid, current_count, max_count, txn)?,
            MessageType::UserDataAdd => self
                .stores
                .user_data_store
                .prune_messages(fid, current_count, max_count, txn)?,
            MessageType::VerificationAddEthAddress | MessageType::VerificationRemove => self
                .stores
                .verification_store
                .prune_messages(fid, current_count, max_count, txn)?,
            MessageType::UsernameProof => self
                .stores
                .username_proof_store
                .prune_messages(fid, current_count, max_count, txn)?,
            unhandled_type => {
                return Err(EngineError::UnsupportedMessageType(unhandled_type));
            }
        };

        if !events.is_empty() {
            info!(
                fid,
                msg_type = msg_type.as_str_name(),
                count = events.len(),
                "Pruned messages"
            );
        }
        Ok(events)
    }

    /// Ingest a validated on-chain event. Bypasses message validation; runs
    /// the revocation cascades that identity and signer changes imply.
    /// Replaying an already-merged event is a no-op reported as `duplicate`.
    pub async fn merge_onchain_event(
        &self,
        onchain_event: OnChainEvent,
    ) -> Result<HubEvent, HubError> {
        let fid = onchain_event.fid;
        let _fid_guard = self.fid_locks[(fid as usize) % FID_LOCK_STRIPES]
            .lock()
            .await;

        let mut trie = self.trie.lock().await;
        let mut txn = self.db.txn();

        let hub_event = match self
            .stores
            .onchain_event_store
            .merge_onchain_event(onchain_event.clone(), &mut txn)
        {
            Ok(event) => event,
            Err(OnchainEventStorageError::DuplicateOnchainEvent) => {
                return Err(HubError::duplicate("onchain event already merged"));
            }
            Err(err) => {
                return Err(HubError::invalid_internal_state(&err.to_string()));
            }
        };

        let mut events = vec![hub_event.clone()];

        match &onchain_event.body {
            Some(proto::on_chain_event::Body::SignerEventBody(signer_body)) => {
                if signer_body.event_type() == SignerEventType::Remove
                    || signer_body.event_type() == SignerEventType::AdminReset
                {
                    revoke_messages::enqueue_revoke_signer_job(
                        &mut txn,
                        fid,
                        &signer_body.key,
                        revoke_messages::now_millis(),
                    );
                }
            }
            Some(proto::on_chain_event::Body::IdRegisterEventBody(id_register_body)) => {
                if id_register_body.event_type() == IdRegisterEventType::Transfer {
                    events.extend(self.handle_custody_transfer(
                        fid,
                        &id_register_body.from,
                        &mut trie,
                        &mut txn,
                    )?);
                }
            }
            _ => {}
        }

        self.commit_and_emit(&mut trie, txn, &events)?;
        drop(trie);
        drop(_fid_guard);

        // Drain the jobs the commit may have enqueued. The queue row is
        // durable, so a crash here just means the job runs at startup.
        if let Err(err) = revoke_messages::process_due_jobs(self).await {
            warn!("Error processing revoke jobs: {}", err);
        }

        self.statsd.count("engine.merge_onchain_event", 1);
        Ok(hub_event)
    }

    /// Custody moved away from `outgoing`: queue revocations for every signer
    /// that custody granted, and drop the fid's username record, whose fname
    /// ownership followed the old custody address.
    fn handle_custody_transfer(
        &self,
        fid: u64,
        outgoing_custody: &[u8],
        trie: &mut MerkleTrie,
        txn: &mut RocksDbTransactionBatch,
    ) -> Result<Vec<HubEvent>, HubError> {
        let mut events = vec![];

        let signers = self
            .stores
            .onchain_event_store
            .get_signers_added_under(fid, outgoing_custody)
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        for signer in signers {
            revoke_messages::enqueue_revoke_signer_job(txn, fid, &signer, revoke_messages::now_millis());
        }

        let existing_username = UserDataStore::get_user_data_by_fid_and_type(
            &self.stores.user_data_store,
            fid,
            UserDataType::Username,
        );
        if let Ok(Some(existing_username)) = existing_username {
            match self.stores.user_data_store.revoke(&existing_username, txn) {
                Ok(revoke_event) => {
                    trie.update_for_event(&self.db, &revoke_event, txn)
                        .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
                    events.push(revoke_event);
                }
                Err(err) => {
                    warn!(fid, "Error revoking username on custody transfer: {}", err);
                }
            }
        }

        Ok(events)
    }

    /// One revoke-by-signer cascade: sweep every store and commit the
    /// deletions as a single transaction.
    pub async fn revoke_messages_for_signer(
        &self,
        fid: u64,
        signer: &[u8],
    ) -> Result<Vec<HubEvent>, HubError> {
        let mut trie = self.trie.lock().await;
        let mut txn = self.db.txn();

        let events = self
            .stores
            .revoke_messages(fid, &signer.to_vec(), &mut txn)
            .map_err(|e| match e {
                StoresError::StoreError { inner, .. } => inner,
                other => HubError::invalid_internal_state(&other.to_string()),
            })?;
        for event in &events {
            trie.update_for_event(&self.db, event, &mut txn)
                .map_err(|e| HubError::invalid_internal_state(&e.to_string()))?;
        }

        self.commit_and_emit(&mut trie, txn, &events)?;
        if !events.is_empty() {
            info!(
                fid,
                signer = hex::encode(signer),
                count = events.len(),
                "Revoked messages for signer"
            );
        }
        Ok(events)
    }

    /// Commit the batch, fold the events into the storage cache, refresh the
    /// trie view, and only then let subscribers see the events.
    fn commit_and_emit(
        &self,
        trie: &mut MerkleTrie,
        txn: RocksDbTransactionBatch,
        events: &[HubEvent],
    ) -> Result<(), HubError> {
        self.db.commit(txn)?;

        for event in events {
            self.stores.storage_cache.apply_event(&self.db, event);
        }

        if let Err(err) = trie.reload(&self.db) {
            error!("Unable to reload sync trie after commit: {}", err);
            return Err(HubError::invalid_internal_state(&err.to_string()));
        }

        let timestamp = FarcasterTime::current().to_u64();
        for event in events {
            let mut event = event.clone();
            event.timestamp = timestamp;
            let _ = self.senders.events_tx.send(event);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync surface, consumed by the reconciliation RPCs
    // ------------------------------------------------------------------

    pub async fn get_sync_root_hash(&self) -> Result<Vec<u8>, HubError> {
        let trie = self.trie.lock().await;
        trie.root_hash()
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))
    }

    pub async fn get_sync_trie_items(&self) -> Result<usize, HubError> {
        let trie = self.trie.lock().await;
        trie.items()
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))
    }

    /// Node and child hashes at a nibble prefix; peers descend into the
    /// children whose hashes differ.
    pub async fn get_sync_metadata_by_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<NodeMetadata, HubError> {
        let trie = self.trie.lock().await;
        trie.get_trie_node_metadata(&self.db, &RocksDbTransactionBatch::new(), prefix)
            .map_err(|e| HubError::not_found(&e.to_string()))
    }

    pub async fn get_all_sync_ids_by_prefix(
        &self,
        prefix: &[u8],
    ) -> Result<Vec<Vec<u8>>, HubError> {
        let mut trie = self.trie.lock().await;
        trie.get_all_values(&self.db, prefix, MAX_SYNC_IDS_PER_PREFIX)
            .map_err(|e| HubError::invalid_internal_state(&e.to_string()))
    }

    /// Resolve sync ids back to full messages for the final fetch step of a
    /// reconciliation.
    pub fn get_all_messages_by_sync_ids(
        &self,
        sync_ids: &[Vec<u8>],
    ) -> Result<Vec<proto::Message>, HubError> {
        let mut messages = vec![];
        for sync_id in sync_ids {
            let (fid, postfix, ts_hash) = TrieKey::decode(sync_id)
                .map_err(|e| HubError::invalid_parameter(&e.to_string()))?;
            if let Some(message) = get_message(&self.db, fid, postfix, &ts_hash)? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    pub async fn trie_key_exists(&self, sync_id: &[u8]) -> bool {
        let mut trie = self.trie.lock().await;
        trie.exists(&self.db, sync_id).unwrap_or(false)
    }

    // ------------------------------------------------------------------
    // Event log
    // ------------------------------------------------------------------

    pub fn get_events(
        &self,
        start_id: u64,
        page_options: Option<PageOptions>,
    ) -> Result<super::account::EventsPage, HubError> {
        self.stores.get_events(start_id, None, page_options)
    }

    pub fn get_all_messages_by_fid(
        &self,
        fid: u64,
        message_type: MessageType,
        page_options: &PageOptions,
    ) -> Result<MessagesPage, HubError> {
        match Limits::message_type_to_store_type(message_type) {
            proto::StoreType::Casts => self.stores.cast_store.get_all_messages_by_fid(fid, page_options),
            proto::StoreType::Links => self.stores.link_store.get_all_messages_by_fid(fid, page_options),
            proto::StoreType::Reactions => self
                .stores
                .reaction_store
                .get_all_messages_by_fid(fid, page_options),
            proto::StoreType::UserData => self
                .stores
                .user_data_store
                .get_all_messages_by_fid(fid, page_options),
            proto::StoreType::Verifications => self
                .stores
                .verification_store
                .get_all_messages_by_fid(fid, page_options),
            proto::StoreType::UsernameProofs => self
                .stores
                .username_proof_store
                .get_all_messages_by_fid(fid, page_options),
            proto::StoreType::None => Err(HubError::invalid_parameter("unsupported message type")),
        }
    }
}
