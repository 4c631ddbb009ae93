use std::sync::Arc;
use std::time::Duration;

use prost::Message as _;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::core::error::HubError;
use crate::proto::RevokeMessagesBySignerJobPayload;
use crate::storage::constants::RootPrefix;
use crate::storage::db::{PageOptions, RocksDbTransactionBatch};
use crate::storage::store::engine::HubEngine;
use crate::storage::util::increment_vec_u8;

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// `[JobRevokeSigner] ‖ doAt(8 BE) ‖ payloadDigest(8)` — ordered by due time,
/// deduplicated by payload.
fn make_job_key(do_at_millis: u64, payload_bytes: &[u8]) -> Vec<u8> {
    let digest = blake3::hash(payload_bytes);
    let mut key = Vec::with_capacity(1 + 8 + 8);
    key.push(RootPrefix::JobRevokeSigner as u8);
    key.extend_from_slice(&do_at_millis.to_be_bytes());
    key.extend_from_slice(&digest.as_bytes()[0..8]);
    key
}

/// Queue a revoke-by-signer cascade in the same batch as the event that
/// triggered it, so the job survives a crash between commit and execution.
pub fn enqueue_revoke_signer_job(
    txn: &mut RocksDbTransactionBatch,
    fid: u64,
    signer: &[u8],
    do_at_millis: u64,
) {
    let payload = RevokeMessagesBySignerJobPayload {
        fid,
        signer: signer.to_vec(),
    };
    let payload_bytes = payload.encode_to_vec();
    txn.put(make_job_key(do_at_millis, &payload_bytes), payload_bytes);
}

/// Run every job that has come due. Jobs are processed oldest-first; a
/// per-job failure is logged and the row kept so the next pass retries it.
pub async fn process_due_jobs(engine: &HubEngine) -> Result<u32, HubError> {
    let now_millis = now_millis();

    let prefix = vec![RootPrefix::JobRevokeSigner as u8];
    let mut due: Vec<(Vec<u8>, RevokeMessagesBySignerJobPayload)> = vec![];
    engine.db.for_each_iterator_by_prefix(
        Some(prefix.clone()),
        Some(increment_vec_u8(&prefix)),
        &PageOptions::default(),
        |key, value| {
            let do_at = u64::from_be_bytes(key[1..9].try_into().unwrap());
            if do_at > now_millis {
                return Ok(true); // keys are due-time ordered
            }
            match RevokeMessagesBySignerJobPayload::decode(value) {
                Ok(payload) => due.push((key.to_vec(), payload)),
                Err(err) => {
                    error!("Dropping undecodable revoke job: {}", err);
                    due.push((key.to_vec(), RevokeMessagesBySignerJobPayload::default()));
                }
            }
            Ok(false)
        },
    )?;

    let mut processed = 0;
    for (job_key, payload) in due {
        if payload.fid != 0 {
            match engine
                .revoke_messages_for_signer(payload.fid, &payload.signer)
                .await
            {
                Ok(events) => {
                    if !events.is_empty() {
                        info!(
                            fid = payload.fid,
                            signer = hex::encode(&payload.signer),
                            revoked = events.len(),
                            "Revoke job complete"
                        );
                    }
                }
                Err(err) => {
                    warn!(
                        fid = payload.fid,
                        "Revoke job failed, will retry: {}", err
                    );
                    continue;
                }
            }
        }
        let mut txn = engine.db.txn();
        txn.delete(job_key);
        engine.db.commit(txn)?;
        processed += 1;
    }
    Ok(processed)
}

/// Background drainer. Cancellable between jobs via the shutdown channel.
pub async fn revoke_job_loop(engine: Arc<HubEngine>, mut shutdown_rx: watch::Receiver<bool>) {
    let mut interval = tokio::time::interval(JOB_POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(err) = process_due_jobs(&engine).await {
                    error!("Error draining revoke job queue: {}", err);
                }
            }
            _ = shutdown_rx.changed() => {
                info!("Revoke job loop shutting down");
                return;
            }
        }
    }
}
