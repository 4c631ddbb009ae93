use std::sync::{Arc, Mutex};

use prost::Message as _;

use crate::core::error::HubError;
use crate::core::util::FARCASTER_EPOCH;
use crate::proto::HubEvent;
use crate::storage::constants::{RootPrefix, PAGE_SIZE_MAX};
use crate::storage::db::{PageOptions, RocksDB, RocksDbTransactionBatch};

const TIMESTAMP_BITS: u32 = 14;
const SEQUENCE_MASK: u64 = (1 << TIMESTAMP_BITS) - 1;

/// Event ids pack a millisecond clock with a sequence counter:
/// `(millis since the hub epoch) << 14 | seq`. Ids are strictly increasing in
/// commit order; the clock never runs backwards because a stale wall clock is
/// clamped to the last issued timestamp.
struct HubEventIdGenerator {
    last_timestamp: u64,
    last_seq: u64,
}

impl HubEventIdGenerator {
    fn new() -> Self {
        HubEventIdGenerator {
            last_timestamp: 0,
            last_seq: 0,
        }
    }

    fn generate(&mut self, current_timestamp: u64) -> u64 {
        if current_timestamp > self.last_timestamp {
            self.last_timestamp = current_timestamp;
            self.last_seq = 0;
        } else {
            self.last_seq += 1;
            if self.last_seq > SEQUENCE_MASK {
                self.last_timestamp += 1;
                self.last_seq = 0;
            }
        }
        (self.last_timestamp << TIMESTAMP_BITS) | self.last_seq
    }
}

fn current_epoch_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
        - FARCASTER_EPOCH
}

/// Assigns event ids and writes event rows into the same batch as the state
/// mutation that produced them. Shared by every store so the log is totally
/// ordered across stores.
pub struct StoreEventHandler {
    generator: Mutex<HubEventIdGenerator>,
}

impl StoreEventHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(StoreEventHandler {
            generator: Mutex::new(HubEventIdGenerator::new()),
        })
    }

    pub fn commit_transaction(
        &self,
        txn: &mut RocksDbTransactionBatch,
        event: &mut HubEvent,
    ) -> Result<u64, HubError> {
        let id = self
            .generator
            .lock()
            .unwrap()
            .generate(current_epoch_millis());
        event.id = id;
        txn.put(make_hub_event_key(id), event.encode_to_vec());
        Ok(id)
    }
}

pub fn make_hub_event_key(event_id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 8);
    key.push(RootPrefix::HubEvents as u8);
    key.extend_from_slice(&event_id.to_be_bytes());
    key
}

pub struct EventsPage {
    pub events: Vec<HubEvent>,
    pub next_page_token: Option<Vec<u8>>,
}

impl HubEvent {
    pub fn get_event(db: Arc<RocksDB>, event_id: u64) -> Result<HubEvent, HubError> {
        let key = make_hub_event_key(event_id);
        match db.get(&key)? {
            Some(bytes) => Ok(HubEvent::decode(bytes.as_slice())?),
            None => Err(HubError::not_found("event not found")),
        }
    }

    /// Page the event log starting at `start_id` (inclusive), optionally
    /// stopping before `stop_id`.
    pub fn get_events(
        db: Arc<RocksDB>,
        start_id: u64,
        stop_id: Option<u64>,
        page_options: Option<PageOptions>,
    ) -> Result<EventsPage, HubError> {
        let page_options = page_options.unwrap_or_default();
        let page_size = page_options.page_size.unwrap_or(PAGE_SIZE_MAX);

        let start_prefix = make_hub_event_key(start_id);
        let stop_prefix = match stop_id {
            Some(id) => make_hub_event_key(id),
            None => vec![RootPrefix::HubEvents as u8 + 1],
        };

        let mut events = Vec::new();
        let mut last_key = vec![];
        db.for_each_iterator_by_prefix(
            Some(start_prefix),
            Some(stop_prefix),
            &page_options,
            |key, value| {
                let event = HubEvent::decode(value).map_err(HubError::from)?;
                events.push(event);
                if events.len() >= page_size {
                    last_key = key.to_vec();
                    return Ok(true);
                }
                Ok(false)
            },
        )?;

        let next_page_token = if last_key.is_empty() {
            None
        } else {
            Some(last_key)
        };

        Ok(EventsPage {
            events,
            next_page_token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ids_are_strictly_increasing() {
        let mut generator = HubEventIdGenerator::new();
        let mut last = 0;
        for _ in 0..100_000 {
            let id = generator.generate(42);
            assert!(id > last);
            last = id;
        }
        // A fresh millisecond resets the sequence but keeps ids increasing
        let id = generator.generate(100_000_000);
        assert!(id > last);
    }

    #[test]
    fn test_event_id_encodes_timestamp() {
        let mut generator = HubEventIdGenerator::new();
        let id = generator.generate(1234);
        assert_eq!(id >> TIMESTAMP_BITS, 1234);
        assert_eq!(id & SEQUENCE_MASK, 0);
    }
}
