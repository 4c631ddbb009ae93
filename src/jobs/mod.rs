pub mod backfill;
pub mod revoke_messages;
