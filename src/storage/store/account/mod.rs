pub use self::cast_store::*;
pub use self::event::*;
pub use self::link_store::*;
pub use self::message::*;
pub use self::onchain_event_store::*;
pub use self::reaction_store::*;
pub use self::store::*;
pub use self::user_data_store::*;
pub use self::username_proof_store::*;
pub use self::verification_store::*;

mod cast_store;
mod event;
mod link_store;
mod message;
mod onchain_event_store;
mod store;

mod reaction_store;
mod user_data_store;
mod username_proof_store;
mod verification_store;

#[cfg(test)]
mod cast_store_test;
#[cfg(test)]
mod reaction_store_test;
#[cfg(test)]
mod user_data_store_test;
#[cfg(test)]
mod verification_store_test;
