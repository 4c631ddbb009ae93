mod rocksdb;

pub use self::rocksdb::*;
