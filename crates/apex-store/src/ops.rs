//! The six store operations of spec §4.A, as a closed request/result
//! pair so `Transact` can batch them uniformly.

/// One operation within a [`crate::StoreHandle::transact`] batch.
#[derive(Debug, Clone)]
pub enum Op {
    Read(String),
    Write(String, Vec<u8>),
    Delete(String),
}

/// The result of one [`Op`] within a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    Value(Option<Vec<u8>>),
    Written,
    Deleted,
}
