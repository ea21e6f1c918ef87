use thiserror::Error;

/// Input that does not fit the declared shape of a collection.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum ReadError {
    #[error("expected list to have no more than {maximum} elements, found {actual} elements")]
    ListTooLong { maximum: usize, actual: usize },
    #[error("expected vector to have {expected} elements, found {actual} elements")]
    VectorSizeMismatch { expected: usize, actual: usize },
    #[error("expected bit list to have no more than {maximum} bits, found {actual} bits")]
    BitListTooLong { maximum: usize, actual: usize },
    #[error("expected bit vector to have {expected} bits, found {actual} bits")]
    BitVectorSizeMismatch { expected: usize, actual: usize },
    #[error("empty byte string is not a valid bit list")]
    BitListEmpty,
    #[error("last byte of bit list has no delimiting bit")]
    BitListNoDelimitingBit,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum IndexError {
    #[error("index {index} does not fit in usize")]
    DoesNotFitInUsize { index: u64 },
    #[error("index {index} is out of bounds for collection of length {length}")]
    OutOfBounds { length: usize, index: usize },
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum PushError {
    #[error("list is full (capacity {capacity})")]
    ListFull { capacity: usize },
}
