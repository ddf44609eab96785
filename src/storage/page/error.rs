use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Insufficient space in page")]
    InsufficientSpace,

    #[error("Invalid record ID")]
    InvalidRecordId,

    #[error("Record not found")]
    RecordNotFound,

    #[error("Record is marked deleted")]
    RecordDeleted,

    #[error("Record is not marked deleted")]
    RecordNotDeleted,
}
