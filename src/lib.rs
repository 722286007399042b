pub mod amount;
pub mod args;
pub mod backfill;
pub mod config;
pub mod document;
pub mod errors;
pub mod execution;
pub mod ingest;
pub mod invoice;
pub mod ledger;
pub mod pipeline;
pub mod summary;
pub mod xlsx;
