/// CSV export of episode ledgers.
pub mod export;
