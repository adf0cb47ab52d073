mod ledger;

pub use ledger::{now_unix, SqliteLedger};
