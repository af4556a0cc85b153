pub mod db;
pub mod error;
pub mod models;
pub mod wallet;
pub mod positions;
pub mod transactions;
pub mod notifications;
pub mod reconciliation;

pub use db::LedgerDb;
pub use error::{LedgerError, LedgerResult};
pub use models::*;
pub use wallet::WalletLedger;
pub use positions::{weighted_average, PositionLedger};
pub use transactions::TransactionLog;
pub use notifications::NotificationStore;
pub use reconciliation::Reconciler;
