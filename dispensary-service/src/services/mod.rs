//! Services module for dispensary-service.

pub mod charges;
pub mod database;
pub mod dispensary;
pub mod error;
pub mod inventory;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod report;
pub mod repository;
pub mod stock;

pub use charges::{compute_charges, Charges};
pub use database::Database;
pub use dispensary::{Dispensary, Revised};
pub use error::{DispensaryError, StockError};
pub use inventory::InMemoryInventory;
pub use metrics::{get_metrics, init_metrics};
pub use repository::{DispenseRepository, InMemoryDispenses};
pub use stock::{MedicineCatalog, StockAdjustment, StockLedger};
