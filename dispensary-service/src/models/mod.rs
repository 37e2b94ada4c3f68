//! Domain models for dispensary-service.

mod dispense;
mod line_item;
mod medicine;
pub mod money;
mod report;

pub use dispense::{
    DispenseFilter, DispenseRecord, DispenseState, DispenseSubject, NewDispense, PaymentEntry,
    PaymentMode, PaymentStatus,
};
pub use line_item::{stock_key, LineItem};
pub use medicine::{CreateMedicine, ListMedicinesFilter, Medicine, UpdateMedicine};
pub use report::{ReportSummary, ReportWindow};
