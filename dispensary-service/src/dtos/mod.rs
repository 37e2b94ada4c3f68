//! Request and response payloads for the HTTP API.

mod dispense;
mod medicine;

pub use dispense::{
    CreateDispenseRequest, DispenseListQuery, DispenseListResponse, DispenseResponse,
    LineItemRequest, PaymentRequest, StatsQuery, UpdateDispenseRequest, VersionQuery,
};
pub use medicine::{
    CreateMedicineRequest, ListMedicinesQuery, UpdateMedicineRequest,
};
