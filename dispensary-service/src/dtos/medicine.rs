use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use crate::models::{CreateMedicine, ListMedicinesFilter, UpdateMedicine};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMedicineRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 200))]
    pub salt: Option<String>,
    #[validate(length(max = 50))]
    pub strength: Option<String>,
    #[validate(length(max = 50))]
    pub form: Option<String>,
    #[serde(default)]
    pub cost_price: Decimal,
    #[serde(default)]
    pub selling_price: Decimal,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_stock: i64,
}

impl From<CreateMedicineRequest> for CreateMedicine {
    fn from(req: CreateMedicineRequest) -> Self {
        CreateMedicine {
            name: req.name,
            salt: req.salt,
            strength: req.strength,
            form: req.form,
            cost_price: req.cost_price,
            selling_price: req.selling_price,
            stock: req.stock,
            min_stock: req.min_stock,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMedicineRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 200))]
    pub salt: Option<String>,
    #[validate(length(max = 50))]
    pub strength: Option<String>,
    #[validate(length(max = 50))]
    pub form: Option<String>,
    pub cost_price: Option<Decimal>,
    pub selling_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: Option<i64>,
    #[validate(range(min = 0))]
    pub min_stock: Option<i64>,
}

impl From<UpdateMedicineRequest> for UpdateMedicine {
    fn from(req: UpdateMedicineRequest) -> Self {
        UpdateMedicine {
            name: req.name,
            salt: req.salt,
            strength: req.strength,
            form: req.form,
            cost_price: req.cost_price,
            selling_price: req.selling_price,
            stock: req.stock,
            min_stock: req.min_stock,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMedicinesQuery {
    pub search: Option<String>,
    pub salt: Option<String>,
    #[serde(default)]
    pub low_stock_only: bool,
    pub limit: Option<i64>,
}

impl From<ListMedicinesQuery> for ListMedicinesFilter {
    fn from(query: ListMedicinesQuery) -> Self {
        ListMedicinesFilter {
            search: query.search.filter(|s| !s.trim().is_empty()),
            salt: query.salt.filter(|s| !s.trim().is_empty()),
            low_stock_only: query.low_stock_only,
            limit: Some(query.limit.unwrap_or(100).clamp(1, 500)),
        }
    }
}
