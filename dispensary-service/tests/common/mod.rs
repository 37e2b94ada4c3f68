//! Common test utilities for dispensary-service integration tests.

#![allow(dead_code)]

use std::str::FromStr;
use std::sync::Once;

use dispensary_service::config::{BillingConfig, DispensaryConfig};
use dispensary_service::startup::{Application, Stores};
use reqwest::{Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use service_core::config::Config as CommonConfig;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,dispensary_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory configuration bound to a random local port.
pub fn test_config() -> DispensaryConfig {
    DispensaryConfig {
        common: CommonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        service_name: "dispensary-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: None,
        billing: BillingConfig {
            bill_number_prefix: "TST".to_string(),
        },
    }
}

/// Test application wrapper.
pub struct TestApp {
    pub address: String,
    pub http_port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn the service on in-memory stores and wait until `/health` answers.
    pub async fn spawn() -> TestApp {
        init_tracing();

        let config = test_config();
        let stores = Stores::in_memory(&config.billing.bill_number_prefix);
        let app = Application::build_with_stores(config, stores)
            .await
            .expect("Failed to build application");

        let http_port = app.http_port();
        let address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = reqwest::Client::new();
        let mut attempts = 0;
        loop {
            match client.get(format!("{}/health", address)).send().await {
                Ok(resp) if resp.status().is_success() => break,
                _ if attempts < 20 => {
                    attempts += 1;
                    tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
                }
                _ => panic!("Service did not become healthy after 20 attempts"),
            }
        }

        TestApp {
            address,
            http_port,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }

    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put_json(&self, path: &str, body: &Value) -> Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Add a medicine to the master list and return its JSON.
    pub async fn add_medicine(&self, name: &str, stock: i64) -> Value {
        let resp = self
            .post_json(
                "/medicines",
                &json!({
                    "name": name,
                    "salt": format!("{} salt", name),
                    "costPrice": 1,
                    "sellingPrice": 2,
                    "stock": stock,
                    "minStock": 5
                }),
            )
            .await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.expect("Invalid medicine JSON")
    }

    /// Current stock for the one medicine whose name contains `name`.
    pub async fn stock_of(&self, name: &str) -> i64 {
        let list: Value = self
            .get(&format!("/medicines?search={}", name))
            .await
            .json()
            .await
            .expect("Invalid medicine list JSON");
        list[0]["stock"].as_i64().expect("stock missing")
    }

    /// Create a dispense and return the raw response.
    pub async fn create_dispense(&self, body: &Value) -> Response {
        self.post_json("/dispensary/dispenses", body).await
    }

    /// Create a dispense that must succeed and return its JSON.
    pub async fn create_ok(&self, body: &Value) -> Value {
        let resp = self.create_dispense(body).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        resp.json().await.expect("Invalid dispense JSON")
    }

    pub async fn pay(&self, id: &str, amount: &str) -> Response {
        self.post_json(
            &format!("/dispensary/dispenses/{}/pay", id),
            &json!({ "amount": amount, "mode": "cash" }),
        )
        .await
    }

    pub async fn cancel(&self, id: &str) -> Response {
        self.post_json(&format!("/dispensary/dispenses/{}/cancel", id), &json!({}))
            .await
    }
}

/// The standard one-line dispense: 10 x Paracetamol @ 2.00 plus 5.00 tax.
pub fn paracetamol_dispense(patient_id: &str) -> Value {
    json!({
        "patientId": patient_id,
        "items": [
            { "name": "Paracetamol", "strength": "500mg", "form": "tablet", "quantity": 10, "unitPrice": "2.00" }
        ],
        "tax": "5.00",
        "discount": "0"
    })
}

/// Read a decimal field, which the API serialises as a string.
pub fn money(value: &Value, field: &str) -> Decimal {
    let raw = match &value[field] {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => panic!("{} is not a decimal: {:?}", field, other),
    };
    Decimal::from_str(&raw).expect("invalid decimal")
}

pub fn id_of(value: &Value) -> String {
    value["id"].as_str().expect("id missing").to_string()
}
