//! End-to-end dispense lifecycle over HTTP: create, pay, bill, edit, cancel.

mod common;

use common::{id_of, money, paracetamol_dispense, TestApp};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

#[tokio::test]
async fn create_prices_the_bill_and_reserves_stock() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;

    let dispense = app.create_ok(&paracetamol_dispense("p-100")).await;

    assert_eq!(money(&dispense, "subtotal"), dec!(20));
    assert_eq!(money(&dispense, "total"), dec!(25));
    assert_eq!(money(&dispense, "paidAmount"), Decimal::ZERO);
    assert_eq!(money(&dispense, "amountDue"), dec!(25));
    assert_eq!(dispense["paymentStatus"], "pending");
    assert_eq!(dispense["state"], "active");
    assert_eq!(dispense["version"], 1);
    assert!(dispense["billNumber"].is_null());
    assert_eq!(app.stock_of("Paracetamol").await, 90);
}

#[tokio::test]
async fn partial_then_full_payment_assigns_a_bill_number() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    let id = id_of(&app.create_ok(&paracetamol_dispense("p-101")).await);

    let resp = app.pay(&id, "15").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let partial: Value = resp.json().await.unwrap();
    assert_eq!(partial["paymentStatus"], "partial");
    assert_eq!(money(&partial, "balance"), dec!(10));
    assert!(partial["billNumber"].is_null());

    let paid: Value = app.pay(&id, "10").await.json().await.unwrap();
    assert_eq!(paid["paymentStatus"], "paid");
    assert_eq!(money(&paid, "balance"), Decimal::ZERO);
    assert_eq!(paid["payments"].as_array().unwrap().len(), 2);

    let bill_number = paid["billNumber"].as_str().expect("bill number assigned");
    assert!(bill_number.starts_with("TST-"));
    assert!(bill_number.ends_with("-00001"));

    // Issuing again keeps the number.
    let billed: Value = app
        .post_json(&format!("/dispensary/dispenses/{}/bill", id), &json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(billed["billNumber"], bill_number);
}

#[tokio::test]
async fn cancel_after_payment_keeps_money_and_returns_stock() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    let id = id_of(&app.create_ok(&paracetamol_dispense("p-102")).await);
    app.pay(&id, "25").await;

    let resp = app.cancel(&id).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cancelled: Value = resp.json().await.unwrap();
    assert_eq!(cancelled["paymentStatus"], "cancelled");
    assert_eq!(money(&cancelled, "paidAmount"), dec!(25));
    assert!(cancelled["cancelledAt"].is_string());
    assert_eq!(app.stock_of("Paracetamol").await, 100);

    // Terminal: every further transition is refused.
    assert_eq!(app.cancel(&id).await.status(), StatusCode::CONFLICT);
    assert_eq!(app.pay(&id, "1").await.status(), StatusCode::CONFLICT);
    let edit = app
        .put_json(
            &format!("/dispensary/dispenses/{}", id),
            &json!({ "items": [{ "name": "Paracetamol", "quantity": 1, "unitPrice": "2" }] }),
        )
        .await;
    assert_eq!(edit.status(), StatusCode::CONFLICT);
    assert_eq!(app.stock_of("Paracetamol").await, 100);
}

#[tokio::test]
async fn renamed_medicine_does_not_block_cancel_or_edit() {
    let app = TestApp::spawn().await;
    let medicine = app.add_medicine("Paracetamol", 100).await;
    app.add_medicine("Cetirizine", 50).await;
    let cancelled = id_of(&app.create_ok(&paracetamol_dispense("p-111")).await);
    let edited = id_of(&app.create_ok(&paracetamol_dispense("p-112")).await);

    let renamed = app
        .put_json(
            &format!("/medicines/{}", medicine["medicineId"].as_str().unwrap()),
            &json!({ "name": "Paracetamol 500" }),
        )
        .await;
    assert_eq!(renamed.status(), StatusCode::OK);

    let resp = app.cancel(&cancelled).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["state"], "cancelled");

    let resp = app
        .put_json(
            &format!("/dispensary/dispenses/{}", edited),
            &json!({ "items": [{ "name": "Cetirizine", "quantity": 2, "unitPrice": "1.5" }] }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(app.stock_of("Cetirizine").await, 48);
}

#[tokio::test]
async fn edit_below_collected_amount_reports_refund_due() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    app.add_medicine("Cetirizine", 50).await;
    let id = id_of(&app.create_ok(&paracetamol_dispense("p-103")).await);
    app.pay(&id, "25").await;

    let resp = app
        .put_json(
            &format!("/dispensary/dispenses/{}", id),
            &json!({
                "items": [
                    { "name": "Paracetamol", "quantity": 4, "unitPrice": "2" },
                    { "name": "cetirizine", "quantity": 2, "unitPrice": "1.5" }
                ],
                "tax": "0",
                "expectedVersion": 2
            }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let edited: Value = resp.json().await.unwrap();

    assert_eq!(money(&edited, "total"), dec!(11));
    assert_eq!(money(&edited, "paidAmount"), dec!(25));
    assert_eq!(money(&edited, "refundDue"), dec!(14));
    assert_eq!(edited["paymentStatus"], "paid");
    assert_eq!(app.stock_of("Paracetamol").await, 96);
    assert_eq!(app.stock_of("Cetirizine").await, 48);

    // Settle the refund with a negative posting.
    let settled: Value = app.pay(&id, "-14").await.json().await.unwrap();
    assert_eq!(money(&settled, "paidAmount"), dec!(11));
    assert_eq!(money(&settled, "refundDue"), Decimal::ZERO);
    assert_eq!(settled["paymentStatus"], "paid");
}

#[tokio::test]
async fn refund_beyond_collected_is_rejected() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    let id = id_of(&app.create_ok(&paracetamol_dispense("p-104")).await);
    app.pay(&id, "5").await;

    assert_eq!(app.pay(&id, "-6").await.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.pay(&id, "0").await.status(), StatusCode::BAD_REQUEST);

    let current: Value = app
        .get(&format!("/dispensary/dispenses/{}", id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(money(&current, "paidAmount"), dec!(5));
}

#[tokio::test]
async fn zero_total_dispense_is_paid_on_creation() {
    let app = TestApp::spawn().await;
    app.add_medicine("Sample Pack", 10).await;

    let dispense = app
        .create_ok(&json!({
            "patientId": "p-105",
            "items": [{ "name": "Sample Pack", "quantity": 1, "unitPrice": "0" }]
        }))
        .await;

    assert_eq!(dispense["paymentStatus"], "paid");
    assert!(dispense["billNumber"].is_string());
}

#[tokio::test]
async fn oversized_discount_clamps_total_to_zero() {
    let app = TestApp::spawn().await;
    app.add_medicine("Cough Syrup", 10).await;

    let dispense = app
        .create_ok(&json!({
            "patientId": "p-106",
            "items": [{ "name": "Cough Syrup", "quantity": 1, "unitPrice": "80" }],
            "tax": "4",
            "discount": "500"
        }))
        .await;

    assert_eq!(money(&dispense, "total"), Decimal::ZERO);
}

#[tokio::test]
async fn invalid_drafts_are_rejected_without_reserving() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;

    let cases = [
        json!({ "patientId": "p-1", "items": [] }),
        json!({ "patientId": "p-1", "items": [{ "name": "Paracetamol", "quantity": 0, "unitPrice": "2" }] }),
        json!({ "patientId": "p-1", "items": [{ "name": "Paracetamol", "quantity": 1, "unitPrice": "-2" }] }),
        json!({ "patientId": "p-1", "items": [{ "name": "Paracetamol", "quantity": 1, "unitPrice": "2" }], "tax": "-1" }),
        json!({ "items": [{ "name": "Paracetamol", "quantity": 1, "unitPrice": "2" }] }),
        json!({ "patientId": "p-1", "items": [{ "name": "Paracetamol", "quantity": i64::MAX, "unitPrice": "79228162514264337593543950335" }] }),
        json!({ "patientId": "p-1", "items": [{ "name": "Paracetamol", "quantity": 1, "unitPrice": "2" }], "tax": "1000000000000" }),
    ];
    for body in cases {
        let resp = app.create_dispense(&body).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "body: {}", body);
    }
    assert_eq!(app.stock_of("Paracetamol").await, 100);
}

#[tokio::test]
async fn stock_shortage_rejects_the_whole_dispense() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    app.add_medicine("Azithromycin", 2).await;

    let resp = app
        .create_dispense(&json!({
            "patientId": "p-107",
            "items": [
                { "name": "Paracetamol", "quantity": 10, "unitPrice": "2" },
                { "name": "Azithromycin", "quantity": 3, "unitPrice": "12" }
            ]
        }))
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("azithromycin"));

    assert_eq!(app.stock_of("Paracetamol").await, 100);
    assert_eq!(app.stock_of("Azithromycin").await, 2);

    let listed: Value = app
        .get("/dispensary/dispenses?patientId=p-107")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(listed["count"], 0);
}

#[tokio::test]
async fn unknown_medicine_cannot_be_dispensed() {
    let app = TestApp::spawn().await;

    let resp = app
        .create_dispense(&json!({
            "patientId": "p-108",
            "items": [{ "name": "Unlisted Tonic", "quantity": 1, "unitPrice": "5" }]
        }))
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    let id = id_of(&app.create_ok(&paracetamol_dispense("p-109")).await);
    app.pay(&id, "5").await;

    let resp = app
        .post_json(
            &format!("/dispensary/dispenses/{}/pay", id),
            &json!({ "amount": "5", "expectedVersion": 1 }),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);

    let resp = app
        .post_json(
            &format!("/dispensary/dispenses/{}/cancel?expectedVersion=1", id),
            &json!({}),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(app.stock_of("Paracetamol").await, 90);
}

#[tokio::test]
async fn lookups_by_patient_token_and_date() {
    let app = TestApp::spawn().await;
    app.add_medicine("Paracetamol", 100).await;
    app.create_ok(&paracetamol_dispense("p-110")).await;
    app.create_ok(&paracetamol_dispense("p-110")).await;
    app.create_ok(&json!({
        "appointmentDay": "2026-03-02",
        "dailyToken": 17,
        "items": [{ "name": "Paracetamol", "quantity": 1, "unitPrice": "2" }]
    }))
    .await;

    let by_patient: Value = app
        .get("/dispensary/dispenses?patientId=p-110")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_patient["count"], 2);

    let by_token: Value = app
        .get("/dispensary/dispenses?date=2026-03-02&token=17")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(by_token["count"], 1);
    assert_eq!(by_token["dispenses"][0]["subject"]["dailyToken"], 17);

    let pending: Value = app
        .get("/dispensary/dispenses?patientId=p-110&status=paid")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(pending["count"], 0);

    assert_eq!(
        app.get("/dispensary/dispenses").await.status(),
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn unknown_dispense_is_not_found() {
    let app = TestApp::spawn().await;
    let missing = uuid::Uuid::new_v4();

    assert_eq!(
        app.get(&format!("/dispensary/dispenses/{}", missing))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        app.pay(&missing.to_string(), "5").await.status(),
        StatusCode::NOT_FOUND
    );
}
