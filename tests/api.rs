//! End-to-end tests of the HTTP surface against the fixture model

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use penguin_species_service::config::{ModelConfig, ModelFormat};
use penguin_species_service::metrics::ServingMetrics;
use penguin_species_service::models::inference::InferenceService;
use penguin_species_service::models::{ClassVocabulary, Classifier, PredictionArtifact};
use penguin_species_service::server::{router, AppState};
use penguin_species_service::{FeatureVector, InferenceError};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

fn model_config(model_path: String) -> ModelConfig {
    ModelConfig {
        format: ModelFormat::Xgboost,
        model_path,
        classes_path: fixture("target_classes.csv"),
        classes_has_header: true,
    }
}

fn app_with(service: InferenceService) -> Router {
    router(AppState::new(
        Arc::new(service),
        Arc::new(ServingMetrics::new()),
    ))
}

fn ready_app() -> Router {
    let service = InferenceService::start(&model_config(fixture("model.json")));
    assert!(service.is_ready());
    app_with(service)
}

fn unloaded_app() -> Router {
    let service = InferenceService::start(&model_config(fixture("missing_model.json")));
    assert!(!service.is_ready());
    app_with(service)
}

async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn torgersen_male() -> Value {
    json!({
        "bill_length_mm": 39.1,
        "bill_depth_mm": 18.7,
        "flipper_length_mm": 181,
        "body_mass_g": 3750,
        "sex": "male",
        "island": "Torgersen"
    })
}

#[tokio::test]
async fn test_predict_returns_species() {
    let (status, body) = post_json(ready_app(), "/predict", torgersen_male()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"predicted_species": "Adelie"}));
}

#[tokio::test]
async fn test_predict_each_species() {
    let cases = [
        (46.5, "female", "Dream", "Chinstrap"),
        (47.3, "female", "Biscoe", "Gentoo"),
        (38.0, "female", "Biscoe", "Adelie"),
    ];

    for (bill, sex, island, expected) in cases {
        let body = json!({
            "bill_length_mm": bill,
            "bill_depth_mm": 15.0,
            "flipper_length_mm": 200,
            "body_mass_g": 4000,
            "sex": sex,
            "island": island
        });
        let (status, body) = post_json(ready_app(), "/predict", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["predicted_species"], expected);
    }
}

#[tokio::test]
async fn test_unknown_island_is_validation_error() {
    let mut body = torgersen_male();
    body["island"] = json!("Mars");

    let (status, body) = post_json(ready_app(), "/predict", body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["detail"].as_str().unwrap().contains("Mars"));
    assert!(body["request_id"].as_str().is_some());
}

#[tokio::test]
async fn test_missing_field_is_validation_error() {
    let mut body = torgersen_male();
    body.as_object_mut().unwrap().remove("sex");

    let (status, body) = post_json(ready_app(), "/predict", body).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["detail"].as_str().unwrap().contains("sex"));
}

#[tokio::test]
async fn test_malformed_json_is_rejected() {
    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"bill_length_mm\": "))
        .unwrap();

    let (status, body) = send(ready_app(), request).await;
    assert!(status.is_client_error());
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_unloaded_model_fails_every_prediction() {
    let (status, body) = post_json(unloaded_app(), "/predict", torgersen_male()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_not_ready");

    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("missing_model.json"));
    assert!(detail.contains("could not be read"));
    assert!(!detail.contains("os error"));
    assert!(!detail.contains("No such file"));
}

#[tokio::test]
async fn test_malformed_model_detail_names_file_only() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{"learner": 12}}"#).unwrap();

    let service =
        InferenceService::start(&model_config(file.path().to_string_lossy().into_owned()));
    assert!(!service.is_ready());

    let (status, body) = post_json(app_with(service), "/predict", torgersen_male()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("is not a valid model artifact"));
    assert!(!detail.contains("invalid type"));
    assert!(!detail.contains("LearnerDocument"));
}

/// Classifier that always answers with the same index
struct FixedClassifier(usize);

impl Classifier for FixedClassifier {
    fn predict_index(&self, _features: &FeatureVector) -> Result<usize, InferenceError> {
        Ok(self.0)
    }

    fn num_classes(&self) -> usize {
        3
    }

    fn feature_count(&self) -> usize {
        9
    }

    fn format(&self) -> &'static str {
        "fixed"
    }
}

fn fixed_app(index: usize) -> Router {
    let artifact = PredictionArtifact::new(Arc::new(FixedClassifier(index)), "fixed");
    let classes = ClassVocabulary::new(vec![
        "Adelie".to_string(),
        "Chinstrap".to_string(),
        "Gentoo".to_string(),
    ]);
    app_with(InferenceService::ready(artifact, classes))
}

#[tokio::test]
async fn test_index_without_label_is_server_error() {
    let (status, body) = post_json(fixed_app(3), "/predict", torgersen_male()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "inference_error");
    assert!(body["request_id"].as_str().is_some());

    let (status, body) = post_json(fixed_app(1), "/predict", torgersen_male()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_species"], "Chinstrap");
}

#[tokio::test]
async fn test_categoricals_are_case_sensitive() {
    let mut body = torgersen_male();
    body["sex"] = json!("Male");

    let (status, body) = post_json(ready_app(), "/predict", body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_extra_fields_are_ignored() {
    let mut body = torgersen_male();
    body["year"] = json!(2007);

    let (status, body) = post_json(ready_app(), "/predict", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predicted_species"], "Adelie");
}

#[tokio::test]
async fn test_health_reports_readiness() {
    let (status, body) = get(ready_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok", "ready": true}));

    let (status, body) = get(unloaded_app(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "degraded", "ready": false}));
}

#[tokio::test]
async fn test_model_info() {
    let (status, body) = get(ready_app(), "/model").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "xgboost");
    assert_eq!(body["classes"], json!(["Adelie", "Chinstrap", "Gentoo"]));
    assert_eq!(body["feature_names"][4], "sex_Female");

    let (status, _) = get(unloaded_app(), "/model").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_count_outcomes() {
    let metrics = Arc::new(ServingMetrics::new());
    let service = Arc::new(InferenceService::start(&model_config(fixture("model.json"))));
    let app = router(AppState::new(service, metrics.clone()));

    let (status, _) = post_json(app.clone(), "/predict", torgersen_male()).await;
    assert_eq!(status, StatusCode::OK);

    let mut bad = torgersen_male();
    bad["sex"] = json!("unknown");
    let (status, _) = post_json(app.clone(), "/predict", bad).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = get(app, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions_served"], 1);
    assert_eq!(body["predictions_failed"], 1);
    assert_eq!(body["predictions_by_label"]["Adelie"], 1);
    assert_eq!(body["failures_by_kind"]["validation_error"], 1);
}

#[tokio::test]
async fn test_concurrent_predictions_share_one_service() {
    let app = ready_app();

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move { post_json(app, "/predict", torgersen_male()).await })
        })
        .collect();

    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["predicted_species"], "Adelie");
    }
}
