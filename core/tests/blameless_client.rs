use std::time::Duration;

use serde_json::json;
use sli_ingest_core::errors::BackendError;
use sli_ingest_core::model::{
    MetricQuery, MetricValue, RawDataRecord, SliFields, SliType, build_sli_creation_request,
};
use sli_ingest_core::retry::RetryPolicy;
use sli_ingest_core::sink::blameless::BlamelessClient;
use sli_ingest_core::sink::{BatchSubmitter, RawDataSink, SliCatalog};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GET_SLI: &str = "/api/v1/services/SLOServiceCrud/GetSLI";
const GET_SLI_TYPE: &str = "/api/v1/services/SLOServiceCrud/GetSliType";
const CREATE_SLI: &str = "/api/v1/services/SLOServiceCrud/CreateSLI";
const POST_MANY: &str = "/api/v1/services/SLOTimeSeriesServiceCrud/SliRawDataPostMany";

fn client_for(server: &MockServer) -> BlamelessClient {
    BlamelessClient::new(reqwest::Client::new(), server.uri(), "secret-token")
}

fn records() -> Vec<RawDataRecord> {
    vec![
        RawDataRecord {
            sli_id: 42,
            start: 1_700_000_000,
            end: 1_700_000_060,
            value: MetricValue::Latency(12),
        },
        RawDataRecord {
            sli_id: 42,
            start: 1_700_000_060,
            end: 1_700_000_120,
            value: MetricValue::Latency(14),
        },
    ]
}

fn records_json() -> serde_json::Value {
    json!([
        {"sliId": 42, "latency": 12, "start": 1_700_000_000, "end": 1_700_000_060},
        {"sliId": 42, "latency": 14, "start": 1_700_000_060, "end": 1_700_000_120}
    ])
}

fn instant_retries() -> RetryPolicy {
    RetryPolicy {
        max_retries: 3,
        delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn test_get_sli_posts_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GET_SLI))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(json!({"orgId": 7, "id": 42})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sli": {
                "orgId": 7,
                "id": 42,
                "name": "checkout latency",
                "description": "p99 latency",
                "dataSourceId": 5,
                "sliTypeId": 2,
                "serviceId": 3,
                "metricPath": "{\"latency\":\"histogram_quantile(0.99, x)\"}"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sli = client_for(&server).get_sli(7, 42).await.unwrap();

    assert_eq!(sli.id, 42);
    assert_eq!(sli.name, "checkout latency");
    assert_eq!(
        sli.metric_query().unwrap(),
        MetricQuery::Latency("histogram_quantile(0.99, x)".to_string())
    );
}

#[tokio::test]
async fn test_missing_sli_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GET_SLI))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sli": null})))
        .mount(&server)
        .await;

    let err = client_for(&server).get_sli(7, 42).await.unwrap_err();

    assert_eq!(err, BackendError::NotFound { kind: "SLI", id: 42 });
}

#[tokio::test]
async fn test_404_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GET_SLI))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client_for(&server).get_sli(7, 13).await.unwrap_err();

    assert_eq!(err, BackendError::NotFound { kind: "SLI", id: 13 });
}

#[tokio::test]
async fn test_get_sli_type_parses_the_type_name() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GET_SLI_TYPE))
        .and(body_json(json!({"id": 2})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"sliType": {"id": 2, "name": "Latency"}})),
        )
        .mount(&server)
        .await;

    let sli_type = client_for(&server).get_sli_type(2).await.unwrap();

    assert_eq!(sli_type, SliType::Latency);
}

#[tokio::test]
async fn test_unknown_sli_type_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GET_SLI_TYPE))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"sliType": null})))
        .mount(&server)
        .await;

    let err = client_for(&server).get_sli_type(9).await.unwrap_err();

    assert_eq!(
        err,
        BackendError::NotFound {
            kind: "SLI type",
            id: 9
        }
    );
}

#[tokio::test]
async fn test_create_sli_posts_the_built_request() {
    let server = MockServer::start().await;
    let request = build_sli_creation_request(
        7,
        SliFields {
            name: "checkout availability".to_string(),
            description: "good over valid".to_string(),
            service_id: 3,
            query: MetricQuery::availability("sum(good)", "sum(valid)").unwrap(),
        },
    )
    .unwrap();
    Mock::given(method("POST"))
        .and(path(CREATE_SLI))
        .and(body_json(serde_json::to_value(&request).unwrap()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sli": {"orgId": 7, "id": 77, "sliTypeId": 1, "name": "checkout availability"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let sli = client_for(&server).create_sli(&request).await.unwrap();

    assert_eq!(sli.id, 77);
    assert_eq!(sli.sli_type_id, SliType::Availability.id());
}

#[tokio::test]
async fn test_submit_many_sends_typed_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .and(header("authorization", "Bearer secret-token"))
        .and(body_json(json!({
            "orgId": 7,
            "sliType": "latency",
            "rawData": records_json()
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"sliRawData": records_json()})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let ack = client_for(&server)
        .submit_many(7, SliType::Latency, &records())
        .await
        .unwrap();

    assert_eq!(ack.accepted(), 2);
    assert_eq!(ack.records, records());
}

#[tokio::test]
async fn test_zero_valued_echo_counts_as_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .and(body_json(json!({
            "orgId": 7,
            "sliType": "throughput",
            "rawData": [{"sliId": 1, "throughput": 0, "start": 0, "end": 60}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sliRawData": [{"sliId": 1, "start": 0, "end": 60}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = RawDataRecord {
        sli_id: 1,
        start: 0,
        end: 60,
        value: MetricValue::Throughput(0),
    };
    let ack = client_for(&server)
        .submit_many(7, SliType::Throughput, &[record])
        .await
        .unwrap();

    assert_eq!(ack.accepted(), 1);
    assert_eq!(ack.records, vec![record]);
}

#[tokio::test]
async fn test_submitter_retries_server_errors_three_times() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .expect(4)
        .mount(&server)
        .await;

    let submitter = BatchSubmitter::new(client_for(&server), instant_retries());
    let err = submitter
        .submit(7, SliType::Latency, &records())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BackendError::Transport {
            status: Some(503),
            reason: "unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn test_submitter_does_not_retry_rejections() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .respond_with(ResponseTemplate::new(400).set_body_string("malformed rawData"))
        .expect(1)
        .mount(&server)
        .await;

    let submitter = BatchSubmitter::new(client_for(&server), instant_retries());
    let err = submitter
        .submit(7, SliType::Latency, &records())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        BackendError::Rejected {
            status: 400,
            body: "malformed rawData".to_string(),
        }
    );
}

#[tokio::test]
async fn test_submitter_recovers_after_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"sliRawData": records_json()})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let submitter = BatchSubmitter::new(client_for(&server), instant_retries());
    let ack = submitter
        .submit(7, SliType::Latency, &records())
        .await
        .unwrap();

    assert_eq!(ack.accepted(), 2);
}

#[tokio::test]
async fn test_undecodable_success_body_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(POST_MANY))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&server)
        .await;

    let submitter = BatchSubmitter::new(client_for(&server), instant_retries());
    let err = submitter
        .submit(7, SliType::Latency, &records())
        .await
        .unwrap_err();

    assert!(matches!(err, BackendError::Malformed { .. }));
}
