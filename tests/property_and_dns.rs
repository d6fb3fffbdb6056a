mod common;

use common::{app_for, call_json};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header_exists, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn property_create_returns_the_new_property_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/papi/v1/properties"))
        .and(query_param("contractId", "ctr_1"))
        .and(query_param("groupId", "grp_1"))
        .and(header_exists("authorization"))
        .and(body_partial_json(json!({"propertyName": "test-site", "productId": "prd_fresca"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "propertyLink": "/papi/v1/properties/prp_999?contractId=ctr_1&groupId=grp_1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&server.uri());
    let (is_error, data) = call_json(
        &app,
        "property_create",
        json!({"propertyName": "test-site", "contractId": "ctr_1", "groupId": "grp_1", "productId": "prd_fresca"}),
    )
    .await;
    assert!(!is_error, "{}", data);
    assert_eq!(data["propertyId"], "prp_999");
}

#[tokio::test]
async fn dns_zone_create_posts_zone_with_contract_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/config-dns/v2/zones"))
        .and(query_param("contractId", "ctr_1"))
        .and(body_partial_json(json!({"zone": "example.com", "type": "PRIMARY"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "zone": "example.com",
            "type": "PRIMARY",
            "activationState": "NEW"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let app = app_for(&server.uri());
    let (is_error, data) = call_json(
        &app,
        "dns_zone_create",
        json!({"zone": "example.com", "type": "PRIMARY", "contractId": "ctr_1"}),
    )
    .await;
    assert!(!is_error, "{}", data);
    assert_eq!(data["zone"], "example.com");
}

#[tokio::test]
async fn bulk_import_reports_partial_failure_per_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/config-dns/v2/zones/example\.com/names/[^/]+/types/[A-Z]+$"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let app = app_for(&server.uri());
    let (is_error, data) = call_json(
        &app,
        "dns_records_bulk_import",
        json!({"zone": "example.com", "records": [
            {"name": "www", "type": "A", "ttl": 300, "rdata": ["192.0.2.10"]},
            {"name": "broken", "type": "NOTATYPE", "ttl": 300, "rdata": ["x"]},
            {"name": "api", "type": "CNAME", "ttl": 300, "rdata": ["www.example.com."]}
        ]}),
    )
    .await;
    assert!(!is_error, "{}", data);
    assert_eq!(data["created"], 2);
    assert_eq!(data["failed"], 1);
    let errors = data["errors"].as_array().cloned().unwrap_or_default();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].as_str().unwrap_or("").contains("broken"));
}

#[tokio::test]
async fn vendor_errors_become_tool_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/papi/v1/contracts"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "type": "https://problems.luna.akamaiapis.net/papi/v0/forbidden",
            "title": "Forbidden",
            "detail": "The client does not have the grant needed for this request",
            "status": 403
        })))
        .mount(&server)
        .await;

    let app = app_for(&server.uri());
    let (is_error, data) = call_json(&app, "contract_list", json!({})).await;
    assert!(is_error);
    assert_eq!(data["error"]["tool"], "contract_list");
}
