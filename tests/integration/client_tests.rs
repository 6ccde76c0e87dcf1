//! HTTP client tests
//!
//! These tests use wiremock to stand in for the search API and check the
//! request shape and the classification of every kind of response.

use biz_sweep::config::ApiConfig;
use biz_sweep::crawler::{FetchError, SearchClient, YelpClient};
use biz_sweep::planner::{AreaQuery, BoundingBox, SearchUnit};
use biz_sweep::state::PageCursor;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SEARCH_PATH: &str = "/v3/businesses/search";

fn client_for(server: &MockServer) -> YelpClient {
    let config = ApiConfig {
        base_url: server.uri(),
        timeout_secs: 5,
        ..ApiConfig::default()
    };
    YelpClient::new(&config, "test-key".to_string()).unwrap()
}

fn springfield(filter: Option<&str>) -> SearchUnit {
    SearchUnit::new(
        AreaQuery::Location("Springfield, IL".to_string()),
        filter.map(str::to_string),
    )
}

fn first_page() -> PageCursor {
    PageCursor {
        offset: 0,
        limit: 50,
    }
}

#[tokio::test]
async fn test_fetch_page_sends_search_parameters() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(header("authorization", "Bearer test-key"))
        .and(query_param("term", "Black owned"))
        .and(query_param("location", "Springfield, IL"))
        .and(query_param("sort_by", "distance"))
        .and(query_param("limit", "50"))
        .and(query_param("offset", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 120,
            "businesses": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cursor = PageCursor {
        offset: 100,
        limit: 50,
    };
    let page = client_for(&server)
        .fetch_page(&springfield(Some("Black owned")), &cursor)
        .await
        .unwrap();

    assert_eq!(page.total, 120);
    assert!(page.businesses.is_empty());
}

#[tokio::test]
async fn test_fetch_page_searches_bounds_by_radius() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .and(query_param("latitude", "39.750000"))
        .and(query_param("longitude", "-89.650000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 0,
            "businesses": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let unit = SearchUnit::new(
        AreaQuery::Bounds(BoundingBox::new(39.70, -89.70, 39.80, -89.60)),
        None,
    );
    let page = client_for(&server)
        .fetch_page(&unit, &first_page())
        .await
        .unwrap();

    assert_eq!(page.total, 0);

    let requests = server.received_requests().await.unwrap();
    let url = &requests[0].url;
    assert!(url.query_pairs().any(|(k, v)| k == "radius" && v.parse::<u32>().unwrap() > 0));
    assert!(!url.query_pairs().any(|(k, _)| k == "location" || k == "term"));
}

#[tokio::test]
async fn test_fetch_page_normalizes_businesses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 3,
            "businesses": [
                {
                    "id": "soul-1",
                    "name": "Soul Food Kitchen",
                    "coordinates": {"latitude": 39.8, "longitude": -89.65},
                    "location": {
                        "address1": "12 W Oak St",
                        "address2": "",
                        "city": "Springfield",
                        "state": "IL",
                        "zip_code": "62701",
                        "display_address": ["12 W Oak St", "Springfield, IL 62701"]
                    },
                    "categories": [{"alias": "soulfood", "title": "Soul Food"}],
                    "rating": 4.5,
                    "review_count": 87
                },
                {
                    "id": "",
                    "name": "No Identifier"
                },
                {
                    "id": "bakery-2",
                    "name": "Corner Bakery",
                    "location": null,
                    "price": "$$"
                }
            ]
        })))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await
        .unwrap();

    assert_eq!(page.total, 3);
    assert_eq!(page.raw_count, 3);
    assert_eq!(page.businesses.len(), 2);

    let soul = &page.businesses[0];
    assert_eq!(soul.id, "soul-1");
    assert_eq!(soul.address.address1.as_deref(), Some("12 W Oak St"));
    assert_eq!(soul.address.address2, None);
    assert_eq!(soul.address.zip_code.as_deref(), Some("62701"));
    assert_eq!(soul.latitude, Some(39.8));
    assert_eq!(soul.categories[0].alias, "soulfood");
    assert_eq!(soul.review_count, Some(87));

    let bakery = &page.businesses[1];
    assert_eq!(bakery.id, "bakery-2");
    assert_eq!(bakery.address.city, None);
    assert_eq!(bakery.price.as_deref(), Some("$$"));
}

#[tokio::test]
async fn test_missing_businesses_field_is_an_empty_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"total": 0})))
        .mount(&server)
        .await;

    let page = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await
        .unwrap();

    assert_eq!(page.total, 0);
    assert!(page.businesses.is_empty());
}

#[tokio::test]
async fn test_429_is_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": "TOO_MANY_REQUESTS_PER_SECOND",
                "description": "You have exceeded the queries-per-second limit for this endpoint."
            }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await;

    assert!(matches!(result, Err(FetchError::RateLimited(_))));
}

#[tokio::test]
async fn test_access_limit_body_is_rate_limited() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error": {
                "code": "ACCESS_LIMIT_REACHED",
                "description": "You've reached the access limit for this client."
            }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await;

    match result {
        Err(FetchError::RateLimited(detail)) => assert!(detail.contains("ACCESS_LIMIT_REACHED")),
        other => panic!("expected RateLimited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await;

    assert_eq!(result, Err(FetchError::Transient("HTTP 503".to_string())));
}

#[tokio::test]
async fn test_validation_error_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "VALIDATION_ERROR",
                "description": "Too many results requested, limit+offset must be <= 1000."
            }
        })))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await;

    match result {
        Err(FetchError::Fatal { status, detail }) => {
            assert_eq!(status, Some(400));
            assert!(detail.starts_with("VALIDATION_ERROR"));
        }
        other => panic!("expected Fatal, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SEARCH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let result = client_for(&server)
        .fetch_page(&springfield(None), &first_page())
        .await;

    assert!(matches!(
        result,
        Err(FetchError::Fatal {
            status: Some(200),
            ..
        })
    ));
}

#[tokio::test]
async fn test_connection_failure_is_transient() {
    // Bind and release a port so nothing is listening on it
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let config = ApiConfig {
        base_url: format!("http://127.0.0.1:{}", port),
        timeout_secs: 5,
        ..ApiConfig::default()
    };
    let client = YelpClient::new(&config, "test-key".to_string()).unwrap();

    let result = client.fetch_page(&springfield(None), &first_page()).await;
    assert!(matches!(result, Err(FetchError::Transient(_))));
}
