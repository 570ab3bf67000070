use adapter::{
    applovin, chartboost, facebook, fyber, hyprmx, inmobi, AppLovin, Chartboost, Context,
    Credential, Facebook, Fyber, HyprMx, InMobi, Init, Kind, Adapter,
};
use pretty_assertions::assert_eq;
use primitives::{config::DEVELOPMENT_CONFIG, util::logging::discard_logger, ApiUrl, Query};
use serde_json::json;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn context() -> Context {
    Context::new(DEVELOPMENT_CONFIG.clone(), discard_logger()).expect("Should build the client")
}

fn api_url(server: &MockServer) -> ApiUrl {
    ApiUrl::parse(&server.uri()).expect("Valid mock server url")
}

fn query(dimensions: &[&str], metrics: &[&str]) -> Query {
    Query::new("2024-01-01", "2024-01-31", dimensions, metrics).expect("Valid query")
}

#[tokio::test]
async fn applovin_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/report"))
        .and(query_param("api_key", "applovin-key"))
        .and(query_param("start", "2024-01-01"))
        .and(query_param("end", "2024-01-31"))
        .and(query_param("columns", "day,country,revenue,impressions"))
        .and(query_param("format", "json"))
        .and(query_param("report_type", "publisher"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "results": [
                { "day": "2024-01-01", "country": "us", "revenue": "12.5", "impressions": "1000" },
                { "day": "", "country": "", "revenue": "0", "impressions": "0" },
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = applovin::Options {
        api_key: " applovin-key ".into(),
    };
    let mut adapter = AppLovin::init(options, context()).with_api_url(api_url(&server));

    let report = adapter
        .get_report(&query(&["DATE", "country"], &["ESTIMATED_EARNINGS", "IMPRESSIONS"]))
        .await
        .expect("Should fetch the report");

    assert_eq!(
        json!([{ "day": "2024-01-01", "country": "us", "revenue": 12.5, "impressions": 1000 }]),
        serde_json::to_value(&report).expect("Should serialize")
    );
}

#[tokio::test]
async fn applovin_statuses() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/report"))
        .and(query_param("api_key", "revoked"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "message": "Invalid API key" })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/report"))
        .and(query_param("api_key", "busy"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .mount(&server)
        .await;

    for (api_key, kind, message) in [
        (
            "revoked",
            Kind::Authentication,
            "Authentication: AppLovin API responded with 401 Unauthorized: Invalid API key",
        ),
        (
            "busy",
            Kind::Connection,
            "Connection: AppLovin API responded with 503 Service Unavailable: Service Unavailable",
        ),
    ] {
        let options = applovin::Options {
            api_key: api_key.into(),
        };
        let mut adapter = AppLovin::init(options, context()).with_api_url(api_url(&server));

        let error = adapter
            .get_report(&query(&[], &[]))
            .await
            .expect_err("Should fail");

        assert_eq!(kind, error.kind());
        assert_eq!(message, error.to_string());
    }
}

#[tokio::test]
async fn chartboost_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v3/metrics/appcountry"))
        .and(query_param("appIds", "5f1a,5f1b"))
        .and(query_param("userId", "user-1"))
        .and(query_param("userSignature", "signature"))
        .and(query_param("dateMin", "2024-01-01"))
        .and(query_param("dateMax", "2024-01-31"))
        .and(query_param("adLocation", "all"))
        .and(query_param("campaignType", "network,direct_deal"))
        .and(query_param("adTypeIds", "4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "dt": "2024-01-02", "countryCode": "DE", "moneyEarned": 3.25, "impressionsDelivered": "640" },
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let body = json!({
        "app_ids": ["5f1a", "5f1b"],
        "user_id": "user-1",
        "user_signature": "signature",
        "ad_type": "rewarded_video",
    });
    let options = serde_json::from_value::<chartboost::Options>(body).expect("Valid options");
    let mut adapter = Chartboost::init(options, context()).with_api_url(api_url(&server));

    let report = adapter
        .get_report(&query(&["day", "country_code"], &["revenue", "impressions"]))
        .await
        .expect("Should fetch the report");

    assert_eq!(
        json!([{ "day": "2024-01-02", "country_code": "DE", "revenue": 3.25, "impressions": 640 }]),
        serde_json::to_value(&report).expect("Should serialize")
    );
}

#[tokio::test]
async fn facebook_report_and_unknown_app() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v13.0/app-1/adnetworkanalytics/"))
        .and(query_param("metrics", "['fb_ad_network_revenue']"))
        .and(query_param("breakdowns[0]", "country"))
        .and(query_param("since", "2024-01-01"))
        .and(query_param("until", "2024-01-31"))
        .and(query_param("ordering_column", "value"))
        .and(query_param("access_token", "fb-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "results": [{
                    "time": "2024-01-05T08:00:00+0000",
                    "metric": "fb_ad_network_revenue",
                    "breakdowns": [{ "key": "country", "value": "FR" }],
                    "value": "7.5",
                }]
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v13.0/missing-app/adnetworkanalytics/"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": { "message": "Unsupported get request.", "code": 100 }
        })))
        .mount(&server)
        .await;

    let options = facebook::Options {
        app_id: "app-1".into(),
        access_token: "fb-token".into(),
    };
    let mut adapter = Facebook::init(options, context()).with_api_url(api_url(&server));

    let report = adapter
        .get_report(&query(&["country"], &["revenue"]))
        .await
        .expect("Should fetch the report");

    assert_eq!(
        json!([{ "country": "FR", "day": "2024-01-05", "revenue": 7.5 }]),
        serde_json::to_value(&report).expect("Should serialize")
    );

    let options = facebook::Options {
        app_id: "missing-app".into(),
        access_token: "fb-token".into(),
    };
    let mut adapter = Facebook::init(options, context()).with_api_url(api_url(&server));
    let error = adapter
        .get_report(&query(&[], &[]))
        .await
        .expect_err("Should fail");

    assert_eq!(Kind::BadRequest, error.kind());
    assert_eq!(
        "Bad request: Facebook API responded with 404 Not Found: Unsupported get request.",
        error.to_string()
    );
}

#[tokio::test]
async fn fyber_signed_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/iamp/services/performance/pub-1/vamp/1704067200/1706745599"))
        .and(query_param("oauth_consumer_key", "consumer"))
        .and(query_param("oauth_signature_method", "HMAC-SHA1"))
        .and(query_param("oauth_version", "1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apps": [{
                "appId": "app-1",
                "spots": [{
                    "spotId": 7,
                    "units": [{ "date": 1_704_067_200, "revenue": 2.5, "impressions": 100 }],
                }],
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = fyber::Options {
        consumer_key: "consumer".into(),
        consumer_secret: "secret".into(),
        publisher_id: "pub-1".into(),
    };
    let mut adapter = Fyber::init(options, context()).with_api_url(api_url(&server));

    let credential = adapter.ensure_credential().await.expect("Static credential");
    assert!(matches!(credential, Credential::OAuth1Signature { consumer_key, .. } if consumer_key == "consumer"));

    let report = adapter
        .get_report(&query(&["day", "app_id", "spot_id"], &["revenue", "impressions"]))
        .await
        .expect("Should fetch the report");

    assert_eq!(
        json!([{ "day": "2024-01-01", "app_id": "app-1", "spot_id": 7, "revenue": 2.5, "impressions": 100 }]),
        serde_json::to_value(&report).expect("Should serialize")
    );
}

#[tokio::test]
async fn hyprmx_report() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/apps/app-9/reports"))
        .and(header("Authorization", "Bearer hypr-key"))
        .and(query_param("start_date", "2024-01-01"))
        .and(query_param("end_date", "2024-01-31"))
        .and(query_param("group_by", "date,placement"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "date": "2024-01-01", "placement": "rewarded", "revenue": 4.0, "impressions": 500, "ecpm": 8.0 }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = hyprmx::Options {
        api_key: "hypr-key".into(),
        app_id: "app-9".into(),
    };
    let mut adapter = HyprMx::init(options, context()).with_api_url(api_url(&server));

    let report = adapter
        .get_report(&query(&["date", "placement"], &[]))
        .await
        .expect("Should fetch the report");

    assert_eq!(
        json!([{ "date": "2024-01-01", "placement": "rewarded", "revenue": 4.0, "impressions": 500, "ecpm": 8.0 }]),
        serde_json::to_value(&report).expect("Should serialize")
    );
}

#[tokio::test]
async fn inmobi_session_is_reused() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/generatesession/generate"))
        .and(header("userName", "publisher@example.com"))
        .and(header("secretKey", "inmobi-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "respList": [{ "sessionId": "session-1", "accountId": "account-1" }],
            "error": false,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v3.0/reporting/publisher"))
        .and(header("accountId", "account-1"))
        .and(header("sessionID", "session-1"))
        .and(body_json(json!({
            "reportRequest": {
                "metrics": ["earnings"],
                "groupBy": ["country", "placement"],
                "timeFrame": "2024-01-01:2024-01-31",
                "filterBy": { "filterName": "placementId", "filterValue": [1234] },
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "respList": [{
                "country": "India",
                "countryId": 94,
                "placementId": 1234,
                "placementName": "Interstitial",
                "earnings": 0.75,
            }],
            "error": false,
        })))
        .expect(2)
        .mount(&server)
        .await;

    let options = inmobi::Options {
        username: "publisher@example.com".into(),
        secret_key: "inmobi-secret".into(),
        filter_placement_ids: Some("1234".into()),
    };
    let mut adapter = InMobi::init(options, context()).with_api_url(api_url(&server));

    let credential = adapter.ensure_credential().await.expect("Should create a session");
    assert!(matches!(credential, Credential::Session { account_id, .. } if account_id == "account-1"));

    for _ in 0..2 {
        let report = adapter
            .get_report(&query(&["country"], &[]))
            .await
            .expect("Should fetch the report");

        assert_eq!(1, report.len());
    }
}

#[tokio::test]
async fn inmobi_rejected_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/generatesession/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "respList": [],
            "error": true,
            "errorList": [{ "message": "Invalid credentials" }],
        })))
        .mount(&server)
        .await;

    let options = inmobi::Options {
        username: "publisher@example.com".into(),
        secret_key: "wrong".into(),
        filter_placement_ids: None,
    };
    let mut adapter = InMobi::init(options, context()).with_api_url(api_url(&server));

    let error = adapter
        .get_report(&query(&[], &[]))
        .await
        .expect_err("Should fail");

    assert_eq!(Kind::Authentication, error.kind());
}

#[tokio::test]
async fn inmobi_unauthorized_session() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1.0/generatesession/generate"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .expect(1)
        .mount(&server)
        .await;

    let options = inmobi::Options {
        username: "publisher@example.com".into(),
        secret_key: "expired".into(),
        filter_placement_ids: None,
    };
    let mut adapter = InMobi::init(options, context()).with_api_url(api_url(&server));

    let error = adapter
        .ensure_credential()
        .await
        .expect_err("Should fail");

    assert_eq!(Kind::Authentication, error.kind());
}

#[tokio::test]
async fn inmobi_unreachable_session_endpoint() {
    let options = inmobi::Options {
        username: "publisher@example.com".into(),
        secret_key: "inmobi-secret".into(),
        filter_placement_ids: None,
    };
    // nothing listens on port 1
    let mut adapter = InMobi::init(options, context())
        .with_api_url(ApiUrl::parse("http://127.0.0.1:1").expect("Valid url"));

    let error = adapter
        .ensure_credential()
        .await
        .expect_err("Should fail");

    assert_eq!(Kind::Connection, error.kind());
}
