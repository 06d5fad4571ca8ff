use chrono::{Datelike, Utc};
use pricewatch::config::SearchSourceConfig;
use pricewatch::fetch::search::SearchFetcher;
use pricewatch::fetch::{FetchContext, FetchError, Fetcher};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> SearchSourceConfig {
    SearchSourceConfig {
        queries: vec!["vmware pricing {year}".to_string()],
        results_per_query: 10,
        rate_per_sec: 1000.0,
        ..Default::default()
    }
}

fn ctx() -> FetchContext {
    FetchContext::new(reqwest::Client::new(), None, CancellationToken::new())
}

fn result(title: &str, link: &str) -> serde_json::Value {
    json!({"title": title, "link": link, "snippet": "Prices up 40% for partners."})
}

#[tokio::test]
async fn templates_year_and_normalises_result_urls() {
    let server = MockServer::start().await;
    let year = Utc::now().year().to_string();
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .and(query_param("q", format!("vmware pricing {year}")))
        .and(query_param("dateRestrict", "d7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                result("Broadcom hikes", "HTTPS://News.example.com/story?utm_source=feed&gclid=x"),
            ]
        })))
        .mount(&server)
        .await;

    let fetcher = SearchFetcher::new(config(), server.uri(), "key".into(), "cx".into());
    let outcome = fetcher.fetch(&ctx()).await.unwrap();
    assert_eq!(outcome.items.len(), 1);
    let item = &outcome.items[0];
    assert_eq!(item.url, "https://news.example.com/story");
    assert_eq!(item.engagement.upvotes, 0);
    assert_eq!(item.source_subchannel, format!("vmware pricing {year}"));
}

#[tokio::test]
async fn missing_credentials_fail_before_any_request() {
    let fetcher = SearchFetcher::new(config(), "http://127.0.0.1:0".into(), String::new(), "cx".into());
    let err = fetcher.fetch(&ctx()).await.unwrap_err();
    assert!(matches!(err, FetchError::MissingCredential(_)));
}

#[tokio::test]
async fn rate_limit_is_retried_with_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(
            ResponseTemplate::new(429).insert_header("retry-after", "0"),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [result("Story", "https://example.com/a")]
        })))
        .mount(&server)
        .await;

    let fetcher = SearchFetcher::new(config(), server.uri(), "key".into(), "cx".into());
    let outcome = fetcher.fetch(&ctx()).await.unwrap();
    assert_eq!(outcome.items.len(), 1);
    assert!(outcome.stats.retries >= 1);
}

#[tokio::test]
async fn empty_result_sets_are_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/customsearch/v1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .mount(&server)
        .await;

    let fetcher = SearchFetcher::new(config(), server.uri(), "key".into(), "cx".into());
    let outcome = fetcher.fetch(&ctx()).await.unwrap();
    assert!(outcome.items.is_empty());
    assert!(!outcome.timed_out);
}
