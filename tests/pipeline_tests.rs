use std::path::Path;

use chrono::Utc;
use pricewatch::config::{AppConfig, Credentials, RuntimeEnv};
use pricewatch::error::{EXIT_TOTAL_FETCH_FAILURE, PipelineError};
use pricewatch::models::{Confidence, Priority};
use pricewatch::pipeline::Engine;
use pricewatch::report::write_json;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_fixtures(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let dict_path = dir.join("vendors.json");
    std::fs::write(
        &dict_path,
        json!({
            "vendors": {
                "vmware": {"aliases": ["esxi"], "tier": 1},
                "broadcom": {"aliases": [], "tier": 1, "consolidator": true},
                "oracle": {"aliases": ["oracle cloud"], "tier": 2}
            },
            "acquisitions": [
                {"acquirer": "broadcom", "target": "vmware", "year": 2023}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let keywords_path = dir.join("keywords.json");
    std::fs::write(
        &keywords_path,
        json!({
            "pricing": ["price increase", "licensing increase", "price hike"],
            "urgency_high": ["effective immediately"],
            "urgency_medium": ["upcoming change"],
            "supply": ["shortage"],
            "strategy": ["roadmap"],
            "technology": ["end-of-life"],
            "cloud_security": ["cnapp", "cspm"],
            "ma_intel": ["acquisition"],
            "partnership": ["partner program"],
            "msp_context": ["msp"],
            "business_impact": ["margin compression"]
        })
        .to_string(),
    )
    .unwrap();

    (dict_path, keywords_path)
}

fn runtime_env() -> RuntimeEnv {
    RuntimeEnv {
        profile: "test".to_string(),
        log_level: "warn".to_string(),
        log_format: "pretty".to_string(),
        credentials: Credentials {
            forum_user_agent: "pricewatch-test/0.1".to_string(),
            search_api_key: "key".to_string(),
            search_engine_id: "cx".to_string(),
            llm_api_key: "sk-test".to_string(),
        },
    }
}

fn base_config(dir: &Path, forum_base: &str, llm_base: &str) -> AppConfig {
    let (dict_path, keywords_path) = write_fixtures(dir);
    let mut config = AppConfig::default();
    config.vendor_dictionary_path = dict_path;
    config.keywords_path = keywords_path;
    config.sources.forum.sub_channels = vec!["sysadmin".to_string()];
    config.sources.forum.base_url = forum_base.to_string();
    config.sources.forum.rate_per_sec = 1000.0;
    config.sources.forum.fallback_threshold = 1;
    config.sources.search.enabled = false;
    config.llm.base_url = llm_base.to_string();
    config.report.output_dir = dir.join("output");
    config
}

async fn mount_forum_post(server: &MockServer) {
    // The same thread shows up on every listing; URL-level dedup must
    // collapse the copies (the tracking param varies per listing).
    for (idx, name) in ["hot", "new", "top", "rising"].iter().enumerate() {
        let body = json!({"data": {"children": [{
            "data": {
                "title": "VMware 50% core-licensing increase from $50 to $76",
                "selftext": "Effective immediately per the Broadcom notice; renewal quotes are up 50%.",
                "permalink": format!("/r/sysadmin/comments/1/vmware?utm_source={idx}"),
                "url": "",
                "created_utc": (Utc::now().timestamp() - 3 * 3600) as f64,
                "ups": 120,
                "num_comments": 47,
            }
        }]}});
        Mock::given(method("GET"))
            .and(path(format!("/r/sysadmin/{name}.json")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }
}

fn llm_body(insight_text: &str) -> serde_json::Value {
    let payload = json!({
        "insights": [
            {"role": "pricing", "text": insight_text, "claimed_priority": "alpha"},
            {"role": "strategy", "text": "Broadcom audit wave [SOURCE_ID:999]", "claimed_priority": "alpha"}
        ],
        "executive_summary": "VMware licensing costs jumped sharply this week."
    });
    json!({
        "choices": [{"message": {"role": "assistant", "content": payload.to_string()}}],
        "usage": {"total_tokens": 512}
    })
}

#[tokio::test]
async fn end_to_end_run_produces_bound_insights_and_rollup() {
    let dir = tempfile::tempdir().unwrap();
    let forum = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_forum_post(&forum).await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_body(
            "VMware core licensing rises 50% from $50 to $76 [SOURCE_ID:1]",
        )))
        .mount(&llm)
        .await;

    let config = base_config(dir.path(), &forum.uri(), &llm.uri());
    let engine = Engine::new(config, runtime_env()).unwrap();
    let report = engine.run(CancellationToken::new()).await.unwrap();

    // Dedup collapsed the four listing copies into one source.
    assert_eq!(report.sources.len(), 1);
    assert_eq!(report.sources[0].source_id, 1);
    assert!(report.sources[0].url.starts_with("https://www.reddit.com/"));

    // The in-range insight survived with alpha priority and medium
    // confidence (single source, quantifier, tier-1 vendor); the
    // out-of-range citation was dropped and counted.
    let alpha = &report.insights_by_priority[&Priority::Alpha];
    assert_eq!(alpha.len(), 1);
    assert_eq!(alpha[0].confidence, Confidence::Medium);
    assert!(alpha[0].cited_source_ids.contains(&1));
    assert_eq!(report.run_stats.llm_dropped, 1);
    assert!(!report.run_stats.llm_failed);
    assert_eq!(report.run_stats.llm_tokens_used, 512);

    // Vendor rollup: the item mentions vmware (and broadcom in the
    // body); the acquisition edge co-credits broadcom.
    let vmware = report.vendor_rollup.iter().find(|m| m.vendor == "vmware").unwrap();
    assert_eq!(vmware.mentions, 1.0);
    let broadcom = report.vendor_rollup.iter().find(|m| m.vendor == "broadcom").unwrap();
    assert!(broadcom.mentions >= 1.0);

    assert_eq!(report.run_stats.items_fetched_per_source["forum"], 4);
    assert_eq!(report.run_stats.items_selected, 1);

    // Artifact writing is deterministic and refuses overwrite.
    let path = write_json(&report, &report_dir(dir.path())).unwrap();
    assert!(path.to_string_lossy().ends_with(".json"));
    assert!(write_json(&report, &report_dir(dir.path())).is_err());
}

fn report_dir(base: &Path) -> std::path::PathBuf {
    base.join("output")
}

#[tokio::test]
async fn zero_items_across_sources_is_total_fetch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let forum = MockServer::start().await;
    let llm = MockServer::start().await;
    for name in ["hot", "new", "top", "rising"] {
        Mock::given(method("GET"))
            .and(path(format!("/r/sysadmin/{name}.json")))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"children": []}})),
            )
            .mount(&forum)
            .await;
    }

    let config = base_config(dir.path(), &forum.uri(), &llm.uri());
    let engine = Engine::new(config, runtime_env()).unwrap();
    let err = engine.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, PipelineError::TotalFetchFailure));
    assert_eq!(err.exit_code(), EXIT_TOTAL_FETCH_FAILURE);
    // No artifacts are produced on failure.
    assert!(!report_dir(dir.path()).exists());
}

#[tokio::test]
async fn llm_failure_soft_fails_with_honest_run_stats() {
    let dir = tempfile::tempdir().unwrap();
    let forum = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_forum_post(&forum).await;
    // Both the first attempt and the repair attempt return garbage.
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "not json"}}],
            "usage": {"total_tokens": 10}
        })))
        .mount(&llm)
        .await;

    let config = base_config(dir.path(), &forum.uri(), &llm.uri());
    let engine = Engine::new(config, runtime_env()).unwrap();
    let report = engine.run(CancellationToken::new()).await.unwrap();

    assert!(report.run_stats.llm_failed);
    assert!(report.insights().next().is_none());
    // Sources and rollup are still honest.
    assert_eq!(report.sources.len(), 1);
    assert!(!report.vendor_rollup.is_empty());
}

#[tokio::test]
async fn partial_source_failure_still_produces_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let forum = MockServer::start().await;
    let search = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_forum_post(&forum).await;
    // Search hard-fails with 403 on every request.
    Mock::given(method("GET"))
        .and(path_regex(r"^/customsearch/v1.*"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&search)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(llm_body(
            "VMware licensing up 50% [SOURCE_ID:1]",
        )))
        .mount(&llm)
        .await;

    let mut config = base_config(dir.path(), &forum.uri(), &llm.uri());
    config.sources.search.enabled = true;
    config.sources.search.base_url = search.uri();
    config.sources.search.rate_per_sec = 1000.0;
    config.sources.search.queries = vec!["vendor pricing {year}".to_string()];

    let engine = Engine::new(config, runtime_env()).unwrap();
    let report = engine.run(CancellationToken::new()).await.unwrap();

    assert_eq!(report.run_stats.partial_failures.len(), 1);
    assert_eq!(report.run_stats.partial_failures[0].source, "search");
    assert_eq!(report.run_stats.items_fetched_per_source["search"], 0);
    assert!(report.run_stats.items_fetched_per_source["forum"] > 0);
    assert_eq!(report.sources.len(), 1);
}

#[tokio::test]
async fn cancellation_aborts_without_a_report() {
    let dir = tempfile::tempdir().unwrap();
    let forum = MockServer::start().await;
    let llm = MockServer::start().await;
    mount_forum_post(&forum).await;

    let config = base_config(dir.path(), &forum.uri(), &llm.uri());
    let engine = Engine::new(config, runtime_env()).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = engine.run(cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Cancelled));
}

#[tokio::test]
async fn missing_llm_credential_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = base_config(dir.path(), "http://127.0.0.1:0", "http://127.0.0.1:0");
    let mut env = runtime_env();
    env.credentials.llm_api_key = String::new();
    let err = Engine::new(config, env).unwrap_err();
    assert_eq!(err.exit_code(), 1);
}
