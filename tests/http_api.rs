//! HTTP API over a live listener: public routes, signed admin routes, backups.

use std::sync::Arc;

use axum::http::Method;
use chrono::Utc;
use etfitalia::blog::ArticleStore;
use etfitalia::catalog::Catalog;
use etfitalia::config::Config;
use etfitalia::market::EtfDataService;
use etfitalia::server::{self, auth, AppState, SharedState};
use etfitalia::storage::LocalStore;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

const KEY: &str = "test-admin-key";

// reqwest and axum sit on different `http` major versions.
fn server_method(method: &reqwest::Method) -> Method {
    Method::from_bytes(method.as_str().as_bytes()).unwrap()
}

struct Harness {
    base: String,
    client: reqwest::Client,
    state: SharedState,
    _dir: TempDir,
    _stop: tokio::sync::oneshot::Sender<()>,
}

impl Harness {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            bind_addr: "127.0.0.1:0".to_string(),
            site_url: "https://guadagnareconetf.it".to_string(),
            sqlite_path: dir.path().join("store.sqlite").display().to_string(),
            blog_data_path: dir.path().join("blog.json"),
            generated_dir: dir.path().join("generated"),
            processed_dir: dir.path().join("processed"),
            admin_hmac_key: Some(KEY.to_string()),
            use_live_market: false,
            ..Config::from_env()
        };
        let store = LocalStore::new(&cfg.sqlite_path).unwrap();
        let articles = ArticleStore::open(&cfg.blog_data_path).unwrap();
        let market = EtfDataService::from_config(&cfg);
        let state = Arc::new(AppState::new(cfg, Catalog::bundled().unwrap(), market, store, articles));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, rx) = tokio::sync::oneshot::channel::<()>();
        let serve_state = state.clone();
        tokio::spawn(async move {
            let _ = server::serve(listener, serve_state, async {
                let _ = rx.await;
            })
            .await;
        });
        Self { base: format!("http://{}", addr), client: reqwest::Client::new(), state, _dir: dir, _stop: stop }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let res = self.client.get(self.url(path)).send().await.unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let res = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = res.status().as_u16();
        (status, res.json().await.unwrap_or(Value::Null))
    }

    fn signed(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let ts = Utc::now().timestamp();
        self.client
            .request(method.clone(), self.url(path))
            .header("x-timestamp", ts.to_string())
            .header("x-signature", auth::sign(KEY, &server_method(&method), path, ts))
    }
}

// ---------------------------------------------------------------------------
// Public catalog and calculators
// ---------------------------------------------------------------------------

#[tokio::test]
async fn catalog_filters_and_sorts() {
    let h = Harness::start().await;
    let (status, body) = h.get("/api/etfs?sector=obbligazionario&sort=ter&order=asc").await;
    assert_eq!(status, 200);
    assert_eq!(body["count"], 3);
    let tickers: Vec<&str> = body["etfs"].as_array().unwrap().iter().map(|e| e["ticker"].as_str().unwrap()).collect();
    assert_eq!(tickers[0], "VGEA");

    let (status, body) = h.get("/api/etfs?sort=volume").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 400);

    let (status, body) = h.get("/api/etfs/IE00BK5BQT80").await;
    assert_eq!(status, 200);
    assert_eq!(body["ticker"], "VWCE");
    let (status, _) = h.get("/api/etfs/XX0000000000").await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn live_data_falls_back_to_mock_offline() {
    let h = Harness::start().await;
    let (status, body) = h.get("/api/etfs/IE00BK5BQT80/live").await;
    assert_eq!(status, 200);
    assert_eq!(body["isin"], "IE00BK5BQT80");
    assert!(!body["errors"].as_array().unwrap().is_empty());

    let (status, seo) = h.get("/api/etfs/IE00BK5BQT80/seo").await;
    assert_eq!(status, 200);
    assert!(seo["canonical"].as_str().unwrap().ends_with("/etf/IE00BK5BQT80"));

    let res = h.client.get(h.url("/api/sitemap.xml")).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let xml = res.text().await.unwrap();
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("IE00BK5BQT80"));
}

#[tokio::test]
async fn calculators_validate_input() {
    let h = Harness::start().await;
    let (status, body) = h
        .post(
            "/api/simulate",
            json!({"initialAmount": 10000.0, "monthlyAmount": 500.0, "investmentPeriod": 10, "expectedReturn": 0.07}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["simulation"]["summary"]["totalInvested"], 70000.0);
    assert_eq!(body["scenarios"].as_array().unwrap().len(), 3);

    let (status, body) = h
        .post(
            "/api/simulate",
            json!({"initialAmount": -1.0, "monthlyAmount": 500.0, "investmentPeriod": 10, "expectedReturn": 0.07}),
        )
        .await;
    assert_eq!(status, 400);
    assert!(body["errors"].is_array());

    let input = json!({
        "initialAmount": 1000.0, "monthlyAmount": 100.0, "investmentPeriod": 5,
        "expectedReturn": 0.05, "iterations": 200, "seed": 7
    });
    let (_, a) = h.post("/api/simulate/monte-carlo", input.clone()).await;
    let (_, b) = h.post("/api/simulate/monte-carlo", input).await;
    assert_eq!(a, b);
    assert!(a["p10"].as_f64().unwrap() <= a["p90"].as_f64().unwrap());

    let oversized = json!({
        "initialAmount": 1000.0, "monthlyAmount": 100.0, "investmentPeriod": 5,
        "expectedReturn": 0.05, "iterations": 1u64 << 40
    });
    let (status, body) = h.post("/api/simulate/monte-carlo", oversized).await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 400);

    let (status, body) = h.post("/api/fire", json!({})).await;
    assert_eq!(status, 200);
    let target = body["report"]["result"]["fireNumber"].as_f64().unwrap();
    assert!((target - 600_000.0).abs() < 1e-6);
    assert!(body["share"].as_str().unwrap().contains("GuadagnareConETF"));
}

#[tokio::test]
async fn compare_and_portfolio() {
    let h = Harness::start().await;
    let (status, body) = h.post("/api/compare", json!({"etfs": ["VWCE", "CSPX"]})).await;
    assert_eq!(status, 200);
    assert_eq!(body["analysis"]["lowestCost"]["ticker"], "CSPX");

    let (status, _) = h.post("/api/compare", json!({"etfs": ["VWCE"]})).await;
    assert_eq!(status, 400);

    let (status, body) = h
        .post(
            "/api/portfolio/analyze",
            json!({"holdings": [{"etfId": "vwce", "allocation": 60.0}, {"etfId": "aggh", "allocation": 40.0}], "iterations": 100}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["validation"], "✓ Portafoglio completo (100%)");

    let (status, _) = h
        .post(
            "/api/portfolio/analyze",
            json!({"holdings": [{"etfId": "vwce", "allocation": 100.0}], "iterations": 1u64 << 40}),
        )
        .await;
    assert_eq!(status, 400);

    let eleven: Vec<Value> = Catalog::bundled()
        .unwrap()
        .all()
        .iter()
        .map(|e| json!({"etfId": e.id, "allocation": 100.0 / 11.0}))
        .collect();
    assert_eq!(eleven.len(), 11);
    let (status, body) = h.post("/api/portfolio/analyze", json!({"holdings": eleven})).await;
    assert_eq!(status, 400);
    assert!(body["error"].as_str().unwrap().contains("massimo 10"));

    let (_, templates) = h.get("/api/portfolio/templates").await;
    assert_eq!(templates.as_array().unwrap().len(), 3);
}

// ---------------------------------------------------------------------------
// Affiliate, blog and watchlist
// ---------------------------------------------------------------------------

#[tokio::test]
async fn broker_click_sets_cookie_and_counts() {
    let h = Harness::start().await;
    let res = h
        .client
        .post(h.url("/api/brokers/degiro/click"))
        .header("user-agent", "test-agent")
        .json(&json!({"source": "tabella"}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let cookie = res.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
    assert!(cookie.starts_with("affiliate_degiro="));

    let (status, _) = h.post("/api/brokers/nessuno/click", json!({})).await;
    assert_eq!(status, 404);

    let res = h
        .client
        .post(h.url("/api/events"))
        .json(&json!({"name": "affiliate_click", "data": {"broker": "spam-broker"}}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 204);

    let (_, brokers) = h.get("/api/brokers").await;
    assert_eq!(brokers["popular"].as_array().unwrap().len(), 1);
    assert_eq!(brokers["popular"][0][0], "degiro");
    assert_eq!(brokers["partners"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn articles_count_views_and_likes() {
    let h = Harness::start().await;
    // Seeds the demo content.
    let (_, sections) = h.get("/api/sections").await;
    assert!(!sections.as_array().unwrap().is_empty());

    let (_, list) = h.get("/api/articles").await;
    assert_eq!(list["count"], 1);
    let id = list["articles"][0]["id"].as_str().unwrap().to_string();

    let (status, article) = h.get(&format!("/api/articles/{}", id)).await;
    assert_eq!(status, 200);
    assert_eq!(article["views"], 1);

    let (status, liked) = h.post(&format!("/api/articles/{}/like", id), json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(liked["likes"], 1);

    let draft = h.state.lock_articles().all().iter().find(|a| !a.published).map(|a| a.id.clone()).unwrap();
    let (status, _) = h.get(&format!("/api/articles/{}", draft)).await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn watchlist_round_trip() {
    let h = Harness::start().await;
    let (status, body) = h.post("/api/watchlist", json!({"etfId": "IE00BK5BQT80"})).await;
    assert_eq!(status, 200);
    assert_eq!(body["watchlist"], json!(["vwce"]));
    let (_, again) = h.post("/api/watchlist", json!({"etfId": "vwce"})).await;
    assert_eq!(again["added"], false);
    let (status, _) = h.post("/api/watchlist", json!({"etfId": "nope"})).await;
    assert_eq!(status, 404);
    let res = h.client.delete(h.url("/api/watchlist")).json(&json!({"etfId": "vwce"})).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["removed"], true);
    assert_eq!(body["watchlist"], json!([]));
}

// ---------------------------------------------------------------------------
// Admin API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_start_hands_out_the_admin_password_once() {
    let h = Harness::start().await;
    let password = h.state.seed_console().unwrap().expect("fresh store generates credentials");
    assert_eq!(password.len(), 12);
    assert!(h.state.seed_console().unwrap().is_none());
    let valid = h.state.with_console(|c| Ok(c.verify_credentials("admin", &password))).unwrap();
    assert!(valid);
}

#[tokio::test]
async fn admin_requires_fresh_signature() {
    let h = Harness::start().await;
    let (status, _) = h.get("/api/admin/data").await;
    assert_eq!(status, 401);

    let stale = Utc::now().timestamp() - 600;
    let res = h
        .client
        .get(h.url("/api/admin/data"))
        .header("x-timestamp", stale.to_string())
        .header("x-signature", auth::sign(KEY, &Method::GET, "/api/admin/data", stale))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);

    // A read signature does not authorise the reset on the same path.
    let ts = Utc::now().timestamp();
    let res = h
        .client
        .delete(h.url("/api/admin/data"))
        .header("x-timestamp", ts.to_string())
        .header("x-signature", auth::sign(KEY, &Method::GET, "/api/admin/data", ts))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 401);

    let res = h.signed(reqwest::Method::GET, "/api/admin/data").send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let body: Value = res.json().await.unwrap();
    assert!(body["settings"].get("adminPassword").is_none());
    assert_eq!(body["brokers"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn admin_broker_crud_validates() {
    let h = Harness::start().await;
    let res = h
        .signed(reqwest::Method::POST, "/api/admin/brokers")
        .json(&json!({"name": "Fineco", "website": "https://finecobank.com", "rating": 4.2}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 201);

    let res = h
        .signed(reqwest::Method::POST, "/api/admin/brokers")
        .json(&json!({"name": "", "rating": 9.0}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status().as_u16(), 400);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);

    let res = h.signed(reqwest::Method::DELETE, "/api/admin/brokers/2").send().await.unwrap();
    let removed: Value = res.json().await.unwrap();
    assert_eq!(removed["name"], "Fineco");
    let res = h.signed(reqwest::Method::DELETE, "/api/admin/brokers/9").send().await.unwrap();
    assert_eq!(res.status().as_u16(), 404);
}

#[tokio::test]
async fn backup_download_restore_and_undo() {
    let h = Harness::start().await;
    let res = h.signed(reqwest::Method::GET, "/api/admin/backup").send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let disposition = res.headers().get("content-disposition").unwrap().to_str().unwrap().to_string();
    assert!(disposition.contains("etf-admin-backup-"));
    let checksum = res.headers().get("x-checksum").unwrap().to_str().unwrap().to_string();
    let text = res.text().await.unwrap();
    assert_eq!(checksum, etfitalia::backup::checksum(text.as_bytes()));

    let mut backup: Value = serde_json::from_str(&text).unwrap();
    let first = backup["data"]["brokers"][0].clone();
    backup["data"]["brokers"] = json!([first]);
    let res = h.signed(reqwest::Method::POST, "/api/admin/backup").json(&backup).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let res = h.signed(reqwest::Method::GET, "/api/admin/data").send().await.unwrap();
    let data: Value = res.json().await.unwrap();
    assert_eq!(data["brokers"].as_array().unwrap().len(), 1);

    let res = h.signed(reqwest::Method::POST, "/api/admin/backup").json(&json!({"nope": 1})).send().await.unwrap();
    assert_eq!(res.status().as_u16(), 400);

    let res = h.signed(reqwest::Method::POST, "/api/admin/backup/undo").send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
    let restored: Value = res.json().await.unwrap();
    assert_eq!(restored["brokers"].as_array().unwrap().len(), 2);

    let res = h.signed(reqwest::Method::POST, "/api/admin/backup/undo").send().await.unwrap();
    assert_eq!(res.status().as_u16(), 404);
}

#[tokio::test]
async fn mutating_admin_calls_are_rate_limited() {
    let h = Harness::start().await;
    let mut last = 0;
    for _ in 0..21 {
        let res = h.signed(reqwest::Method::POST, "/api/admin/sections/blog/toggle").send().await.unwrap();
        last = res.status().as_u16();
    }
    assert_eq!(last, 429);
    let res = h.signed(reqwest::Method::GET, "/api/admin/settings").send().await.unwrap();
    assert_eq!(res.status().as_u16(), 200);
}
