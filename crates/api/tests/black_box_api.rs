use std::net::{IpAddr, Ipv4Addr};

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use stockbook_api::config::AppConfig;
use stockbook_auth::{JwtClaims, Role, UserId};

const SECRET: &str = "black-box-secret";

struct TestServer {
    base_url: String,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod, bound to an ephemeral port.
        let config = AppConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            jwt_secret: SECRET.to_string(),
            ..AppConfig::default()
        };
        let app = stockbook_api::app::build_app(&config).await.expect("failed to build app");
        let listener = tokio::net::TcpListener::bind(config.socket_addr())
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            handle,
        }
    }

    async fn send(&self, method: reqwest::Method, path: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = self.client.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        let body = res.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }

    async fn get(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::GET, path, Some(token), None).await
    }

    async fn post(&self, path: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(reqwest::Method::POST, path, Some(token), Some(body)).await
    }

    async fn delete(&self, path: &str, token: &str) -> (StatusCode, Value) {
        self.send(reqwest::Method::DELETE, path, Some(token), None).await
    }

    /// POST and return the created id.
    async fn create(&self, path: &str, token: &str, body: Value) -> String {
        let (status, body) = self.post(path, token, body).await;
        assert_eq!(status, StatusCode::CREATED, "POST {path}: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(sub: UserId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

fn admin_token() -> String {
    mint_jwt(UserId::generate(), vec![Role::admin()])
}

/// Packaging type + product with `units_per_package` units per carton.
async fn carton_product(server: &TestServer, token: &str, reference: &str, units_per_package: u32) -> String {
    let packaging = server
        .create(
            "/packaging-types",
            token,
            json!({ "name": format!("Carton {reference}"), "code": format!("C{reference}") }),
        )
        .await;
    server
        .create(
            "/products",
            token,
            json!({
                "reference": reference,
                "name": format!("Product {reference}"),
                "packaging_type_id": packaging,
                "purchase_price": 250,
                "units_per_package": units_per_package,
            }),
        )
        .await
}

struct Depot {
    main: String,
    shop: String,
    supplier: String,
    customer: String,
}

async fn depot(server: &TestServer, token: &str) -> Depot {
    Depot {
        main: server.create("/warehouses", token, json!({ "name": "Main", "code": "main" })).await,
        shop: server.create("/warehouses", token, json!({ "name": "Shop", "code": "shop" })).await,
        supplier: server.create("/suppliers", token, json!({ "name": "Acme Supply" })).await,
        customer: server.create("/customers", token, json!({ "name": "Café Atlas" })).await,
    }
}

async fn stock(server: &TestServer, token: &str, product: &str, warehouse: &str) -> i64 {
    let (status, body) = server.get(&format!("/stocks/{product}/{warehouse}"), token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["stock"]["quantity"].as_i64().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn protected_routes_require_a_bearer_token() {
    let server = TestServer::spawn().await;

    let (status, _) = server.send(reqwest::Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.send(reqwest::Method::GET, "/products", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = server.get("/products", "not-a-jwt").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test(flavor = "multi_thread")]
async fn whoami_echoes_the_token_subject() {
    let server = TestServer::spawn().await;
    let user = UserId::generate();
    let token = mint_jwt(user, vec![Role::new(Role::CLERK)]);

    let (status, body) = server.get("/whoami", &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_id"], user.to_string());
    assert_eq!(body["roles"], json!(["clerk"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn viewers_read_but_cannot_write() {
    let server = TestServer::spawn().await;
    let viewer = mint_jwt(UserId::generate(), vec![Role::new(Role::VIEWER)]);

    let (status, _) = server.get("/categories", &viewer).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.post("/categories", &viewer, json!({ "name": "Drinks" })).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test(flavor = "multi_thread")]
async fn duplicate_packaging_code_is_rejected() {
    let server = TestServer::spawn().await;
    let token = admin_token();

    server.create("/packaging-types", &token, json!({ "name": "Carton", "code": "CTN" })).await;
    let (status, body) = server
        .post("/packaging-types", &token, json!({ "name": "Big carton", "code": " ctn " }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["errors"]["code"], json!(["has already been taken"]));
}

#[tokio::test(flavor = "multi_thread")]
async fn packaging_type_in_use_cannot_be_deleted() {
    let server = TestServer::spawn().await;
    let token = admin_token();

    let packaging = server.create("/packaging-types", &token, json!({ "name": "Pack", "code": "PCK" })).await;
    let product = server
        .create(
            "/products",
            &token,
            json!({ "reference": "P-1", "name": "Soap", "packaging_type_id": packaging }),
        )
        .await;

    let (_, listed) = server.get("/packaging-types", &token).await;
    assert_eq!(listed[0]["products_count"], 1);

    let (status, body) = server.delete(&format!("/packaging-types/{packaging}"), &token).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "in_use");

    let (status, _) = server.delete(&format!("/products/{product}"), &token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.delete(&format!("/packaging-types/{packaging}"), &token).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = server.get(&format!("/packaging-types/{packaging}"), &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(flavor = "multi_thread")]
async fn product_requires_a_packaging_type() {
    let server = TestServer::spawn().await;
    let token = admin_token();

    let (status, body) = server
        .post("/products", &token, json!({ "reference": "P-1", "name": "Soap" }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["packaging_type_id"].is_array(), "{body}");
}

#[tokio::test(flavor = "multi_thread")]
async fn transfer_needs_both_warehouses() {
    let server = TestServer::spawn().await;
    let token = admin_token();
    let depot = depot(&server, &token).await;

    let (status, body) = server
        .post("/operation/transfer", &token, json!({ "from_warehouse_id": depot.main }))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"]["to_warehouse_id"].is_array(), "{body}");

    let (status, _) = server.get("/operations", &token).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread")]
async fn completing_sums_lines_of_the_same_product() {
    let server = TestServer::spawn().await;
    let token = admin_token();
    let depot = depot(&server, &token).await;
    let product = carton_product(&server, &token, "W1", 12).await;

    let movement = server
        .create(
            "/operation/incoming",
            &token,
            json!({
                "to_warehouse_id": depot.main,
                "supplier_id": depot.supplier,
                "items": [
                    { "product_id": product, "quantity": 5 },
                    { "product_id": product, "quantity": 2, "unit": "CW1" },
                ],
            }),
        )
        .await;

    let (status, body) = server.post(&format!("/operation/{movement}/complete"), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "completed");
    assert_eq!(stock(&server, &token, &product, &depot.main).await, 29);

    // Completed is terminal.
    let (status, _) = server.post(&format!("/operation/{movement}/complete"), &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = server.post(&format!("/operation/{movement}/cancel"), &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(stock(&server, &token, &product, &depot.main).await, 29);

    let (_, history) = server.get(&format!("/stocks/{product}/{}", depot.main), &token).await;
    assert_eq!(history["history"].as_array().unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn overdrawn_outgoing_posts_nothing() {
    let server = TestServer::spawn().await;
    let token = admin_token();
    let depot = depot(&server, &token).await;
    let product = carton_product(&server, &token, "W2", 6).await;

    let (status, _) = server
        .post("/stocks", &token, json!({ "product_id": product, "warehouse_id": depot.shop, "quantity": 4 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let movement = server
        .create(
            "/operation/outgoing",
            &token,
            json!({
                "from_warehouse_id": depot.shop,
                "customer_id": depot.customer,
                "items": [
                    { "product_id": product, "quantity": 3 },
                    { "product_id": product, "quantity": 3 },
                ],
            }),
        )
        .await;

    let (status, body) = server.post(&format!("/operation/{movement}/complete"), &token, json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invariant_violation");
    assert_eq!(stock(&server, &token, &product, &depot.shop).await, 4);

    let (_, shown) = server.get(&format!("/operations/{movement}"), &token).await;
    assert_eq!(shown["status"], "draft");

    // Still a draft, so it can be trimmed and completed.
    let (status, _) = server.delete(&format!("/operation/{movement}/items/2"), &token).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = server.post(&format!("/operation/{movement}/complete"), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock(&server, &token, &product, &depot.shop).await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn invoice_renders_one_row_per_item() {
    let server = TestServer::spawn().await;
    let token = admin_token();
    let depot = depot(&server, &token).await;
    let first = carton_product(&server, &token, "W3", 10).await;
    let second = carton_product(&server, &token, "W4", 10).await;

    let movement = server
        .create(
            "/operation/incoming",
            &token,
            json!({
                "to_warehouse_id": depot.main,
                "supplier_id": depot.supplier,
                "items": [
                    { "product_id": first, "quantity": 2, "unit_price": 1000 },
                    { "product_id": second, "quantity": 3 },
                    { "product_id": first, "quantity": 1, "unit_price": 900 },
                ],
            }),
        )
        .await;

    let res = server
        .client
        .get(format!("{}/pdf/operation/{movement}/preview", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers()["content-type"].to_str().unwrap().starts_with("text/html"));
    let html = res.text().await.unwrap();
    assert_eq!(html.matches("<tr class=\"line\">").count(), 3);
    assert!(html.contains("PROFORMA"));

    let res = server
        .client
        .get(format!("{}/pdf/operation/{movement}/invoice", server.base_url))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["content-type"], "application/pdf");
    assert!(res.headers()["content-disposition"].to_str().unwrap().starts_with("attachment"));
    assert!(res.bytes().await.unwrap().starts_with(b"%PDF"));

    let (status, _) = server.post(&format!("/operation/{movement}/cancel"), &token, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = server.get(&format!("/pdf/operation/{movement}/preview"), &token).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "invoice_unavailable");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simultaneous_requests_keep_stock_and_references_consistent() {
    let server = TestServer::spawn().await;
    let token = admin_token();
    let depot = depot(&server, &token).await;
    let product = carton_product(&server, &token, "R1", 6).await;
    let incoming = json!({
        "to_warehouse_id": depot.main,
        "supplier_id": depot.supplier,
        "items": [{ "product_id": product, "quantity": 5 }],
    });

    let mut ids = Vec::new();
    for _ in 0..5 {
        let (a, b, c, d) = tokio::join!(
            server.post("/operation/incoming", &token, incoming.clone()),
            server.post("/operation/incoming", &token, incoming.clone()),
            server.post("/operation/incoming", &token, incoming.clone()),
            server.post("/operation/incoming", &token, incoming.clone()),
        );
        for (status, body) in [a, b, c, d] {
            assert_eq!(status, StatusCode::CREATED, "{body}");
            ids.push(body["id"].as_str().unwrap().to_string());
        }
    }

    let (status, list) = server.get("/operations", &token).await;
    assert_eq!(status, StatusCode::OK);
    let references: std::collections::HashSet<_> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["reference"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(references.len(), 20);

    let path = format!("/operation/{}/complete", ids[0]);
    let (a, b, c, d) = tokio::join!(
        server.post(&path, &token, json!({})),
        server.post(&path, &token, json!({})),
        server.post(&path, &token, json!({})),
        server.post(&path, &token, json!({})),
    );
    let statuses = [a.0, b.0, c.0, d.0];
    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert!(statuses
        .iter()
        .all(|s| *s == StatusCode::OK || *s == StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(stock(&server, &token, &product, &depot.main).await, 5);

    let (_, shown) = server.get(&format!("/operations/{}", ids[0]), &token).await;
    assert_eq!(shown["status"], "completed");
}
