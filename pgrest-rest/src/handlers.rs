//! HTTP handlers for REST API endpoints

use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;
use tracing::error;

use pgrest_common::error::Error;
use pgrest_common::types::ApiError;

use crate::query::QueryParams;
use crate::service::RestService;

/// Shared REST API state
pub struct RestState {
    pub service: RestService,
}

impl RestState {
    pub fn new(service: RestService) -> Self {
        Self { service }
    }
}

/// Register every route under `base_path`
pub fn configure(cfg: &mut web::ServiceConfig, base_path: &str) {
    let base = base_path.trim_end_matches('/');
    cfg.route("/health", web::get().to(health_handler))
        .route(
            "/admin/schema/invalidate",
            web::post().to(invalidate_schema_handler),
        )
        .route(&format!("{base}/{{table}}/upsert"), web::post().to(upsert_handler))
        .route(&format!("{base}/{{table}}"), web::get().to(select_handler))
        .route(&format!("{base}/{{table}}"), web::post().to(insert_handler))
        .route(&format!("{base}/{{table}}/{{key}}"), web::get().to(get_handler))
        .route(&format!("{base}/{{table}}/{{key}}"), web::patch().to(update_handler))
        .route(&format!("{base}/{{table}}/{{key}}"), web::put().to(update_handler))
        .route(&format!("{base}/{{table}}/{{key}}"), web::delete().to(delete_handler));
}

/// Render an error as an `ApiError` body with its status code
pub fn error_response(err: &Error) -> HttpResponse {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "request failed");
    }
    HttpResponse::build(status).json(ApiError::from(err))
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// GET /{table} - List rows, offset or cursor paginated
pub async fn select_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    req: HttpRequest,
) -> HttpResponse {
    let table = path.into_inner();
    let params = QueryParams::parse(req.query_string());

    if params.has_cursor_params() {
        return match state.service.list_cursor(&table, &params).await {
            Ok(page) => HttpResponse::Ok().json(page),
            Err(e) => error_response(&e),
        };
    }

    match state.service.list(&table, &params).await {
        Ok(page) => {
            let range = if page.data.is_empty() {
                format!("*/{}", page.pagination.total)
            } else {
                format!(
                    "{}-{}/{}",
                    page.pagination.offset,
                    page.pagination.offset + page.data.len() - 1,
                    page.pagination.total
                )
            };
            HttpResponse::Ok()
                .insert_header(("Content-Range", range))
                .json(page)
        }
        Err(e) => error_response(&e),
    }
}

/// GET /{table}/{key} - Read one row by key
pub async fn get_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (table, key) = path.into_inner();
    let params = QueryParams::parse(req.query_string());
    match state.service.get(&table, &key, &params).await {
        Ok(row) => HttpResponse::Ok().json(row),
        Err(e) => error_response(&e),
    }
}

/// POST /{table} - Insert one object or an array of objects
pub async fn insert_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let table = path.into_inner();
    match state.service.create(&table, body.into_inner()).await {
        Ok(created) => HttpResponse::Created().json(created),
        Err(e) => error_response(&e),
    }
}

/// POST /{table}/upsert - Insert or update on the primary key
pub async fn upsert_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<String>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let table = path.into_inner();
    match state.service.upsert(&table, body.into_inner()).await {
        Ok(rows) => HttpResponse::Ok().json(rows),
        Err(e) => error_response(&e),
    }
}

/// PATCH|PUT /{table}/{key} - Update one row
pub async fn update_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    let (table, key) = path.into_inner();
    match state.service.update(&table, &key, body.into_inner()).await {
        Ok(row) => HttpResponse::Ok().json(row),
        Err(e) => error_response(&e),
    }
}

/// DELETE /{table}/{key} - Delete one row
pub async fn delete_handler(
    state: web::Data<Arc<RestState>>,
    path: web::Path<(String, String)>,
) -> HttpResponse {
    let (table, key) = path.into_inner();
    match state.service.delete(&table, &key).await {
        Ok(deleted) => HttpResponse::NoContent()
            .insert_header(("X-Deleted-Count", deleted.to_string()))
            .finish(),
        Err(e) => error_response(&e),
    }
}

/// POST /admin/schema/invalidate - Drop the cached schema snapshot
pub async fn invalidate_schema_handler(state: web::Data<Arc<RestState>>) -> HttpResponse {
    state.service.invalidate_schema();
    HttpResponse::Ok().json(serde_json::json!({ "status": "invalidated" }))
}

/// Health check
pub async fn health_handler() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "rest",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use pgrest_common::config::PgRestConfig;
    use serde_json::{json, Value};

    use crate::backend::{row, RecordingExecutor, SqlValue};
    use crate::schema::fixtures::blog_cache;

    fn state(executor: RecordingExecutor) -> Arc<RestState> {
        Arc::new(RestState::new(RestService::new(
            PgRestConfig::default(),
            blog_cache(),
            Arc::new(executor),
        )))
    }

    fn users_executor() -> RecordingExecutor {
        RecordingExecutor::new()
            .on_query("COUNT(*)", vec![row([("count", SqlValue::Int(2))])])
            .on_query(
                "FROM users",
                vec![
                    row([("id", SqlValue::Int(1)), ("name", SqlValue::Text("John".into()))]),
                    row([("id", SqlValue::Int(2)), ("name", SqlValue::Text("Jane".into()))]),
                ],
            )
    }

    #[actix_rt::test]
    async fn test_health() {
        let app = test::init_service(
            App::new().configure(|cfg| configure(cfg, "/api")),
        )
        .await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
    }

    #[actix_rt::test]
    async fn test_list_sets_content_range() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(users_executor())))
                .configure(|cfg| configure(cfg, "/api")),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/users?limit=2").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        assert_eq!(
            resp.headers().get("Content-Range").unwrap().to_str().unwrap(),
            "0-1/2"
        );
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["pagination"]["total"], json!(2));
        assert_eq!(body["data"][1]["name"], json!("Jane"));
    }

    #[actix_rt::test]
    async fn test_cursor_list() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(users_executor())))
                .configure(|cfg| configure(cfg, "/api")),
        )
        .await;
        let req = test::TestRequest::get().uri("/api/users?first=1").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["edges"].as_array().unwrap().len(), 1);
        assert_eq!(body["pageInfo"]["hasNextPage"], json!(true));
    }

    #[actix_rt::test]
    async fn test_errors_map_to_status_codes() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(RecordingExecutor::new())))
                .configure(|cfg| configure(cfg, "/api")),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/ghosts").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["code"], json!("table_not_found"));

        let req = test::TestRequest::get()
            .uri("/api/users?name=eq.x%3Bdrop")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 400);

        let req = test::TestRequest::get().uri("/api/users/42").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::delete().uri("/api/users/42").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);
    }

    #[actix_rt::test]
    async fn test_write_routes() {
        let executor = RecordingExecutor::new()
            .on_query(
                "INSERT INTO users",
                vec![row([("id", SqlValue::Int(3)), ("name", SqlValue::Text("Ann".into()))])],
            )
            .on_query(
                "UPDATE users",
                vec![row([("id", SqlValue::Int(3)), ("name", SqlValue::Text("Bo".into()))])],
            )
            .on_execute_with("DELETE FROM users", |_, _| Ok(1));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(executor)))
                .configure(|cfg| configure(cfg, "/api")),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/users")
            .set_json(json!({"name": "Ann"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let req = test::TestRequest::patch()
            .uri("/api/users/3")
            .set_json(json!({"name": "Bo"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["name"], json!("Bo"));

        let req = test::TestRequest::delete().uri("/api/users/3").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 204);
        assert_eq!(resp.headers().get("X-Deleted-Count").unwrap(), "1");

        let req = test::TestRequest::post()
            .uri("/admin/schema/invalidate")
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 200);
    }
}
