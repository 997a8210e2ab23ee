use actix_web::error::InternalError;
use actix_web::{http::header, middleware, web, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::core::{JobStatus, PlaceScrapeService};
use crate::error::PlaceScrapeError;
use crate::export::ExportFormat;

/// Requested record count when a submission leaves it out
pub const DEFAULT_TOTAL: i64 = 10;

/// API request for a scraping job
#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub search_query: Option<String>,
    pub total: Option<i64>,
}

/// API response for an accepted scraping job
#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    pub job_id: String,
    pub message: String,
    pub status: JobStatus,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'static str>,
    message: String,
}

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config()).service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/scrape", web::post().to(start_scraping))
            .route("/jobs", web::get().to(list_jobs))
            .route("/jobs/{job_id}", web::get().to(get_job))
            .route("/jobs/{job_id}", web::delete().to(delete_job))
            .route("/results/{job_id}", web::get().to(get_results))
            .route("/results/{job_id}/download", web::get().to(download_results)),
    );
}

/// Headers added to every response when cross-origin access is enabled
pub fn cors_headers() -> middleware::DefaultHeaders {
    middleware::DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, DELETE, OPTIONS"))
}

/// Malformed JSON bodies get the same error shape as every other failure
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid request body: {}", err);
        let response = HttpResponse::BadRequest().json(ErrorBody { error: message });
        InternalError::from_response(err, response).into()
    })
}

/// Map a service error to its HTTP response
fn error_response(err: &PlaceScrapeError) -> HttpResponse {
    let body = |message: String| ErrorBody { error: message };

    if err.is_user_facing() {
        warn!(error_category = err.category(), "API: request rejected: {}", err);
    } else {
        error!(error_category = err.category(), "API: request failed: {}", err);
    }

    match err {
        PlaceScrapeError::Validation { message } => HttpResponse::BadRequest().json(body(message.clone())),
        PlaceScrapeError::QueueFull => {
            HttpResponse::ServiceUnavailable().json(body("Too many jobs waiting, try again later".to_string()))
        }
        PlaceScrapeError::JobNotFound { .. } => HttpResponse::NotFound().json(body("Job not found".to_string())),
        PlaceScrapeError::NotReady { .. } => {
            HttpResponse::BadRequest().json(body("Job not completed yet".to_string()))
        }
        PlaceScrapeError::ResultsMissing { .. } => {
            HttpResponse::NotFound().json(body("Results file not found".to_string()))
        }
        other => HttpResponse::InternalServerError().json(body(other.to_string())),
    }
}

async fn health_check() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(MessageBody {
        status: Some("ok"),
        message: "API is running".to_string(),
    }))
}

/// Accept a scraping job
async fn start_scraping(
    app: web::Data<PlaceScrapeService>,
    req: web::Json<ScrapeRequest>,
) -> ActixResult<HttpResponse> {
    let req = req.into_inner();
    let query = req.search_query.unwrap_or_default();
    let total = req.total.unwrap_or(DEFAULT_TOTAL);
    info!("API: Scrape requested for '{}' ({} records)", query, total);

    match app.submit(&query, total) {
        Ok(job) => Ok(HttpResponse::Accepted().json(ScrapeResponse {
            job_id: job.id,
            message: "Scraping job started".to_string(),
            status: job.status,
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn get_job(app: web::Data<PlaceScrapeService>, path: web::Path<String>) -> ActixResult<HttpResponse> {
    let job_id = path.into_inner();

    match app.get_job(&job_id) {
        Ok(job) => Ok(HttpResponse::Ok().json(job)),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn list_jobs(app: web::Data<PlaceScrapeService>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(app.list_jobs()))
}

async fn get_results(app: web::Data<PlaceScrapeService>, path: web::Path<String>) -> ActixResult<HttpResponse> {
    let job_id = path.into_inner();

    match app.get_results(&job_id).await {
        Ok(results) => Ok(HttpResponse::Ok().json(results)),
        Err(e) => Ok(error_response(&e)),
    }
}

/// Completed results as a CSV attachment
async fn download_results(
    app: web::Data<PlaceScrapeService>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let job_id = path.into_inner();
    let format = ExportFormat::Csv;

    match app.export_results(&job_id, format).await {
        Ok(bytes) => Ok(HttpResponse::Ok()
            .content_type(format.content_type())
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}.{}\"", job_id, format.extension()),
            ))
            .body(bytes)),
        Err(e) => Ok(error_response(&e)),
    }
}

async fn delete_job(app: web::Data<PlaceScrapeService>, path: web::Path<String>) -> ActixResult<HttpResponse> {
    let job_id = path.into_inner();
    info!("API: Deleting job {}", job_id);

    match app.delete_job(&job_id).await {
        Ok(_) => Ok(HttpResponse::Ok().json(MessageBody {
            status: None,
            message: "Job deleted successfully".to_string(),
        })),
        Err(e) => Ok(error_response(&e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, StorageBackend};
    use crate::scraper::testing::{FakeLauncher, FakeSite};
    use actix_web::{test, App};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn service(site: FakeSite) -> PlaceScrapeService {
        let mut config = AppConfig::default();
        config.scraping = config.scraping.without_settle_delays();
        config.storage.backend = StorageBackend::Memory;
        PlaceScrapeService::new(config, Arc::new(FakeLauncher::new(site))).unwrap()
    }

    macro_rules! app {
        ($service:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($service.clone()))
                    .configure(configure_routes),
            )
            .await
        };
    }

    async fn completed_job(service: &PlaceScrapeService, query: &str, total: i64) -> String {
        let job = service.submit(query, total).unwrap();
        service.wait_for_job(&job.id, Duration::from_millis(5)).await.unwrap();
        job.id
    }

    #[actix_web::test]
    async fn test_health() {
        let service = service(FakeSite::with_listings(1, 1));
        let app = app!(service);

        let body: Value = test::call_and_read_body_json(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert_eq!(body, json!({"status": "ok", "message": "API is running"}));
    }

    #[actix_web::test]
    async fn test_scrape_is_accepted() {
        let service = service(FakeSite::with_listings(5, 5));
        let app = app!(service);

        let req = test::TestRequest::post()
            .uri("/api/scrape")
            .set_json(json!({"search_query": "cafés Montmartre", "total": 3}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 202);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "pending");
        assert_eq!(body["message"], "Scraping job started");
        assert!(body["job_id"].as_str().unwrap().starts_with("job_1_"));
    }

    #[actix_web::test]
    async fn test_total_defaults_to_ten() {
        let service = service(FakeSite::with_listings(5, 5));
        let app = app!(service);

        let req = test::TestRequest::post()
            .uri("/api/scrape")
            .set_json(json!({"search_query": "kebab"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;

        let job = service.get_job(body["job_id"].as_str().unwrap()).unwrap();
        assert_eq!(job.requested_count, 10);
    }

    #[actix_web::test]
    async fn test_invalid_submissions() {
        let service = service(FakeSite::with_listings(5, 5));
        let app = app!(service);

        let cases = [
            (json!({"total": 5}), "search_query is required"),
            (json!({"search_query": "", "total": 5}), "search_query is required"),
            (json!({"search_query": "pizza", "total": 0}), "total must be between 1 and 100"),
            (json!({"search_query": "pizza", "total": 101}), "total must be between 1 and 100"),
        ];
        for (payload, message) in cases {
            let req = test::TestRequest::post().uri("/api/scrape").set_json(payload).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], message);
        }

        let req = test::TestRequest::post()
            .uri("/api/scrape")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload("{\"search_query\": ")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid request body"));

        assert!(service.list_jobs().is_empty());
    }

    #[actix_web::test]
    async fn test_unknown_job_is_404_everywhere() {
        let service = service(FakeSite::with_listings(5, 5));
        let app = app!(service);

        for req in [
            test::TestRequest::get().uri("/api/jobs/job_7_x"),
            test::TestRequest::delete().uri("/api/jobs/job_7_x"),
            test::TestRequest::get().uri("/api/results/job_7_x"),
            test::TestRequest::get().uri("/api/results/job_7_x/download"),
        ] {
            let resp = test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), 404);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Job not found");
        }
    }

    #[actix_web::test]
    async fn test_results_and_download() {
        let service = service(FakeSite::with_listings(8, 4));
        let app = app!(service);
        let job_id = completed_job(&service, "patisserie", 4).await;

        let req = test::TestRequest::get().uri(&format!("/api/jobs/{job_id}")).to_request();
        let job: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(job["status"], "completed");
        assert_eq!(job["result_count"], 4);
        assert!(job["error"].is_null());

        let req = test::TestRequest::get().uri(&format!("/api/results/{job_id}")).to_request();
        let results: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(results["job_id"], job_id.as_str());
        assert_eq!(results["count"], 4);
        assert_eq!(results["data"][3]["name"], "Place 3");

        let req = test::TestRequest::get()
            .uri(&format!("/api/results/{job_id}/download"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let disposition = resp.headers().get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap().to_string();
        assert_eq!(disposition, format!("attachment; filename=\"{job_id}.csv\""));
        let body = test::read_body(resp).await;
        let csv = std::str::from_utf8(&body).unwrap();
        assert_eq!(csv.lines().count(), 5);
        assert!(csv.starts_with("name,address,website,phone_number,"));
    }

    #[actix_web::test]
    async fn test_results_of_unfinished_job() {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        let mut site = FakeSite::with_listings(3, 3);
        site.gate = Some(gate.clone());
        let service = service(site);
        let app = app!(service);

        let job = service.submit("brunch", 3).unwrap();
        for uri in [format!("/api/results/{}", job.id), format!("/api/results/{}/download", job.id)] {
            let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
            assert_eq!(resp.status(), 400);
            let body: Value = test::read_body_json(resp).await;
            assert_eq!(body["error"], "Job not completed yet");
        }
        gate.add_permits(1);
    }

    #[actix_web::test]
    async fn test_delete_then_lookup() {
        let service = service(FakeSite::with_listings(3, 3));
        let app = app!(service);
        let job_id = completed_job(&service, "sandwich", 2).await;

        let req = test::TestRequest::delete().uri(&format!("/api/jobs/{job_id}")).to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["message"], "Job deleted successfully");

        let req = test::TestRequest::get().uri(&format!("/api/results/{job_id}")).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), 404);

        let req = test::TestRequest::get().uri("/api/jobs").to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(jobs, json!([]));
    }

    #[actix_web::test]
    async fn test_list_jobs_in_submission_order() {
        let service = service(FakeSite::with_listings(3, 3));
        let app = app!(service);
        let first = service.submit("one", 1).unwrap().id;
        let second = service.submit("two", 1).unwrap().id;

        let req = test::TestRequest::get().uri("/api/jobs").to_request();
        let jobs: Value = test::call_and_read_body_json(&app, req).await;
        let ids: Vec<&str> = jobs.as_array().unwrap().iter().map(|j| j["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec![first.as_str(), second.as_str()]);
    }

    #[actix_web::test]
    async fn test_cors_headers() {
        let service = service(FakeSite::with_listings(1, 1));
        let app = test::init_service(
            App::new()
                .wrap(cors_headers())
                .app_data(web::Data::new(service.clone()))
                .configure(configure_routes),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }
}
