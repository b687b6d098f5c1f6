//! API Routes module for the anime tracker
//!
//! `POST /api/message` carries the tagged request/reply contract used by page
//! observers. The REST endpoints expose the history view and maintenance
//! operations over the same coordinator.

use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::availability::AvailabilityReport;
use crate::config::Config;
use crate::coordinator::{Observation, SaveCoordinator, SaveOutcome};
use crate::models::{
    lenient_string, ApiError, ApiResponse, EpisodeRecord, HistoryEntry, LastEpisode, LinkLookup,
    PageEpisodeInfo, Settings,
};
use crate::store::RemoveOutcome;

/// Application state shared across handlers
pub struct AppState {
    pub coordinator: Arc<SaveCoordinator>,
    pub config: Config,
}

/// A request on the message channel, selected by its `action` field
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MessageRequest {
    #[serde(rename_all = "camelCase")]
    SaveEpisode {
        episode_url: String,
        #[serde(default)]
        save_next: bool,
        #[serde(default)]
        page_markup: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    CheckNextEpisode {
        next_episode_url: String,
        group_name: String,
        #[serde(deserialize_with = "lenient_string")]
        episode_number: String,
    },
    ClearStorage,
    #[serde(rename_all = "camelCase")]
    GetEpisodeInfo {
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        page_markup: Option<String>,
    },
    #[serde(rename = "getPageDOM")]
    GetPageDom { url: String },
    #[serde(rename_all = "camelCase")]
    ShowLastEpisode { link_url: String },
}

/// Reply to `saveEpisode`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SaveReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Reply to `checkNextEpisode`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityReply {
    pub is_available: bool,
}

/// Reply to `clearStorage`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SuccessReply {
    pub success: bool,
}

/// Result of removing an episode
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReply {
    /// The series was dropped with its last episode
    pub series_removed: bool,
    /// Episodes left in the series
    pub remaining: usize,
}

/// Query parameters for a re-validation run
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct RefreshQuery {
    /// Ignore cached answers (default true)
    pub force: Option<bool>,
}

async fn save_episode(
    coordinator: &SaveCoordinator,
    episode_url: String,
    save_next: bool,
    page_markup: Option<String>,
) -> HttpResponse {
    let observation = Observation {
        episode_url,
        save_next,
        page_markup,
    };

    match coordinator.save_observed_episode(observation).await {
        Ok(outcome) => {
            if let SaveOutcome::Saved {
                series_key,
                episode_number,
                ..
            } = &outcome
            {
                info!("Saved episode {} of {}", episode_number, series_key);
            }
            HttpResponse::Ok().json(SaveReply {
                success: true,
                message: outcome.message().map(String::from),
            })
        }
        Err(e) => {
            error!("Save failed: {}", e);
            e.error_response()
        }
    }
}

/// POST /api/message - Handle one tagged request
///
/// Actions: `saveEpisode`, `checkNextEpisode`, `clearStorage`,
/// `getEpisodeInfo`, `getPageDOM`, `showLastEpisode`.
#[utoipa::path(
    post,
    path = "/api/message",
    tag = "messages",
    responses(
        (status = 200, description = "Reply for the requested action"),
        (status = 400, description = "Malformed request", body = ApiError),
        (status = 404, description = "No saved episodes for the series", body = ApiError),
        (status = 422, description = "No episode info in the link", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError),
        (status = 502, description = "Page could not be fetched", body = ApiError)
    )
)]
pub async fn handle_message(
    data: web::Data<AppState>,
    body: web::Json<MessageRequest>,
) -> impl Responder {
    let coordinator = data.coordinator.as_ref();

    match body.into_inner() {
        MessageRequest::SaveEpisode {
            episode_url,
            save_next,
            page_markup,
        } => save_episode(coordinator, episode_url, save_next, page_markup).await,

        MessageRequest::CheckNextEpisode {
            next_episode_url,
            group_name,
            episode_number,
        } => match coordinator
            .check_next_episode(&next_episode_url, &group_name, &episode_number)
            .await
        {
            Ok(is_available) => HttpResponse::Ok().json(AvailabilityReply { is_available }),
            Err(e) => {
                warn!("Next-episode check for {} failed: {}", group_name, e);
                e.error_response()
            }
        },

        MessageRequest::ClearStorage => match coordinator.clear_storage().await {
            Ok(()) => {
                info!("Cleared all stored data");
                HttpResponse::Ok().json(SuccessReply { success: true })
            }
            Err(e) => {
                error!("Failed to clear storage: {}", e);
                e.error_response()
            }
        },

        MessageRequest::GetEpisodeInfo { url, page_markup } => {
            match coordinator.episode_info(url.as_deref(), page_markup).await {
                Ok(info) => HttpResponse::Ok().json(info),
                Err(e) => e.error_response(),
            }
        }

        MessageRequest::GetPageDom { url } => match coordinator.page_dom(&url).await {
            Ok(html) => HttpResponse::Ok().json(html),
            Err(e) => {
                warn!("Failed to fetch page {}: {}", url, e);
                e.error_response()
            }
        },

        MessageRequest::ShowLastEpisode { link_url } => {
            match coordinator.last_episode_for_link(&link_url).await {
                Ok(lookup) => HttpResponse::Ok().json(lookup),
                Err(e) => e.error_response(),
            }
        }
    }
}

/// GET /api/history - Latest saved episodes, newest first
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "history",
    responses(
        (status = 200, description = "History retrieved successfully", body = Vec<HistoryEntry>),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn get_history(data: web::Data<AppState>) -> impl Responder {
    match data.coordinator.history().await {
        Ok(history) => HttpResponse::Ok().json(ApiResponse::new(history)),
        Err(e) => {
            error!("Failed to read history: {}", e);
            e.error_response()
        }
    }
}

/// GET /api/series/{key}/last - Last saved episode of a series
#[utoipa::path(
    get,
    path = "/api/series/{key}/last",
    tag = "history",
    params(
        ("key" = String, Path, description = "Series title or stored key")
    ),
    responses(
        (status = 200, description = "Last episode found", body = LastEpisode),
        (status = 404, description = "No saved episodes for the series", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn get_last_episode(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let key = path.into_inner();
    match data.coordinator.last_episode(&key).await {
        Ok(last) => HttpResponse::Ok().json(ApiResponse::new(last)),
        Err(e) => e.error_response(),
    }
}

/// DELETE /api/series/{key}/episodes/{episode} - Remove one saved episode
#[utoipa::path(
    delete,
    path = "/api/series/{key}/episodes/{episode}",
    tag = "history",
    params(
        ("key" = String, Path, description = "Series title or stored key"),
        ("episode" = String, Path, description = "Episode number")
    ),
    responses(
        (status = 200, description = "Episode removed", body = RemoveReply),
        (status = 404, description = "Series or episode not found", body = ApiError),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn delete_episode(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> impl Responder {
    let (key, episode) = path.into_inner();

    match data.coordinator.remove_episode(&key, &episode).await {
        Ok(outcome) => {
            let reply = match outcome {
                RemoveOutcome::SeriesRemoved => RemoveReply {
                    series_removed: true,
                    remaining: 0,
                },
                RemoveOutcome::EpisodeRemoved { remaining } => RemoveReply {
                    series_removed: false,
                    remaining,
                },
                RemoveOutcome::NotFound => RemoveReply {
                    series_removed: false,
                    remaining: 0,
                },
            };
            info!("Removed episode {} of {}", episode, key);
            HttpResponse::Ok().json(ApiResponse::new(reply))
        }
        Err(e) => e.error_response(),
    }
}

/// POST /api/availability/refresh - Re-check availability of every series
#[utoipa::path(
    post,
    path = "/api/availability/refresh",
    tag = "availability",
    params(RefreshQuery),
    responses(
        (status = 200, description = "Availability re-checked", body = Vec<AvailabilityReport>),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn refresh_availability(
    data: web::Data<AppState>,
    query: web::Query<RefreshQuery>,
) -> impl Responder {
    let force = query.force.unwrap_or(true);

    match data.coordinator.revalidate_all(force).await {
        Ok(reports) => {
            info!("Re-validated {} series", reports.len());
            HttpResponse::Ok().json(ApiResponse::new(reports))
        }
        Err(e) => {
            error!("Re-validation failed: {}", e);
            e.error_response()
        }
    }
}

/// GET /api/settings - Current settings
#[utoipa::path(
    get,
    path = "/api/settings",
    tag = "settings",
    responses(
        (status = 200, description = "Current settings", body = Settings),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn get_settings(data: web::Data<AppState>) -> impl Responder {
    match data.coordinator.settings().await {
        Ok(settings) => HttpResponse::Ok().json(ApiResponse::new(settings)),
        Err(e) => e.error_response(),
    }
}

/// PUT /api/settings - Replace settings
#[utoipa::path(
    put,
    path = "/api/settings",
    tag = "settings",
    request_body = Settings,
    responses(
        (status = 200, description = "Settings stored", body = Settings),
        (status = 500, description = "Storage failure", body = ApiError)
    )
)]
pub async fn put_settings(data: web::Data<AppState>, body: web::Json<Settings>) -> impl Responder {
    let settings = body.into_inner();

    match data.coordinator.update_settings(&settings).await {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::new(settings)),
        Err(e) => {
            error!("Failed to store settings: {}", e);
            e.error_response()
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Anime Tracker API",
        version = "0.1.0",
        description = "Tracks the last watched episode of every series and whether the next one is out",
        license(
            name = "MIT"
        )
    ),
    paths(
        handle_message,
        get_history,
        get_last_episode,
        delete_episode,
        refresh_availability,
        get_settings,
        put_settings
    ),
    components(
        schemas(
            MessageRequest,
            EpisodeRecord,
            HistoryEntry,
            LastEpisode,
            LinkLookup,
            PageEpisodeInfo,
            AvailabilityReport,
            Settings,
            SaveReply,
            AvailabilityReply,
            SuccessReply,
            RemoveReply,
            RefreshQuery,
            ApiError
        )
    ),
    tags(
        (name = "messages", description = "Tagged request/reply channel"),
        (name = "history", description = "Saved series and episodes"),
        (name = "availability", description = "Next-episode availability"),
        (name = "settings", description = "User settings")
    )
)]
pub struct ApiDoc;

/// Configure API routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/message", web::post().to(handle_message))
            .route("/history", web::get().to(get_history))
            .route("/series/{key}/last", web::get().to(get_last_episode))
            .route("/series/{key}/episodes/{episode}", web::delete().to(delete_episode))
            .route("/availability/refresh", web::post().to(refresh_availability))
            .route("/settings", web::get().to(get_settings))
            .route("/settings", web::put().to(put_settings)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::{AvailabilityCache, AvailabilityProber, AvailabilityService};
    use crate::coordinator::PageSource;
    use crate::fetcher::{FetchError, FetcherConfig, PageFetcher};
    use crate::store::{EpisodeStore, KeyValueStore, MemoryStore};
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::time::Duration;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const EPISODE_LIST: &str = r#"<html><body>
        <div class="block_area block_area-episodes">
            <a class="ep-item" href="/watch/frieren-18542?ep=8" data-number="8">8</a>
            <a class="ep-item active" href="/watch/frieren-18542?ep=9" data-number="9" title="Mimic">9</a>
        </div>
        </body></html>"#;

    struct Pages(Option<&'static str>);

    #[async_trait]
    impl PageSource for Pages {
        async fn snapshot(&self, _url: &str) -> Result<String, FetchError> {
            self.0.map(String::from).ok_or(FetchError::HttpError(404))
        }
    }

    fn state(sync: Arc<MemoryStore>, pages: Option<&'static str>) -> web::Data<AppState> {
        let fetcher = Arc::new(
            PageFetcher::new(FetcherConfig {
                timeout: Duration::from_millis(500),
                ..FetcherConfig::immediate()
            })
            .unwrap(),
        );
        let local = Arc::new(MemoryStore::new("local"));
        let episodes = EpisodeStore::new(sync);
        let availability = AvailabilityService::new(
            AvailabilityProber::new(fetcher),
            AvailabilityCache::new(local, Duration::from_secs(3600)),
            episodes.clone(),
        );
        let coordinator = SaveCoordinator::new(episodes, availability, Arc::new(Pages(pages)));
        web::Data::new(AppState {
            coordinator: Arc::new(coordinator),
            config: Config::default(),
        })
    }

    async fn not_found_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        server
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure_routes)).await
        };
    }

    fn message(body: Value) -> test::TestRequest {
        test::TestRequest::post().uri("/api/message").set_json(body)
    }

    #[actix_web::test]
    async fn test_save_then_show_last_episode() {
        let server = not_found_server().await;
        let sync = Arc::new(MemoryStore::new("sync"));
        let data = state(sync.clone(), None);
        let app = app!(data);

        let url = format!("{}/anime/demo-show-episode-5", server.uri());
        let resp = test::call_service(
            &app,
            message(json!({ "action": "saveEpisode", "episodeUrl": url })).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "success": true }));
        assert_eq!(
            sync.get_value("demo-show_info").await.unwrap().unwrap()["currentEpisode"],
            "5"
        );

        let resp = test::call_service(
            &app,
            message(json!({
                "action": "showLastEpisode",
                "linkUrl": "https://site.example/demo-show-episode-7"
            }))
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["groupName"], "demo-show");
        assert_eq!(body["lastEpisode"], "5");
        assert_eq!(body["currentEpisode"], "7");
    }

    #[actix_web::test]
    async fn test_unresolved_save_carries_message() {
        let data = state(Arc::new(MemoryStore::new("sync")), Some("<html></html>"));
        let app = app!(data);

        let resp = test::call_service(
            &app,
            message(json!({ "action": "saveEpisode", "episodeUrl": "https://site.example/" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "could not determine episode info");
    }

    #[actix_web::test]
    async fn test_show_last_episode_errors() {
        let data = state(Arc::new(MemoryStore::new("sync")), None);
        let app = app!(data);

        let resp = test::call_service(
            &app,
            message(json!({
                "action": "showLastEpisode",
                "linkUrl": "https://site.example/unknown-show-episode-2"
            }))
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "no saved episodes found for this series");

        let resp = test::call_service(
            &app,
            message(json!({ "action": "showLastEpisode", "linkUrl": "not a url" })).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_unknown_action_is_rejected() {
        let data = state(Arc::new(MemoryStore::new("sync")), None);
        let app = app!(data);

        let resp = test::call_service(&app, message(json!({ "action": "launchRocket" })).to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_episode_info_and_page_dom() {
        let data = state(Arc::new(MemoryStore::new("sync")), Some(EPISODE_LIST));
        let app = app!(data);

        let resp = test::call_service(
            &app,
            message(json!({ "action": "getEpisodeInfo", "url": "https://aniwatch.to/watch/frieren" }))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["episodeNumber"], "9");
        assert_eq!(body["animeTitle"], "frieren 18542");

        let resp = test::call_service(
            &app,
            message(json!({ "action": "getEpisodeInfo", "pageMarkup": "<p>plain</p>" })).to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, Value::Null);

        let resp = test::call_service(
            &app,
            message(json!({ "action": "getPageDOM", "url": "https://aniwatch.to/watch/frieren" }))
                .to_request(),
        )
        .await;
        let body: Value = test::read_body_json(resp).await;
        assert!(body.as_str().unwrap().contains("ep-item"));
    }

    #[actix_web::test]
    async fn test_check_next_episode_and_clear() {
        let server = not_found_server().await;
        let sync = Arc::new(MemoryStore::new("sync"));
        let data = state(sync.clone(), None);
        let app = app!(data);

        let resp = test::call_service(
            &app,
            message(json!({
                "action": "checkNextEpisode",
                "nextEpisodeUrl": format!("{}/anime/demo-show-episode-6", server.uri()),
                "groupName": "demo-show",
                "episodeNumber": 5
            }))
            .to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "isAvailable": false }));

        let resp = test::call_service(&app, message(json!({ "action": "clearStorage" })).to_request()).await;
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body, json!({ "success": true }));
        assert!(sync.get_all().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_history_and_delete() {
        let sync = Arc::new(MemoryStore::new("sync"));
        let data = state(sync.clone(), None);
        let episodes = data.coordinator.episodes().clone();
        episodes
            .upsert("demo-show", &EpisodeRecord::new("demo-show", "3", "https://site.example/demo-show-episode-3"))
            .await
            .unwrap();
        let app = app!(data);

        let req = test::TestRequest::get().uri("/api/history").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["groupName"], "demo-show");

        let req = test::TestRequest::get().uri("/api/series/Demo%20Show/last").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["lastEpisodeNumber"], "3");

        let req = test::TestRequest::delete()
            .uri("/api/series/demo-show/episodes/3")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["seriesRemoved"], true);

        let req = test::TestRequest::delete()
            .uri("/api/series/demo-show/episodes/3")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_settings_round_trip() {
        let data = state(Arc::new(MemoryStore::new("sync")), None);
        let app = app!(data);

        let req = test::TestRequest::get().uri("/api/settings").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["autoSave"], true);
        assert_eq!(body["data"]["delayTime"], 5);

        let req = test::TestRequest::put()
            .uri("/api/settings")
            .set_json(json!({ "autoSave": false, "saveNext": true, "delayTime": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let settings = data.coordinator.settings().await.unwrap();
        assert!(!settings.auto_save);
        assert!(settings.save_next);
    }

    #[::core::prelude::v1::test]
    fn test_openapi_documents_message_body() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        assert!(doc["paths"]["/api/message"]["post"]["requestBody"].is_object());
        assert!(doc["components"]["schemas"]["MessageRequest"].is_object());
        assert!(doc["paths"]["/api/series/{key}/episodes/{episode}"]["delete"].is_object());
    }

    #[actix_web::test]
    async fn test_refresh_with_nothing_saved() {
        let data = state(Arc::new(MemoryStore::new("sync")), None);
        let app = app!(data);

        let req = test::TestRequest::post()
            .uri("/api/availability/refresh?force=false")
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"], json!([]));
    }
}
