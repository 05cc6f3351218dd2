use crate::controller::{event_controller, health_check_controller};
use crate::stream::handler as stream_handler;
use crate::AppState;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use log::*;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;

use utoipa::OpenApi;
use utoipa_rapidoc::RapiDoc;

// This is the global definition of our OpenAPI spec. To be a part
// of the rendered spec, a path and schema must be listed here.
#[derive(OpenApi)]
#[openapi(
        info(
            title = "CommonTable Realtime API"
        ),
        paths(
            event_controller::publish,
            health_check_controller::health_check,
            stream_handler::stream_connect,
        ),
        components(
            schemas(
                events::DomainEvent,
            )
        ),
        tags(
            (name = "commontable_rt", description = "CommonTable real-time update API")
        )
    )]
struct ApiDoc;

pub fn define_routes(app_state: AppState) -> Router {
    Router::new()
        .merge(stream_routes(app_state.clone()))
        .merge(event_routes(app_state.clone()))
        .merge(health_routes())
        .merge(RapiDoc::with_openapi("/api-docs/openapi2.json", ApiDoc::openapi()).path("/rapidoc"))
        .fallback_service(static_routes())
        .layer(cors_layer(&app_state))
}

fn stream_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/sse", get(stream_handler::stream_connect))
        .with_state(app_state)
}

fn event_routes(app_state: AppState) -> Router {
    Router::new()
        .route("/internal/events", post(event_controller::publish))
        .with_state(app_state)
}

fn health_routes() -> Router {
    Router::new().route("/health", get(health_check_controller::health_check))
}

/// Browser origins the frontend is served from. An unparseable entry is
/// skipped with a warning rather than taking the whole service down.
fn cors_layer(app_state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = app_state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Skipping unparseable CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

// This serves the offline-first shell pages. They double as the static
// fallback the edge worker precaches on install.
pub fn static_routes() -> Router {
    Router::new().nest_service("/", ServeDir::new("./public"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, BodyDataStream};
    use axum::http::{Request, StatusCode};
    use futures::StreamExt;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use service::config::Config;
    use tower::ServiceExt;

    fn test_state(heartbeat_secs: u64, lifetime_secs: u64) -> AppState {
        let mut config = Config::from_env();
        config.heartbeat_interval_secs = heartbeat_secs;
        config.connection_lifetime_secs = lifetime_secs;
        AppState::new(config)
    }

    async fn next_frame(frames: &mut BodyDataStream) -> Value {
        let chunk = frames
            .next()
            .await
            .expect("stream ended unexpectedly")
            .expect("stream errored");
        let text = std::str::from_utf8(&chunk).expect("frame is not UTF-8");
        serde_json::from_str(text.trim_start_matches("data: ").trim_end())
            .expect("frame payload is not JSON")
    }

    #[tokio::test]
    async fn test_health_endpoint_reports_healthy() {
        let app = define_routes(test_state(30, 600));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"healthy");
    }

    #[tokio::test]
    async fn test_stream_connect_rejects_missing_and_blank_identity() {
        let state = test_state(30, 600);
        let app = define_routes(state.clone());

        let missing = Request::builder().uri("/sse").body(Body::empty()).unwrap();
        let response = app.clone().oneshot(missing).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let blank = Request::builder()
            .uri("/sse?identity=%20%20")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(blank).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Rejection happens before registration, so nothing leaks.
        assert_eq!(state.sse_manager.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_delivers_greeting_and_heartbeats_in_sequence() {
        let state = test_state(30, 600);
        let app = define_routes(state.clone());

        let request = Request::builder()
            .uri("/sse?identity=user-a")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
            Some("text/event-stream")
        );
        assert_eq!(state.sse_manager.connection_count(), 1);

        let mut frames = response.into_body().into_data_stream();

        let greeting = next_frame(&mut frames).await;
        assert_eq!(greeting["kind"], "notification");
        assert_eq!(greeting["sequence"], 1);
        assert_eq!(
            greeting["payload"]["message"],
            "Real-time updates connected"
        );

        // Nothing else is queued, so polling parks the runtime and the
        // paused clock jumps straight to the next heartbeat tick.
        let first_heartbeat = next_frame(&mut frames).await;
        assert_eq!(first_heartbeat["kind"], "heartbeat");
        assert_eq!(first_heartbeat["sequence"], 2);

        let second_heartbeat = next_frame(&mut frames).await;
        assert_eq!(second_heartbeat["kind"], "heartbeat");
        assert_eq!(second_heartbeat["sequence"], 3);

        // Dropping the body is what a client abort looks like from the
        // server side; the guard unregisters on the spot.
        drop(frames);
        assert_eq!(state.sse_manager.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_closes_at_the_lifetime_cap() {
        let state = test_state(30, 5);
        let app = define_routes(state.clone());

        let request = Request::builder()
            .uri("/sse?identity=user-a")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let mut frames = response.into_body().into_data_stream();

        let greeting = next_frame(&mut frames).await;
        assert_eq!(greeting["kind"], "notification");

        // The cap (5s) lands before the first heartbeat (30s), so the next
        // timer event ends the stream.
        assert!(frames.next().await.is_none());
        assert_eq!(state.sse_manager.connection_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_event_reaches_a_connected_stream() {
        let state = test_state(30, 600);
        let app = define_routes(state.clone());

        let subscribe = Request::builder()
            .uri("/sse?identity=user-b")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(subscribe).await.unwrap();
        let mut frames = response.into_body().into_data_stream();
        let greeting = next_frame(&mut frames).await;
        assert_eq!(greeting["kind"], "notification");

        let event = json!({
            "type": "message_sent",
            "data": {
                "conversation_id": "conv-7",
                "message": {"id": "m-1", "text": "is the table still available?"},
                "sender": "user-a",
                "recipient": "user-b"
            }
        });
        let publish = Request::builder()
            .uri("/internal/events")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(event.to_string()))
            .unwrap();
        let response = app.oneshot(publish).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let frame = next_frame(&mut frames).await;
        assert_eq!(frame["kind"], "domain_event");
        assert_eq!(frame["sequence"], 2);
        assert_eq!(frame["payload"]["type"], "message_sent");
        assert_eq!(frame["payload"]["data"]["conversation_id"], "conv-7");
        assert_eq!(frame["payload"]["data"]["sender"], "user-a");
        assert_eq!(frame["payload"]["data"]["message"]["id"], "m-1");
        // The recipient steers routing but is not part of the frame.
        assert!(frame["payload"]["data"].get("recipient").is_none());
    }

    #[tokio::test]
    async fn test_publish_rejects_bodies_that_are_not_events() {
        let app = define_routes(test_state(30, 600));

        let unknown = Request::builder()
            .uri("/internal/events")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"type": "price_guessed", "data": {}}"#))
            .unwrap();
        let response = app.clone().oneshot(unknown).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let broken = Request::builder()
            .uri("/internal/events")
            .method("POST")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(broken).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_allowed_origin_gets_cors_headers() {
        let app = define_routes(test_state(30, 600));

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:3000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|value| value.to_str().ok()),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn test_openapi_document_lists_the_api_surface() {
        let app = define_routes(test_state(30, 600));

        let request = Request::builder()
            .uri("/api-docs/openapi2.json")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let document: Value = serde_json::from_slice(&body).unwrap();
        assert!(document["paths"]["/sse"].is_object());
        assert!(document["paths"]["/internal/events"].is_object());
        assert!(document["paths"]["/health"].is_object());
    }
}
