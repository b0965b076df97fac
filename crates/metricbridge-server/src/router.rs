use std::{sync::Arc, time::Instant};

use axum::{
    Router,
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use metricbridge_exporter::{TEXT_CONTENT_TYPE, registry::Registry};

use crate::process::ProcessMetrics;

pub struct AppState {
    pub exporter: Arc<Registry>,
    pub process: Arc<ProcessMetrics>,
}

pub fn metrics_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started_at = Instant::now();
    state.process.refresh();
    let payload = metricbridge_exporter::render_text(&state.exporter.gather());
    state.process.record_scrape(payload.len(), started_at.elapsed());

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(TEXT_CONTENT_TYPE),
    );

    response
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use metricbridge_bridge::{BridgeConfig, Publisher};
    use metricbridge_exporter::{TEXT_CONTENT_TYPE, registry::Registry as ExporterRegistry};
    use metricbridge_source::Registry as SourceRegistry;
    use tower::ServiceExt;

    use super::{AppState, metrics_router};
    use crate::process::ProcessMetrics;

    #[tokio::test]
    async fn serves_published_series() {
        let source = Arc::new(SourceRegistry::new());
        let exporter = Arc::new(ExporterRegistry::new());
        let process = Arc::new(ProcessMetrics::register(&source).unwrap());
        source.register_counter("jobs.done").unwrap().inc(7);

        let publisher = Publisher::new(
            BridgeConfig::new("demo", "server"),
            source.clone(),
            exporter.clone(),
        )
        .unwrap();
        process.refresh();
        publisher.publish_once().unwrap();

        let app = metrics_router(Arc::new(AppState { exporter, process }));
        let response = app
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            TEXT_CONTENT_TYPE
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("# TYPE demo_server_jobs_done gauge\n"));
        assert!(text.contains("demo_server_jobs_done 7\n"));
        assert!(text.contains("demo_server_process_worker_threads "));
    }
}
