use crate::handlers;
use axum::{
    routing::{get, post},
    Router,
};
use genius_supervisor::WorkflowCoordinator;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub coordinator: WorkflowCoordinator,
}

/// The HTTP gateway.
pub struct GatewayServer;

impl GatewayServer {
    pub fn build(coordinator: WorkflowCoordinator) -> Router {
        let state = Arc::new(AppState { coordinator });

        Router::new()
            .route("/health", get(handlers::health))
            .route("/api/agents", get(handlers::list_agents))
            .route(
                "/api/workflows",
                post(handlers::submit).get(handlers::list_workflows),
            )
            .route(
                "/api/workflows/{id}",
                get(handlers::get_workflow).delete(handlers::delete),
            )
            .route("/api/workflows/{id}/status", get(handlers::get_status))
            .route("/api/workflows/{id}/result", get(handlers::get_result))
            .route("/api/workflows/{id}/cancel", post(handlers::cancel))
            .with_state(state)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use genius_supervisor::{
        AgentRegistry, HttpAgentClient, InMemoryWorkflowStore, SupervisorConfig,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        let config = SupervisorConfig::default();
        let registry = Arc::new(AgentRegistry::from_config(&config));
        let client = Arc::new(HttpAgentClient::new(config.health.path.clone()).unwrap());
        let coordinator = WorkflowCoordinator::new(
            config,
            registry,
            client,
            Arc::new(InMemoryWorkflowStore::new()),
        )
        .unwrap();
        GatewayServer::build(coordinator)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_route() {
        let resp = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_workflows"], 0);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let resp = app()
            .oneshot(
                Request::post("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["kind"], "validation");
    }

    #[tokio::test]
    async fn test_non_utf8_body_gets_json_error() {
        let resp = app()
            .oneshot(
                Request::post("/api/workflows")
                    .header("content-type", "application/json")
                    .body(Body::from(vec![0xff, 0xfe, b'{']))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body = body_json(resp).await;
        assert_eq!(body["kind"], "validation");
        assert!(body["error"].as_str().unwrap().contains("malformed request body"));
    }

    #[tokio::test]
    async fn test_bad_id_is_bad_request() {
        let resp = app()
            .oneshot(
                Request::get("/api/workflows/not-a-uuid/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
