//! HTTP API for the CCN engine

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use ccn_rag::{AgreementId, CcnEngine, EngineError, EngineResponse, Query, ResponseLength, Turn};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub idcc: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub history: Vec<Turn>,
    /// "short" | "medium" | "long"; anything else means medium.
    #[serde(default)]
    pub response_length: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    provider: String,
    model: String,
}

pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorBody {
                error: "invalid_query",
                message: message.into(),
            },
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            EngineError::RetrievalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EngineError::Synthesis(_)
            | EngineError::ClassifierUnavailable(_)
            | EngineError::ClassificationParse(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            body: ErrorBody {
                error: err.kind(),
                message: err.user_message(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl AskRequest {
    fn into_query(self) -> Result<Query, ApiError> {
        let mut query = Query::new(self.query).with_history(self.history);
        if let Some(raw) = self.idcc.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let id = AgreementId::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("'{}' is not a valid IDCC code", raw)))?;
            query = query.with_idcc(id);
        }
        if let Some(top_k) = self.top_k {
            query = query.with_top_k(top_k);
        }
        if let Some(length) = self.response_length.as_deref().and_then(ResponseLength::parse) {
            query = query.with_response_length(length);
        }
        Ok(query)
    }
}

async fn handle_ask(
    State(engine): State<Arc<CcnEngine>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<EngineResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let query = request.into_query()?;

    match engine.answer(query).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Query failed");
            Err(e.into())
        }
    }
}

async fn root() -> &'static str {
    "CCN RAG API is running"
}

async fn health(State(engine): State<Arc<CcnEngine>>) -> Json<HealthResponse> {
    let info = engine.provider_info();
    Json(HealthResponse {
        status: "ok",
        provider: info.name.clone(),
        model: info.model.clone(),
    })
}

pub fn router(engine: Arc<CcnEngine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ask", post(handle_ask))
        .layer(cors)
        .with_state(engine)
}

pub async fn start_server(engine: Arc<CcnEngine>, addr: &str) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("CCN RAG API listening on http://{}/ask", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use ccn_rag::search::{
        AgreementEntry, AgreementRecord, InMemoryPassageStore, PassageRecord, StoreError,
    };
    use ccn_rag::{
        CompletionError, CompletionProvider, EngineConfig, Passage, PassageStore, ProviderInfo,
        ResponseFormat,
    };
    use parking_lot::Mutex;
    use serde_json::Value;
    use tower::ServiceExt;

    struct FixedLlm {
        max_tokens: Mutex<Vec<usize>>,
        fail_answers: bool,
    }

    #[async_trait]
    impl CompletionProvider for FixedLlm {
        async fn complete(
            &self,
            _prompt: &str,
            max_tokens: usize,
            format: ResponseFormat,
        ) -> Result<String, CompletionError> {
            match format {
                ResponseFormat::Json => Ok(r#"{"intent":"general_question","confidence":0.5}"#.into()),
                ResponseFormat::Text if self.fail_answers => Err(CompletionError::Status {
                    status: 503,
                    body: "overloaded".into(),
                }),
                ResponseFormat::Text => {
                    self.max_tokens.lock().push(max_tokens);
                    Ok("Réponse.".into())
                }
            }
        }

        fn info(&self) -> ProviderInfo {
            ProviderInfo {
                name: "fixed".into(),
                model: "test-model".into(),
                supports_json_mode: true,
            }
        }
    }

    struct DownStore;

    #[async_trait]
    impl PassageStore for DownStore {
        async fn search_passages(
            &self,
            _agreement: &AgreementId,
            _query: &str,
            _top_k: usize,
        ) -> Result<Vec<Passage>, StoreError> {
            Err(StoreError::Transport("connection refused".into()))
        }

        async fn find_agreement_by_name(&self, _name: &str) -> Result<Option<AgreementId>, StoreError> {
            Ok(None)
        }

        async fn list_agreements(&self) -> Result<Vec<AgreementEntry>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn llm() -> Arc<FixedLlm> {
        Arc::new(FixedLlm {
            max_tokens: Mutex::new(Vec::new()),
            fail_answers: false,
        })
    }

    fn memory_store() -> Arc<dyn PassageStore> {
        Arc::new(InMemoryPassageStore::new(vec![AgreementRecord {
            idcc: AgreementId::parse("1979").unwrap(),
            name: "Hôtels, cafés, restaurants".into(),
            passages: vec![PassageRecord {
                id: "p1".into(),
                document_type: "AVENANT".into(),
                text: "Le préavis de démission est de 8 jours.".into(),
                source: "Avenant n°2".into(),
            }],
        }]))
    }

    fn app(llm: Arc<FixedLlm>, store: Arc<dyn PassageStore>) -> Router {
        router(Arc::new(CcnEngine::new(EngineConfig::default(), llm, store)))
    }

    async fn post_json(app: Router, body: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ask")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_ask_returns_answer_context_and_classification() {
        let llm = llm();
        let (status, body) = post_json(
            app(llm.clone(), memory_store()),
            r#"{"query":"Quel est le préavis de démission pour l'IDCC 1979 ?","response_length":"long"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["answer"], "Réponse.");
        assert_eq!(body["classification"]["intent"], "ccn_search");
        assert_eq!(body["classification"]["agreement_id"], "1979");
        assert_eq!(body["used_context"][0]["tier"], 2);
        assert_eq!(body["used_context"][0]["source_label"], "Avenant n°2");
        assert_eq!(llm.max_tokens.lock().as_slice(), &[3000]);
    }

    #[tokio::test]
    async fn test_unknown_response_length_means_medium() {
        let llm = llm();
        let (status, _) = post_json(
            app(llm.clone(), memory_store()),
            r#"{"query":"bonjour","response_length":"verbose"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(llm.max_tokens.lock().as_slice(), &[1500]);
    }

    #[tokio::test]
    async fn test_empty_query_is_bad_request() {
        let (status, body) = post_json(app(llm(), memory_store()), r#"{"query":"  "}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_query");
    }

    #[tokio::test]
    async fn test_invalid_idcc_is_bad_request() {
        let (status, body) =
            post_json(app(llm(), memory_store()), r#"{"query":"préavis","idcc":"12345"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_query");
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let (status, body) = post_json(app(llm(), memory_store()), r#"{"question":1}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_query");
    }

    #[tokio::test]
    async fn test_store_outage_is_service_unavailable() {
        let (status, body) =
            post_json(app(llm(), Arc::new(DownStore)), r#"{"query":"préavis idcc 1979"}"#).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "retrieval_unavailable");
        assert_eq!(body["message"], "search temporarily unavailable");
    }

    #[tokio::test]
    async fn test_answer_failure_is_bad_gateway() {
        let llm = Arc::new(FixedLlm {
            max_tokens: Mutex::new(Vec::new()),
            fail_answers: true,
        });
        let (status, body) = post_json(app(llm, memory_store()), r#"{"query":"bonjour"}"#).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "synthesis_error");
        assert_eq!(body["message"], "answer generation temporarily unavailable");
    }

    #[tokio::test]
    async fn test_health_reports_model() {
        let response = app(llm(), memory_store())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"], "test-model");
    }
}
