use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Json;
use tracing::{error, info, warn};

use super::ServerState;
use super::models::{ErrorResponse, HealthResponse};
use super::pipeline;
use crate::settings::Settings;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

const DEFAULT_TARGET_LANG: &str = "hi";
const DEFAULT_SOURCE_LANG: &str = "en";

pub async fn run_server(settings: Settings) -> Result<()> {
    let addr = settings.listen_addr.clone();
    let state = Arc::new(ServerState::new(settings)?);
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| "failed to bind server address")?;
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route(
            "/translate-pdf",
            post(translate_pdf).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(state)
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "running".to_string(),
            service: "PDF Translator".to_string(),
            translation_api: state.settings.translation_url.clone(),
            font_available: state.settings.font_available(),
            endpoints: serde_json::json!({
                "/": "Health check",
                "/translate-pdf": "POST - Upload PDF for translation",
            }),
        }),
    )
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

struct UploadForm {
    file: Option<Vec<u8>>,
    target: String,
    source: String,
}

async fn read_upload_form(multipart: &mut Multipart) -> Result<UploadForm> {
    let mut form = UploadForm {
        file: None,
        target: DEFAULT_TARGET_LANG.to_string(),
        source: DEFAULT_SOURCE_LANG.to_string(),
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .with_context(|| "failed to read multipart field")?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let bytes = field
                    .bytes()
                    .await
                    .with_context(|| "failed to read uploaded file")?;
                form.file = Some(bytes.to_vec());
            }
            Some("target") => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    form.target = value.trim().to_string();
                }
            }
            Some("source") => {
                let value = field.text().await.unwrap_or_default();
                if !value.trim().is_empty() {
                    form.source = value.trim().to_string();
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

async fn translate_pdf(
    State(state): State<Arc<ServerState>>,
    mut multipart: Multipart,
) -> Result<Response<Body>, (StatusCode, Json<ErrorResponse>)> {
    let form = read_upload_form(&mut multipart).await.map_err(|err| {
        warn!(error = %err, "rejecting malformed upload");
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("{:#}", err),
            }),
        )
    })?;

    let Some(file) = form.file else {
        warn!("no file uploaded");
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "No file uploaded".to_string(),
            }),
        ));
    };

    info!(
        bytes = file.len(),
        source = %form.source,
        target = %form.target,
        "new translation request"
    );

    let target = form.target.clone();
    let handle = tokio::runtime::Handle::current();
    let worker_state = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        handle.block_on(pipeline::translate_document(
            worker_state.as_ref(),
            &file,
            &form.source,
            &form.target,
        ))
    })
    .await
    .map_err(|err| {
        error!(error = %err, "translation task panicked");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("server task failed: {}", err),
            }),
        )
    })?;

    match result {
        Ok(output) => {
            let mut response = (StatusCode::OK, output).into_response();
            let headers = response.headers_mut();
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/pdf"),
            );
            if let Ok(disposition) = HeaderValue::from_str(&format!(
                "inline; filename=\"translated_{}.pdf\"",
                target
            )) {
                headers.insert(header::CONTENT_DISPOSITION, disposition);
            }
            Ok(response)
        }
        Err(err) => {
            error!(error = %format!("{:#}", err), "translation failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("{:#}", err),
                }),
            ))
        }
    }
}
