use crate::AppState;
use axum::{extract::State, response::Html};

const FALLBACK_PAGE: &str =
    "<h1>ShrLink Server</h1><p>Web UI not found. Use API endpoints directly.</p>";

pub async fn index(State(state): State<AppState>) -> Html<String> {
    match tokio::fs::read_to_string(&state.config.web_ui_path).await {
        Ok(page) => Html(page),
        Err(e) => {
            tracing::debug!(
                "Web UI {} unavailable: {}",
                state.config.web_ui_path.display(),
                e
            );
            Html(FALLBACK_PAGE.to_string())
        }
    }
}
