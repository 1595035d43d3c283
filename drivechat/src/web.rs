//! Browser front end.
//!
//! Each visitor gets a [`Session`] keyed by a cookie. Logging in connects to
//! Google Drive and indexes it; logging out drops every piece of state the
//! session held.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use drivechat_rag::{Answer, IndexStatus, NO_RESULTS, Session, SessionManager};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServeArgs;
use crate::services::Connector;

const SESSION_COOKIE: &str = "drivechat_session";
const TITLE: &str = "Smart Document Search with Gemini and Google Drive";

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub connector: Arc<dyn Connector>,
}

impl AppState {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { sessions: SessionManager::new(), connector }
    }

    async fn session(&self, jar: &CookieJar) -> Option<Arc<Session>> {
        let id = session_cookie(jar)?;
        self.sessions.get(&id).await
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchForm {
    #[serde(default)]
    pub query: String,
}

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/login", post(login))
        .route("/search", post(search))
        .route("/logout", post(logout))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

pub async fn run_server(state: AppState, args: ServeArgs) -> anyhow::Result<()> {
    let app = app_router(state);
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| "invalid host/port for drivechat server")?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("drivechat listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    match state.session(&jar).await {
        Some(session) => Html(search_page(&session, None, "").await),
        None => Html(login_page(None)),
    }
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "drivechat", "sessions": state.sessions.len().await}))
}

async fn login(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(previous) = session_cookie(&jar) {
        state.sessions.logout(&previous).await;
    }

    let (pipeline, storage) = match state.connector.connect().await {
        Ok(parts) => parts,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "login failed");
            let page = login_page(Some("Login failed, please try again"));
            return (StatusCode::UNAUTHORIZED, Html(page)).into_response();
        }
    };

    let session = state.sessions.login(pipeline, storage).await;
    // Failures are recorded in the session status and shown on the search page.
    let _ = session.index().await;

    let cookie = Cookie::build((SESSION_COOKIE, session.id().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), Redirect::to("/")).into_response()
}

async fn search(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<SearchForm>,
) -> Response {
    let Some(session) = state.session(&jar).await else {
        return Redirect::to("/").into_response();
    };

    let query = form.query.trim();
    if query.is_empty() || !session.status().await.is_ready() {
        return Html(search_page(&session, None, query).await).into_response();
    }

    let answer = session.ask(query).await;
    Html(search_page(&session, Some(answer), query).await).into_response()
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> Response {
    if let Some(id) = session_cookie(&jar) {
        state.sessions.logout(&id).await;
    }
    (jar.remove(Cookie::build(SESSION_COOKIE).path("/")), Redirect::to("/")).into_response()
}

fn session_cookie(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE).map(|c| c.value().to_string()).filter(|id| !id.is_empty())
}

// ── Rendering ───────────────────────────────────────────────────────

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{TITLE}</title></head>\n\
         <body>\n<h1>{TITLE}</h1>\n{body}</body></html>\n"
    )
}

fn login_page(error: Option<&str>) -> String {
    let error = error.map(|e| format!("<p class=\"error\">{}</p>\n", escape(e))).unwrap_or_default();
    page(&format!(
        "<h2>Google Drive Login</h2>\n{error}\
         <form method=\"post\" action=\"/login\"><button type=\"submit\">Login</button></form>\n"
    ))
}

fn status_line(status: &IndexStatus) -> String {
    match status {
        IndexStatus::NotIndexed => "<p>Files have not been indexed yet.</p>\n".to_string(),
        IndexStatus::Indexing => "<p>Indexing files from Google Drive...</p>\n".to_string(),
        IndexStatus::Indexed(report) => format!(
            "<p class=\"success\">Files indexed successfully: {} of {} files.</p>\n",
            report.indexed(),
            report.listed
        ),
        IndexStatus::Failed(e) => {
            format!("<p class=\"error\">Error indexing files: {}</p>\n", escape(e))
        }
    }
}

fn answer_block(answer: Option<&Answer>) -> String {
    let Some(answer) = answer else {
        return format!("<p class=\"warning\">{NO_RESULTS}</p>\n");
    };

    let sources: String = answer
        .sources
        .iter()
        .map(|s| format!("<li>{} (Score: {:.3})</li>\n", escape(&s.name), s.score))
        .collect();
    format!(
        "<h3>Answer:</h3>\n<p>{}</p>\n<h3>Sources:</h3>\n<ol>\n{sources}</ol>\n",
        escape(&answer.text)
    )
}

async fn search_page(session: &Session, answer: Option<Option<Answer>>, query: &str) -> String {
    let result = answer.map(|a| answer_block(a.as_ref())).unwrap_or_default();
    page(&format!(
        "<aside><h2>Account Info</h2><p>Connected to Google Drive</p>\n\
         <p>Signed in at {signed_in}</p>\n\
         <form method=\"post\" action=\"/logout\"><button type=\"submit\">Logout</button></form></aside>\n\
         {status}\
         <h2>Search Your Documents</h2>\n\
         <form method=\"post\" action=\"/search\">\
         <label>Enter your question: <input name=\"query\" value=\"{query}\"></label> \
         <button type=\"submit\">Search</button></form>\n\
         {result}",
        signed_in = session.created_at().format("%Y-%m-%d %H:%M UTC"),
        status = status_line(&session.status().await),
        query = escape(query),
    ))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, header};
    use drivechat_rag::{
        DriveFile, EmbeddingProvider, FileStorage, InMemoryVectorStore, RagConfig, RagError,
        RagPipeline, Result, TextGenerator,
    };
    use tower::ServiceExt;

    use super::*;

    struct Unit;

    #[async_trait]
    impl EmbeddingProvider for Unit {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    struct Reply;

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("The budget is <b>approved</b>.".into())
        }
    }

    struct Drive {
        list_fails: bool,
    }

    #[async_trait]
    impl FileStorage for Drive {
        async fn list_files(&self) -> Result<Vec<DriveFile>> {
            if self.list_fails {
                return Err(RagError::ListingError("API returned 403".into()));
            }
            Ok(vec![DriveFile::new("b1", "budget.txt", "text/plain")])
        }

        async fn export_text(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(Vec::new())
        }

        async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
            Ok(b"The 2025 budget was approved by the board.".to_vec())
        }
    }

    enum MockConnector {
        Works,
        ListingFails,
        Rejects,
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self) -> anyhow::Result<(RagPipeline, Arc<dyn FileStorage>)> {
            let list_fails = match self {
                MockConnector::Rejects => anyhow::bail!("access denied"),
                MockConnector::Works => false,
                MockConnector::ListingFails => true,
            };
            let pipeline = RagPipeline::builder()
                .config(RagConfig::builder().vector_size(2).build()?)
                .embedding_provider(Arc::new(Unit))
                .text_generator(Arc::new(Reply))
                .vector_store(Arc::new(InMemoryVectorStore::new()))
                .build()?;
            Ok((pipeline, Arc::new(Drive { list_fails })))
        }
    }

    fn app(connector: MockConnector) -> (Router, AppState) {
        let state = AppState::new(Arc::new(connector));
        (app_router(state.clone()), state)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, cookie: Option<&str>, form: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(form.to_string())).unwrap()
    }

    async fn log_in(app: &Router) -> String {
        let response = app.clone().oneshot(post("/login", None, "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    #[tokio::test]
    async fn anonymous_visitors_see_the_login_page() {
        let (app, _) = app(MockConnector::Works);
        let response = app.oneshot(get("/", None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("Google Drive Login"));
        assert!(!body.contains("Search Your Documents"));
    }

    #[tokio::test]
    async fn login_indexes_and_shows_the_search_page() {
        let (app, state) = app(MockConnector::Works);
        let cookie = log_in(&app).await;
        assert!(cookie.starts_with("drivechat_session="));
        assert_eq!(state.sessions.len().await, 1);

        let body = body_text(app.oneshot(get("/", Some(&cookie))).await.unwrap()).await;
        assert!(body.contains("Search Your Documents"));
        assert!(body.contains("Files indexed successfully: 1 of 1 files."));
        assert!(body.contains("Signed in at "));
    }

    #[tokio::test]
    async fn search_renders_answer_and_sources() {
        let (app, _) = app(MockConnector::Works);
        let cookie = log_in(&app).await;

        let response =
            app.oneshot(post("/search", Some(&cookie), "query=was+the+budget+approved")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("The budget is &lt;b&gt;approved&lt;/b&gt;."));
        assert!(body.contains("<li>budget.txt (Score: 1.000)</li>"));
        assert!(body.contains("value=\"was the budget approved\""));
    }

    #[tokio::test]
    async fn search_without_session_redirects_home() {
        let (app, _) = app(MockConnector::Works);
        let response = app.oneshot(post("/search", None, "query=hi")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn logout_clears_session_and_cookie() {
        let (app, state) = app(MockConnector::Works);
        let cookie = log_in(&app).await;

        let response = app.clone().oneshot(post("/logout", Some(&cookie), "")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cleared = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cleared.starts_with("drivechat_session=;"));
        assert!(cleared.contains("Max-Age=0"));
        assert!(state.sessions.is_empty().await);

        let body = body_text(app.oneshot(get("/", Some(&cookie))).await.unwrap()).await;
        assert!(body.contains("Google Drive Login"));
    }

    #[tokio::test]
    async fn failed_login_stays_on_login_page() {
        let (app, state) = app(MockConnector::Rejects);
        let response = app.oneshot(post("/login", None, "")).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(response).await.contains("Login failed, please try again"));
        assert!(state.sessions.is_empty().await);
    }

    #[tokio::test]
    async fn listing_failure_is_shown_on_the_search_page() {
        let (app, _) = app(MockConnector::ListingFails);
        let cookie = log_in(&app).await;

        let body = body_text(app.oneshot(post("/search", Some(&cookie), "query=x")).await.unwrap()).await;
        assert!(body.contains("Error indexing files"));
        assert!(!body.contains("Answer:"));
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let (app, _) = app(MockConnector::Works);
        let body = body_text(app.oneshot(get("/health", None)).await.unwrap()).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["sessions"], 0);
    }

    #[test]
    fn finds_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; drivechat_session=abc-123".parse().unwrap());
        assert_eq!(session_cookie(&CookieJar::from_headers(&headers)).as_deref(), Some("abc-123"));
    }

    #[test]
    fn empty_session_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "drivechat_session=".parse().unwrap());
        assert_eq!(session_cookie(&CookieJar::from_headers(&headers)), None);
    }
}
