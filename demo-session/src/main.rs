use axum::{
    Json,
    extract::Path,
    middleware,
    routing::{Router, get},
};
use http::StatusCode;
use serde_json::{Value, json};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use redis_session_axum::{
    IntoResponseError, Session, SessionConfig, SessionContext, session_middleware,
};

type HandlerResult = Result<Json<Value>, (StatusCode, String)>;

async fn index(session: Session) -> HandlerResult {
    let mut session = session.lock().await;
    session.start_default().await.into_response_error()?;

    let visits = session.get_as::<u64>("visits").into_response_error()?.unwrap_or(0) + 1;
    session.set("visits", visits).into_response_error()?;
    let flash = session.take("flash", Value::Null).into_response_error()?;
    let user = session.get("user", json!("anonymous")).into_response_error()?;

    Ok(Json(json!({
        "user": user,
        "visits": visits,
        "flash": flash,
    })))
}

async fn login(session: Session, Path(name): Path<String>) -> HandlerResult {
    let mut session = session.lock().await;
    session.start_default().await.into_response_error()?;

    // New privileges, new id
    session.regenerate(true).await.into_response_error()?;
    session.set("user", &name).into_response_error()?;
    session
        .set("flash", format!("Welcome, {name}!"))
        .into_response_error()?;

    Ok(Json(json!({ "logged_in": name })))
}

async fn logout(session: Session) -> HandlerResult {
    let mut session = session.lock().await;
    session.start_default().await.into_response_error()?;
    session.destroy().await.into_response_error()?;
    Ok(Json(json!({ "logged_out": true })))
}

fn init_tracing(app_name: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        #[cfg(debug_assertions)]
        {
            format!("redis_session_axum=trace,redis_session=trace,{app_name}=trace,info").into()
        }

        #[cfg(not(debug_assertions))]
        {
            "info".into()
        }
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("You can change verbosity with the RUST_LOG environment variable.");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("demo_session");

    let context = SessionContext::new(SessionConfig::from_env())?;
    if let Err(e) = context.connect().await {
        tracing::warn!("Session store not reachable at startup, sessions will start empty: {e}");
    }

    let app = Router::new()
        .route("/", get(index))
        .route("/login/{name}", get(login))
        .route("/logout", get(logout))
        .layer(middleware::from_fn_with_state(context, session_middleware));

    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3001);
    tracing::info!("Starting server on http://localhost:{port}");
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
