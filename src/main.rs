// Comment Threads Server

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use comment_threads::{api::create_router, app_state::AppState, config::Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize storage and services
    let app_state = AppState::new(config.clone()).await?;
    let app = create_router(app_state);

    let addr = config.server_address();
    info!("Comment threads server starting on http://{}", addr);
    info!("  POST   /api/v1/posts                          - Create post");
    info!("  GET    /api/v1/posts?first&after              - List posts");
    info!("  GET    /api/v1/posts/{{id}}                     - Get post");
    info!("  PUT    /api/v1/posts/{{id}}/comments-allowed    - Toggle comments");
    info!("  POST   /api/v1/posts/{{id}}/comments            - Add comment");
    info!("  GET    /api/v1/posts/{{id}}/comments            - Root comments (children_first for replies)");
    info!("  GET    /api/v1/comments/{{id}}/children         - Child comments");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
