#[tokio::main]
async fn main() {
    tradebook_observability::init();

    let app = match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = tradebook_store::PgStore::connect(&url)
                .await
                .expect("failed to connect to DATABASE_URL");
            store
                .ensure_schema()
                .await
                .expect("failed to ensure database schema");
            tracing::info!("using postgres-backed store");
            tradebook_api::app::build_pg_app(store)
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set; using in-memory store (state is not persisted)");
            tradebook_api::app::build_app(tradebook_store::MemStore::new())
        }
    };

    let bind_addr =
        std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {bind_addr}: {e}"));

    tracing::info!("listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.unwrap();
}
