use axum::Router;
use std::net::SocketAddr;

pub struct ApiService {
    pub router: Router,
}

#[shuttle_runtime::async_trait]
impl shuttle_runtime::Service for ApiService {
    async fn bind(self, addr: SocketAddr) -> Result<(), shuttle_runtime::Error> {
        info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| shuttle_runtime::Error::Custom(anyhow::anyhow!("Failed to bind {}: {}", addr, e)))?;

        axum::serve(listener, self.router)
            .await
            .map_err(|e| shuttle_runtime::Error::Custom(anyhow::anyhow!("Server error: {}", e)))?;

        Ok(())
    }
}
