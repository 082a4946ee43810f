use reqwest::{Client, ClientBuilder};
use std::time::Duration;

const USER_AGENT: &str = concat!("tradedesk/", env!("CARGO_PKG_VERSION"));

/// Client shared by every vendor API integration.
pub fn create_api_client() -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(30))
        .user_agent(USER_AGENT);

    build_client(builder)
}

/// Client for large file transfers, without an overall request timeout.
pub fn create_download_client() -> Result<Client, reqwest::Error> {
    let builder = Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(60))
        .user_agent(USER_AGENT);

    build_client(builder)
}

fn build_client(builder: ClientBuilder) -> Result<Client, reqwest::Error> {
    #[cfg(debug_assertions)]
    if let Ok(proxy_url) = std::env::var("HTTP_PROXY_URL") {
        info!("Debug mode: configuring client with proxy {}", proxy_url);
        return builder.proxy(reqwest::Proxy::all(proxy_url)?).build();
    }

    builder.build()
}
