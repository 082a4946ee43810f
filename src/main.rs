use config::build_config;
use server::ApiService;
use state::AppState;

extern crate pretty_env_logger;
#[macro_use]
extern crate log;

rust_i18n::i18n!("locales", fallback = "en");

mod config;
mod error;
mod routes;
mod server;
mod service;
mod state;
mod storage;
mod utils;

#[cfg(test)]
mod tests;

#[shuttle_runtime::main]
async fn shuttle_main(
    #[shuttle_runtime::Secrets] secrets: shuttle_runtime::SecretStore,
) -> Result<ApiService, shuttle_runtime::Error> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = pretty_env_logger::try_init_timed();

    info!("Starting API...");

    let config = build_config(&secrets).map_err(error::AppError::from)?;

    info!("Initializing AppState...");
    let state = AppState::init(config).await?;
    info!("AppState initialized");

    Ok(ApiService {
        router: routes::router(state),
    })
}
