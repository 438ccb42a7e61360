use server::{config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::init_tracing();

    let config = Config::load()?;
    let state = AppState::new(config).await?;

    #[cfg(feature = "process")]
    if state.config.seed_on_start {
        process::seed(&state.store, &state.config.data_dir).await?;
    }

    server::start_server(state).await
}
