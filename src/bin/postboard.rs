use anyhow::Context;
use postboard::{PostboardConfig, api};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("warn".parse()?)
                .add_directive("postboard=info".parse()?),
        )
        .init();

    let config = PostboardConfig::load().context("failed to load configuration")?;
    api::run(config).await.context("server failed")
}
