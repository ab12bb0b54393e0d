pub mod app;
pub mod renderer;

use clap::Parser;
use color_eyre::Result;
use app::App;
use renderer::config::{Args, RenderConfig};

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let config = RenderConfig::from(Args::parse());
    log::debug!("{:?}", config);

    let app = App::new(config)?;
    app.run()?;

    Ok(())
}
