use clap::Parser;

use gltf_viewer::{
    capture,
    config::{Cli, OutputMode, ViewerConfig},
    flow,
};

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ViewerConfig::try_from(cli)?;
    match config.output.clone() {
        OutputMode::Interactive => flow::run(config),
        OutputMode::Image(path) => {
            log::info!("Rendering {} to {}", config.document.display(), path.display());
            capture::render_to_file(&config, &path)
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Cli::parse()) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}
