//! `daeview` command-line entry point.

#[cfg(not(target_arch = "wasm32"))]
mod cli {
    use std::path::PathBuf;

    use anyhow::Context;
    use clap::Parser;
    use daeview_client::app::AppOptions;
    use daeview_core::ViewerConfig;

    #[derive(Parser, Debug)]
    #[command(name = "daeview", version, about = "View an animated Collada (.dae) model")]
    pub struct Cli {
        /// Model path or http(s) URL to load on startup
        pub uri: Option<String>,

        /// JSON viewer configuration
        #[arg(short, long)]
        pub config: Option<PathBuf>,

        /// Initial window width in logical pixels
        #[arg(long, default_value_t = 1280, value_parser = clap::value_parser!(u32).range(1..))]
        pub width: u32,

        /// Initial window height in logical pixels
        #[arg(long, default_value_t = 720, value_parser = clap::value_parser!(u32).range(1..))]
        pub height: u32,
    }

    impl Cli {
        pub fn into_options(self) -> anyhow::Result<AppOptions> {
            let config = match &self.config {
                Some(path) => ViewerConfig::from_path(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => ViewerConfig::default(),
            };
            Ok(AppOptions {
                uri: self.uri,
                config,
                width: self.width,
                height: self.height,
            })
        }
    }

}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    use clap::Parser;

    let options = cli::Cli::parse().into_options()?;
    daeview_client::run(options)
}

#[cfg(target_arch = "wasm32")]
fn main() {}
