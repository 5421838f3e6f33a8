use jukebox::catalog::Catalog;
use jukebox::config::Config;
use jukebox::server::EventLoop;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let catalog = Catalog::scan(&cfg.library.media_dir)?;
    tracing::info!(
        "Loaded {} tracks from {}",
        catalog.len(),
        cfg.library.media_dir.display()
    );

    let mut server = EventLoop::bind(&cfg.server.listen_addr, catalog)?;
    tracing::info!("Listening on {}", cfg.server.listen_addr);

    server.run()
}
