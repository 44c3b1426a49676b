mod app;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    app::App::new().run().await
}
