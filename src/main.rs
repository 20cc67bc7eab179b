use std::cell::RefCell;
use std::rc::Rc;

use switchyard::config::Config;
use switchyard::server::handlers::DefaultHandlers;
use switchyard::server::listener;
use switchyard::server::registry::Registry;
use switchyard::server::transport::TcpChannel;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let registry: Rc<RefCell<Registry<TcpChannel>>> = Rc::new(RefCell::new(Registry::new(
        Box::new(DefaultHandlers::new(&cfg)),
    )));

    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            tokio::select! {
                res = listener::run(&cfg, registry.clone()) => {
                    res?;
                }

                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Shutdown signal received");
                }
            }
            anyhow::Ok(())
        })
        .await?;

    registry.borrow_mut().shutdown();
    Ok(())
}
