use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Context;
use tokio::io::Interest;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::server::registry::{ConnectionId, Registry};
use crate::server::transport::{Readiness, TcpChannel, TlsFlags};

pub type SharedRegistry = Rc<RefCell<Registry<TcpChannel>>>;

/// Accepts connections forever. Must run inside a `LocalSet`.
pub async fn run(cfg: &Config, registry: SharedRegistry) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&cfg.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", cfg.listen_addr))?;
    info!("Listening on {}", cfg.listen_addr);

    loop {
        let (socket, peer) = listener.accept().await?;
        debug!("Accepted connection from {}", peer);

        let socket = Rc::new(socket);
        let accepted = registry
            .borrow_mut()
            .accept(TcpChannel::new(socket.clone()), TlsFlags::NONE, cfg);

        match accepted {
            Ok(id) => {
                tokio::task::spawn_local(drive(registry.clone(), socket, id));
            }
            Err(e) => error!(%peer, error = %e, "failed to attach connection"),
        }
    }
}

/// Waits for the readiness the connection's current handler wants and
/// dispatches it, following the connection across hand-offs.
async fn drive(registry: SharedRegistry, socket: Rc<TcpStream>, mut id: ConnectionId) {
    loop {
        let Some(wanted) = registry.borrow().interest(id) else {
            break;
        };

        let interest = match (wanted.read, wanted.write) {
            (true, true) => Interest::READABLE | Interest::WRITABLE,
            (false, true) => Interest::WRITABLE,
            _ => Interest::READABLE,
        };

        let readiness = match socket.ready(interest).await {
            Ok(ready) if wanted.write && ready.is_writable() => Readiness::Writable,
            Ok(_) => Readiness::Readable,
            Err(e) => {
                debug!(conn = %id, error = %e, "readiness wait failed");
                Readiness::Closed
            }
        };

        match registry.borrow_mut().dispatch(id, readiness) {
            Some(next) => id = next,
            None => break,
        }
    }
}
