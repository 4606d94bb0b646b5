//! Registry service: collect registrations, broadcast the phone book.
//!
//! Single-shot state machine `Collecting -> Broadcasting`. The registry
//! holds every worker connection open while collecting, so the broadcast
//! reaches exactly the workers that registered; a worker that connects
//! after the expected count is reached is not served.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::CoordError;
use crate::messages::{Message, PhoneBookEntry};

/// One-shot registration service for a fixed-size worker fleet.
pub struct Registry {
    listener: TcpListener,
    expected: usize,
}

impl Registry {
    /// Bind the registry socket. `expected` is the number of workers the
    /// deployment will start; the run cannot begin with fewer.
    pub async fn bind(addr: &str, expected: usize) -> Result<Self, CoordError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, expected, "registry listening");
        Ok(Registry { listener, expected })
    }

    /// The bound address, for deployments that bind port 0.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, CoordError> {
        Ok(self.listener.local_addr()?)
    }

    /// Collect `expected` registrations, then broadcast the phone book to
    /// every registered worker and return it.
    pub async fn run(self) -> Result<Vec<PhoneBookEntry>, CoordError> {
        let mut connections: Vec<BufReader<TcpStream>> = Vec::with_capacity(self.expected);
        let mut entries: Vec<PhoneBookEntry> = Vec::with_capacity(self.expected);

        // Collecting. A stray connection must not take the registry down:
        // it is logged and dropped, and collection continues until the
        // expected count of well-formed registrations arrives.
        while entries.len() < self.expected {
            let (stream, peer) = self.listener.accept().await?;
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            let n = match reader.read_line(&mut line).await {
                Ok(n) => n,
                Err(err) => {
                    warn!(%peer, error = %err, "failed reading registration, dropped");
                    continue;
                }
            };
            if n == 0 {
                warn!(%peer, "connection closed before registering, dropped");
                continue;
            }
            match Message::parse(&line) {
                Ok(Message::Register { host, port }) => {
                    let name = format!("worker{}", entries.len());
                    debug!(%peer, name, host, port, "worker registered");
                    entries.push(PhoneBookEntry {
                        name,
                        address: format!("{host}:{port}"),
                    });
                    connections.push(reader);
                }
                Ok(other) => {
                    warn!(%peer, message = ?other, "expected register, connection dropped");
                }
                Err(err) => {
                    warn!(%peer, error = %err, "unparseable registration, connection dropped");
                }
            }
        }

        // Broadcasting.
        let book = Message::PhoneBook {
            entries: entries.clone(),
        }
        .encode();
        for reader in &mut connections {
            reader.get_mut().write_all(book.as_bytes()).await?;
            reader.get_mut().flush().await?;
        }
        info!(workers = entries.len(), "phone book broadcast");
        Ok(entries)
    }
}
