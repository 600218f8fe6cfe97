//! TCP ingress for GSM modem traffic.
//!
//! A long-lived socket server per configured listener; no application-layer
//! handshake — the first bytes from a connecting device go straight through
//! framing and decoding, and the device gets no acknowledgement back.
//! Each accepted connection runs in its own task; a socket error terminates
//! only that connection while the listener keeps accepting.

use crate::config::TcpListenerConfig;
use crate::framing::FrameAccumulator;
use crate::pipeline::{IncomingMessage, IngestPipeline};
use rastro_protocol::SourceType;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// A bound TCP ingress listener. Bind first (so the port is known and
/// errors surface at startup), then spawn [`TcpIngress::run`].
pub struct TcpIngress {
    listener: TcpListener,
    config: TcpListenerConfig,
    pipeline: Arc<IngestPipeline>,
    shutdown_rx: watch::Receiver<bool>,
}

impl TcpIngress {
    pub async fn bind(
        config: TcpListenerConfig,
        pipeline: Arc<IngestPipeline>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind).await?;
        Ok(TcpIngress {
            listener,
            config,
            pipeline,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Returns when shutdown is signalled.
    pub async fn run(self) {
        let TcpIngress {
            listener,
            config,
            pipeline,
            mut shutdown_rx,
        } = self;
        info!(
            listener = %config.label,
            framing = config.framing.as_str(),
            "tcp ingress accepting connections"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!(listener = %config.label, "tcp ingress stopping (shutdown)");
                        return;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let pipeline = Arc::clone(&pipeline);
                            let config = config.clone();
                            let shutdown_rx = shutdown_rx.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, peer, config, pipeline, shutdown_rx)
                                    .await;
                            });
                        }
                        Err(e) => {
                            // Accept errors are transient (fd pressure);
                            // the server keeps accepting.
                            warn!(listener = %config.label, error = %e, "accept failed");
                        }
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: TcpListenerConfig,
    pipeline: Arc<IngestPipeline>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(peer = %peer, listener = %config.label, "device connected");

    let mut accumulator = FrameAccumulator::new(config.framing);
    let mut buf = vec![0u8; 4096];

    loop {
        let read_result = tokio::select! {
            result = stream.read(&mut buf) => result,
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    debug!(peer = %peer, "connection task stopping (shutdown)");
                    return;
                }
                continue;
            }
        };

        match read_result {
            Err(e) => {
                // Connection-scoped: log and drop this socket only.
                warn!(peer = %peer, error = %e, "socket read error; closing connection");
                break;
            }
            Ok(0) => {
                info!(peer = %peer, "device disconnected");
                break;
            }
            Ok(n) => {
                for candidate in accumulator.push_chunk(&buf[..n]) {
                    let mut metadata = serde_json::Map::new();
                    metadata.insert("received_via".to_owned(), json!("TCP"));
                    metadata.insert("listener".to_owned(), json!(config.label));
                    // In-order, awaited: messages on one connection are
                    // dispatched in arrival order.
                    pipeline
                        .ingest_message(IncomingMessage {
                            payload: candidate,
                            source_type: SourceType::GsmApn,
                            source_identifier: Some(peer.to_string()),
                            declared_serial: None,
                            remote_address: Some(peer.ip().to_string()),
                            remote_port: Some(peer.port()),
                            http: None,
                            metadata,
                        })
                        .await;
                }
            }
        }
    }

    let remainder = accumulator.into_remainder();
    if !remainder.is_empty() {
        // Unterminated tail under delimiter framing is discarded, never
        // force-flushed as a message.
        debug!(
            peer = %peer,
            bytes = remainder.len(),
            "discarding unterminated trailing buffer"
        );
    }
}
