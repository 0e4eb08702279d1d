//! Client-side transport seam: one request/response exchange with one
//! replica.

use std::sync::Arc;

use crate::cluster::ServiceDiscovery;
use crate::message::{Request, Response};
use crate::ring::ServerNumber;
use crate::utils::{
    read_frame, tcp_connect_with_retry, write_frame, PlasmaError,
    FRAME_HEADER_LEN,
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::time::{self, Duration};

/// Moves one request payload to a replica and its reply payload back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn exchange(
        &self,
        server: ServerNumber,
        payload: Bytes,
    ) -> Result<Bytes, PlasmaError>;
}

/// Sends `request` to `server` alone and decodes the reply.
pub(crate) async fn exchange_request(
    transport: &dyn Transport,
    server: ServerNumber,
    request: &Request,
) -> Result<Response, PlasmaError> {
    let reply = transport.exchange(server, request.encode()).await?;
    Response::from_bytes(reply)
}

/// TCP transport opening one connection per exchange, with every step
/// bounded by the I/O timeout.
pub struct TcpTransport {
    discovery: Arc<dyn ServiceDiscovery>,
    io_timeout: Duration,
    connect_retries: u8,
    max_frame_len: usize,
}

impl TcpTransport {
    pub fn new(
        discovery: Arc<dyn ServiceDiscovery>,
        io_timeout: Duration,
        connect_retries: u8,
        max_frame_len: usize,
    ) -> Self {
        TcpTransport {
            discovery,
            io_timeout,
            connect_retries,
            max_frame_len,
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn exchange(
        &self,
        server: ServerNumber,
        payload: Bytes,
    ) -> Result<Bytes, PlasmaError> {
        let addr = self.discovery.lookup(server).ok_or_else(|| {
            PlasmaError::msg(format!("no endpoint known for server {}", server))
        })?;

        let mut stream = time::timeout(
            self.io_timeout,
            tcp_connect_with_retry(
                addr,
                self.connect_retries,
                Duration::from_millis(50),
            ),
        )
        .await??;
        let (mut conn_read, mut conn_write) = stream.split();

        time::timeout(self.io_timeout, write_frame(&mut conn_write, &payload))
            .await??;
        let mut read_buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 256);
        let reply = time::timeout(
            self.io_timeout,
            read_frame(&mut read_buf, &mut conn_read, self.max_frame_len),
        )
        .await??;
        Ok(reply)
    }
}

#[cfg(test)]
mod transport_tests {
    use super::*;
    use crate::cluster::{ClusterDefinition, DiscoveryBoard};
    use crate::message::ResponseType;
    use crate::server::ReplicaCluster;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tcp_exchange() -> Result<(), PlasmaError> {
        let definition = ClusterDefinition::new(2, 2, 2, 2)?;
        let mut cluster = ReplicaCluster::launch(&definition, None).await?;
        let transport = TcpTransport::new(
            Arc::new(cluster.board().clone()),
            Duration::from_secs(1),
            0,
            1 << 20,
        );
        let reply = exchange_request(&transport, 1, &Request::Ping).await?;
        assert_eq!(reply.response_type(), ResponseType::Ping);
        assert!(exchange_request(&transport, 5, &Request::Ping)
            .await
            .is_err());
        cluster.shutdown().await?;
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn tcp_exchange_refused() -> Result<(), PlasmaError> {
        // grab a free port, then close it again
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        drop(listener);
        let board = DiscoveryBoard::new();
        board.publish(0, addr)?;
        let transport = TcpTransport::new(
            Arc::new(board),
            Duration::from_millis(500),
            1,
            1 << 20,
        );
        assert!(exchange_request(&transport, 0, &Request::Ping)
            .await
            .is_err());
        Ok(())
    }
}
