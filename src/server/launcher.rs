//! Launches every replica of a cluster inside one process.

use std::sync::Arc;

use crate::cluster::{ClusterDefinition, DiscoveryBoard, ServiceDiscovery};
use crate::ring::PlacementRing;
use crate::server::ReplicaServer;
use crate::utils::PlasmaError;

use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::time::Duration;

/// All replicas of one cluster sharing a single placement ring, with their
/// endpoints relayed onto a discovery board.
pub struct ReplicaCluster {
    ring: Arc<PlacementRing>,
    replicas: Vec<ReplicaServer>,
    board: DiscoveryBoard,
}

impl ReplicaCluster {
    /// Builds the ring once, starts `server_count` replicas and waits until
    /// all of them published their endpoints.
    pub async fn launch(
        definition: &ClusterDefinition,
        config_str: Option<&str>,
    ) -> Result<Self, PlasmaError> {
        definition.validate()?;
        let ring = Arc::new(PlacementRing::new_and_setup(
            definition.server_count,
            definition.server_copy_count,
        )?);
        pf_info!(
            "cluster";
            "ring ready: {} routable slots, {} shunted",
            ring.num_routable(),
            ring.num_shunted()
        );

        let board = DiscoveryBoard::new();
        let mut replicas = Vec::with_capacity(definition.server_count as usize);
        let mut relays = Vec::with_capacity(definition.server_count as usize);
        for me in 0..definition.server_count {
            let (tx_port, rx_port) = oneshot::channel();
            relays.push(board.relay(me, rx_port));
            let replica = ReplicaServer::new_and_setup(
                me,
                definition.bind_addr(me),
                ring.clone(),
                tx_port,
                config_str,
            )
            .await?;
            replicas.push(replica);
        }
        for relay in join_all(relays).await {
            relay??;
        }
        board
            .wait_ready(definition.server_count, Duration::from_secs(5))
            .await?;

        Ok(ReplicaCluster {
            ring,
            replicas,
            board,
        })
    }

    pub fn ring(&self) -> &Arc<PlacementRing> {
        &self.ring
    }

    pub fn board(&self) -> &DiscoveryBoard {
        &self.board
    }

    pub fn replicas(&self) -> &[ReplicaServer] {
        &self.replicas
    }

    pub fn replica(&self, me: u8) -> Option<&ReplicaServer> {
        self.replicas.get(me as usize)
    }

    pub fn replica_mut(&mut self, me: u8) -> Option<&mut ReplicaServer> {
        self.replicas.get_mut(me as usize)
    }

    /// Number of replicas whose accept loop is still running.
    pub fn num_running(&self) -> usize {
        self.replicas.iter().filter(|r| r.is_running()).count()
    }

    /// Waits until every replica stopped on its own.
    pub async fn wait_all_stopped(&mut self) -> Result<(), PlasmaError> {
        for replica in self.replicas.iter_mut() {
            replica.wait_stopped().await?;
        }
        Ok(())
    }

    /// Shuts down every replica, reporting the first failure.
    pub async fn shutdown(&mut self) -> Result<(), PlasmaError> {
        let mut result = Ok(());
        for replica in self.replicas.iter_mut() {
            if let Err(e) = replica.shutdown().await {
                result = result.and(Err(e));
            }
        }
        result
    }
}

#[cfg(test)]
mod launcher_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn launch_and_shutdown() -> Result<(), PlasmaError> {
        let definition = ClusterDefinition::new(3, 3, 3, 2)?;
        let mut cluster = ReplicaCluster::launch(&definition, None).await?;
        assert_eq!(cluster.board().num_known(), 3);
        assert_eq!(cluster.num_running(), 3);
        for replica in cluster.replicas() {
            assert_eq!(
                cluster.board().lookup(replica.me()),
                Some(replica.local_addr())
            );
        }
        let text = cluster.board().to_ports_text();
        assert_eq!(text.lines().count(), 3);
        cluster.shutdown().await?;
        assert_eq!(cluster.num_running(), 0);
        Ok(())
    }
}
