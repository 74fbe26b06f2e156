use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("peer {0} is not connected")]
    NotConnected(String),
    #[error("send to {0} failed: {1}")]
    Send(String, String),
}

/// Seam to the host P2P layer.
///
/// The engine addresses peers by their stable address string and ships
/// opaque packet bytes on the overlay channel; connectivity, framing
/// and delivery are the host's concern. The host in turn feeds inbound
/// bytes to [`XRouterApp::on_message`](crate::XRouterApp::on_message)
/// and reports peer churn through `on_peer_connected` /
/// `on_peer_disconnected`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, peer: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Raises the misbehavior score the host tracks for `peer`.
    fn penalize(&self, peer: &str, score: u32);
}
