//! Outbound seam between the pipeline and the transport layer.
//!
//! The pipeline and order service send through this trait instead of the
//! connection manager directly, so they can be exercised against a
//! recording fake in tests.

use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use vendly_types::transport::{MediaRef, TransportError};

use crate::repository::session::SessionRepository;
use crate::session::SecretSealer;
use crate::transport::{ConnectionManager, TransportConnector};

pub trait OutboundGateway: Send + Sync {
    fn send_text(
        &self,
        account_id: Uuid,
        recipient: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Fetch inbound media to a local file. Failures degrade to `None`.
    fn fetch_media(
        &self,
        account_id: Uuid,
        media: &MediaRef,
    ) -> impl std::future::Future<Output = Option<PathBuf>> + Send;
}

impl<C, R, V> OutboundGateway for Arc<ConnectionManager<C, R, V>>
where
    C: TransportConnector + 'static,
    R: SessionRepository + Send + Sync + 'static,
    V: SecretSealer + 'static,
{
    async fn send_text(
        &self,
        account_id: Uuid,
        recipient: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        ConnectionManager::send_text(self, account_id, recipient, body).await
    }

    async fn fetch_media(&self, account_id: Uuid, media: &MediaRef) -> Option<PathBuf> {
        ConnectionManager::download_media(self, account_id, media).await
    }
}
