//! Transport connector and handle ports.
//!
//! The chat transport itself lives behind these traits so the connection
//! manager can be exercised against in-memory fakes. A connector opens a
//! connection for one account; the handle sends on it; events arrive on a
//! channel the connector hands back.

use std::path::PathBuf;

use tokio::sync::mpsc;
use uuid::Uuid;

use vendly_types::session::CredentialState;
use vendly_types::transport::{MediaRef, TransportError, TransportEvent};

/// One live connection: the outbound handle plus its event stream.
pub struct TransportConnection {
    pub handle: BoxTransportHandle,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Opens transport connections for accounts.
pub trait TransportConnector: Send + Sync {
    /// Establish a connection using the account's stored credentials.
    ///
    /// With fresh credentials the transport emits a pairing code event
    /// before completing registration; with registered credentials it
    /// resumes the existing session.
    fn connect(
        &self,
        account_id: Uuid,
        credentials: CredentialState,
    ) -> impl std::future::Future<Output = Result<TransportConnection, TransportError>> + Send;
}

/// Outbound operations on one live connection.
pub trait TransportHandle: Send + Sync {
    fn send_text(
        &self,
        recipient: &str,
        body: &str,
    ) -> impl std::future::Future<Output = Result<(), TransportError>> + Send;

    /// Fetch remote media into a local file and return its path.
    fn download_media(
        &self,
        media: &MediaRef,
    ) -> impl std::future::Future<Output = Result<PathBuf, TransportError>> + Send;

    fn close(&self) -> impl std::future::Future<Output = ()> + Send;
}

// --- Type-erased wrappers ---

/// Object-safe mirror of [`TransportHandle`].
pub trait TransportHandleDyn {
    fn send_text_boxed<'a>(
        &'a self,
        recipient: &'a str,
        body: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), TransportError>> + Send + 'a>,
    >;

    fn download_media_boxed<'a>(
        &'a self,
        media: &'a MediaRef,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<PathBuf, TransportError>> + Send + 'a>,
    >;

    fn close_boxed<'a>(
        &'a self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>>;
}

impl<T: TransportHandle> TransportHandleDyn for T {
    fn send_text_boxed<'a>(
        &'a self,
        recipient: &'a str,
        body: &'a str,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<(), TransportError>> + Send + 'a>,
    > {
        Box::pin(self.send_text(recipient, body))
    }

    fn download_media_boxed<'a>(
        &'a self,
        media: &'a MediaRef,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<PathBuf, TransportError>> + Send + 'a>,
    > {
        Box::pin(self.download_media(media))
    }

    fn close_boxed<'a>(
        &'a self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
        Box::pin(self.close())
    }
}

/// Boxed transport handle for heterogeneous storage.
pub struct BoxTransportHandle {
    inner: Box<dyn TransportHandleDyn + Send + Sync>,
}

impl BoxTransportHandle {
    pub fn new<T: TransportHandle + 'static>(handle: T) -> Self {
        Self {
            inner: Box::new(handle),
        }
    }

    pub async fn send_text(&self, recipient: &str, body: &str) -> Result<(), TransportError> {
        self.inner.send_text_boxed(recipient, body).await
    }

    pub async fn download_media(&self, media: &MediaRef) -> Result<PathBuf, TransportError> {
        self.inner.download_media_boxed(media).await
    }

    pub async fn close(&self) {
        self.inner.close_boxed().await
    }
}
