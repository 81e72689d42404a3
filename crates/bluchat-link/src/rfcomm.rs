//! Linux RFCOMM link backend using bluer (BlueZ)
//!
//! Both roles go through BlueZ profiles: the listener registers a server
//! profile under the service UUID, which also publishes the SDP record, and
//! the connector registers a client profile and asks BlueZ to connect it to
//! the remote device. Either way the stream arrives as a `ConnectRequest`.

use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bluchat_core::{PeerIdentity, ServiceRecord};
use bluer::rfcomm::{Profile, ProfileHandle, Role};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::backend::{stream_setup_failed, BoxedStream, LinkBackend, LinkEndpoint, Transport};

fn bluez_error(context: &str, error: impl std::fmt::Display) -> io::Error {
    io::Error::other(format!("{context}: {error}"))
}

/// RFCOMM over the default Bluetooth adapter
#[derive(Clone)]
pub struct RfcommLink {
    session: bluer::Session,
    adapter: bluer::Adapter,
}

impl std::fmt::Debug for RfcommLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RfcommLink")
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

impl RfcommLink {
    /// Connect to BlueZ and power on the default adapter
    pub async fn open() -> io::Result<Self> {
        let session = bluer::Session::new()
            .await
            .map_err(|e| bluez_error("BlueZ session", e))?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|e| bluez_error("Bluetooth adapter", e))?;

        if !adapter.is_powered().await.unwrap_or(false) {
            adapter
                .set_powered(true)
                .await
                .map_err(|e| bluez_error("Failed to power on adapter", e))?;
        }

        info!("RFCOMM backend using adapter {}", adapter.name());
        Ok(Self { session, adapter })
    }

    async fn register(&self, service: &ServiceRecord, role: Role) -> io::Result<ProfileHandle> {
        let profile = Profile {
            uuid: service.uuid,
            name: Some(service.name.clone()),
            role: Some(role),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        self.session
            .register_profile(profile)
            .await
            .map_err(|e| bluez_error("register profile", e))
    }

    async fn describe(&self, address: bluer::Address) -> PeerIdentity {
        let name = match self.adapter.device(address) {
            Ok(device) => device.name().await.ok().flatten(),
            Err(_) => None,
        };
        match name {
            Some(name) => PeerIdentity::new(address.to_string(), name),
            None => PeerIdentity::unnamed(address.to_string()),
        }
    }
}

#[async_trait]
impl LinkBackend for RfcommLink {
    fn name(&self) -> &'static str {
        "rfcomm"
    }

    async fn bind(&self, service: &ServiceRecord) -> io::Result<Box<dyn LinkEndpoint>> {
        let handle = self.register(service, Role::Server).await?;
        debug!("RFCOMM server profile registered for {}", service);
        Ok(Box::new(RfcommEndpoint {
            link: self.clone(),
            handle: Box::pin(handle),
        }))
    }

    async fn connect(
        &self,
        peer: &PeerIdentity,
        service: &ServiceRecord,
    ) -> io::Result<BoxedStream> {
        let address: bluer::Address = peer.address().parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("bad device address {}: {}", peer.address(), e),
            )
        })?;
        let device = self
            .adapter
            .device(address)
            .map_err(|e| bluez_error("device lookup", e))?;

        // Dropping the handle unregisters the client profile.
        let mut handle = Box::pin(self.register(service, Role::Client).await?);
        // One profile connect for the whole attempt, however many stray requests arrive.
        let connect = device.connect_profile(&service.uuid);
        tokio::pin!(connect);
        let mut profile_connected = false;

        loop {
            tokio::select! {
                result = &mut connect, if !profile_connected => {
                    match result {
                        Ok(()) => profile_connected = true,
                        Err(e) => return Err(bluez_error("connect profile", e)),
                    }
                }
                request = handle.next() => {
                    let request = request.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::ConnectionAborted, "profile unregistered")
                    })?;
                    if request.device() != address {
                        warn!("Rejecting RFCOMM request from unexpected device {}", request.device());
                        request.reject(bluer::rfcomm::ReqError::Rejected);
                        continue;
                    }
                    let stream = request
                        .accept()
                        .map_err(|e| stream_setup_failed(bluez_error("accept stream", e)))?;
                    return Ok(Box::new(stream));
                }
            }
        }
    }
}

struct RfcommEndpoint {
    link: RfcommLink,
    handle: Pin<Box<ProfileHandle>>,
}

#[async_trait]
impl LinkEndpoint for RfcommEndpoint {
    async fn accept(&mut self) -> io::Result<Transport> {
        let request = self.handle.next().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "profile unregistered")
        })?;
        let address = request.device();
        let stream = request
            .accept()
            .map_err(|e| stream_setup_failed(bluez_error("accept stream", e)))?;
        let peer = self.link.describe(address).await;
        Ok(Transport::new(stream, peer))
    }

    fn local_address(&self) -> Option<String> {
        Some(self.link.adapter.name().to_string())
    }
}
