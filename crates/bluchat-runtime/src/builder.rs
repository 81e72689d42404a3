//! Coordinator Builder API
//!
//! Wires a link backend, configuration and channels into a running
//! coordinator task and hands back its command handle and event receiver.

use std::sync::Arc;

use bluchat_core::{
    create_app_event_channel, AppEventReceiver, ChannelConfig, ChatError, ChatResult, LinkConfig,
};
use bluchat_link::{LinkBackend, SharedBackend};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::coordinator::CoordinatorTask;
use crate::handle::CoordinatorHandle;

// ----------------------------------------------------------------------------
// Coordinator Builder
// ----------------------------------------------------------------------------

/// Builder for a connection coordinator over one link backend
pub struct CoordinatorBuilder {
    backend: SharedBackend,
    link: LinkConfig,
    channels: ChannelConfig,
}

impl CoordinatorBuilder {
    pub fn new(backend: impl LinkBackend + 'static) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    /// Use a backend that is already shared with other components
    pub fn from_shared(backend: SharedBackend) -> Self {
        Self {
            backend,
            link: LinkConfig::default(),
            channels: ChannelConfig::default(),
        }
    }

    /// Set the service record, read buffer and connect timeout settings
    pub fn with_link_config(mut self, config: LinkConfig) -> Self {
        self.link = config;
        self
    }

    /// Set command and event channel capacities
    pub fn with_channel_config(mut self, config: ChannelConfig) -> Self {
        self.channels = config;
        self
    }

    /// Validate configuration and spawn the coordinator task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> ChatResult<RunningCoordinator> {
        self.link.validate()?;
        self.channels.validate()?;

        let (command_sender, command_receiver) = mpsc::channel(self.channels.command_buffer_size);
        let (event_sender, event_receiver) = create_app_event_channel(&self.channels);

        info!(
            "Starting coordinator for {} on {} backend",
            self.link.service(),
            self.backend.name()
        );
        let task = CoordinatorTask::new(self.backend, self.link, command_receiver, event_sender);
        let task = tokio::spawn(task.run());

        Ok(RunningCoordinator {
            handle: CoordinatorHandle::new(command_sender),
            events: Some(event_receiver),
            task: Some(task),
        })
    }
}

// ----------------------------------------------------------------------------
// Running Coordinator
// ----------------------------------------------------------------------------

/// A spawned coordinator: its handle, its event stream and its task
pub struct RunningCoordinator {
    handle: CoordinatorHandle,
    events: Option<AppEventReceiver>,
    task: Option<JoinHandle<()>>,
}

impl RunningCoordinator {
    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// Take the app event receiver (can only be called once)
    pub fn take_events(&mut self) -> Option<AppEventReceiver> {
        self.events.take()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Shut the coordinator down and wait for its task to finish
    pub async fn shutdown(mut self) -> ChatResult<()> {
        let result = match self.handle.clone().shutdown().await {
            Err(ChatError::CoordinatorStopped) => Ok(()),
            other => other,
        };
        if let Some(task) = self.task.take() {
            task.await.map_err(|_| ChatError::CoordinatorStopped)?;
        }
        result
    }
}
