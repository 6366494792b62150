//! Application-facing control surface for pending authentication
//!
//! The coordinator owns the transport registry. Application code issues
//! requests through the interceptors it hands out and, once re-authentication
//! has been decided out of band, calls `confirm*` or `cancel*`.
//!
//! `confirm` and `cancel` act on the transport that most recently suspended a
//! request (last failure wins). `confirm_transport` and `cancel_transport`
//! name the transport explicitly, which is what callers handling overlapping
//! episodes on several transports should use. The transport name arrives with
//! every `LoginRequired` event.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use transport::Transport;

use crate::buffer::{Drained, ReplayHandle};
use crate::error::{Error, Result};
use crate::events::{AuthEvent, EventSink};
use crate::interceptor::TransportInterceptor;
use crate::registry::{Registry, TransportName};

/// Trait object for registering differently-typed transports that share
/// request, response and failure types.
pub type DynTransport<R, V, F> = dyn Transport<Request = R, Response = V, Failure = F>;

/// Collects the fixed set of named transports.
pub struct CoordinatorBuilder<T: Transport + ?Sized> {
    transports: Vec<(TransportName, Arc<T>)>,
}

impl<T: Transport + ?Sized + 'static> CoordinatorBuilder<T> {
    pub fn register(mut self, name: impl Into<TransportName>, transport: Arc<T>) -> Self {
        self.transports.push((name.into(), transport));
        self
    }

    /// Fails with `DuplicateTransport` if a name was registered twice.
    pub fn build(self, sink: Arc<dyn EventSink<T::Failure>>) -> Result<AuthCoordinator<T>> {
        let registry = Registry::new(self.transports, sink)?;
        info!(
            transports = registry.names().count(),
            "auth coordinator initialized"
        );
        Ok(AuthCoordinator {
            registry: Arc::new(registry),
        })
    }
}

/// Confirms or cancels suspended requests.
pub struct AuthCoordinator<T: Transport + ?Sized> {
    registry: Arc<Registry<T>>,
}

impl<T: Transport + ?Sized> Clone for AuthCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
        }
    }
}

impl<T: Transport + ?Sized + 'static> AuthCoordinator<T> {
    pub fn builder() -> CoordinatorBuilder<T> {
        CoordinatorBuilder {
            transports: Vec::new(),
        }
    }

    /// Intercepted handle for a registered transport.
    pub fn transport(&self, name: &str) -> Option<TransportInterceptor<T>> {
        let slot = self.registry.slot(name).ok()?;
        Some(TransportInterceptor::new(slot.clone(), self.registry.clone()))
    }

    /// Registered names, sorted.
    pub fn transport_names(&self) -> Vec<TransportName> {
        let mut names: Vec<_> = self.registry.names().cloned().collect();
        names.sort();
        names
    }

    /// Transport whose suspension `confirm`/`cancel` would act on.
    pub async fn active_transport(&self) -> Option<TransportName> {
        self.registry.active.lock().await.clone()
    }

    /// Number of requests currently suspended on `name`.
    pub async fn pending(&self, name: &str) -> Result<usize> {
        let slot = self.registry.slot(name)?;
        Ok(match slot.existing_buffer() {
            Some(buffer) => buffer.len().await,
            None => 0,
        })
    }

    /// Replay the active transport's requests unchanged.
    pub async fn confirm(&self, data: Option<Value>) -> Result<ReplayHandle> {
        self.confirm_with(data, Ok::<_, Infallible>).await
    }

    /// Replay the active transport's requests, passing each through
    /// `updater` first (e.g. to attach a fresh credential).
    ///
    /// A request whose update fails is rejected with
    /// `RequestError::ConfigUpdate`; the others are still replayed.
    pub async fn confirm_with<U, E>(&self, data: Option<Value>, updater: U) -> Result<ReplayHandle>
    where
        U: FnMut(T::Request) -> std::result::Result<T::Request, E>,
        E: fmt::Display,
    {
        let mut active = self.registry.active.lock().await;
        let name = active.clone().ok_or(Error::NoPendingEpisode)?;
        self.replay(&mut active, name.as_str(), data, updater).await
    }

    /// Like `confirm_with`, for an explicitly named transport.
    pub async fn confirm_transport<U, E>(
        &self,
        name: &str,
        data: Option<Value>,
        updater: U,
    ) -> Result<ReplayHandle>
    where
        U: FnMut(T::Request) -> std::result::Result<T::Request, E>,
        E: fmt::Display,
    {
        let mut active = self.registry.active.lock().await;
        self.replay(&mut active, name, data, updater).await
    }

    /// Reject the active transport's requests with `reason`, or abandon them
    /// when `reason` is `None`.
    pub async fn cancel(&self, data: Option<Value>, reason: Option<String>) -> Result<Drained> {
        let mut active = self.registry.active.lock().await;
        let name = active.clone().ok_or(Error::NoPendingEpisode)?;
        self.reject(&mut active, name.as_str(), data, reason).await
    }

    /// Like `cancel`, for an explicitly named transport.
    pub async fn cancel_transport(
        &self,
        name: &str,
        data: Option<Value>,
        reason: Option<String>,
    ) -> Result<Drained> {
        let mut active = self.registry.active.lock().await;
        self.reject(&mut active, name, data, reason).await
    }

    async fn replay<U, E>(
        &self,
        active: &mut Option<TransportName>,
        name: &str,
        data: Option<Value>,
        updater: U,
    ) -> Result<ReplayHandle>
    where
        U: FnMut(T::Request) -> std::result::Result<T::Request, E>,
        E: fmt::Display,
    {
        let slot = self.registry.slot(name)?.clone();
        let buffer = slot.existing_buffer().ok_or(Error::NoPendingEpisode)?;

        // Replays go back through the interceptor so a replay that fails
        // auth-required again is suspended into a new episode.
        let interceptor = TransportInterceptor::new(slot.clone(), self.registry.clone());
        let handle = buffer
            .retry_all(updater, move |request| {
                let interceptor = interceptor.clone();
                async move { interceptor.dispatch(request).await }
            })
            .await
            .ok_or(Error::NoPendingEpisode)?;

        if active.as_ref() == Some(&slot.name) {
            *active = None;
        }

        info!(
            transport = %slot.name,
            episode = %handle.drained.episode,
            entries = handle.drained.entries,
            "login confirmed"
        );
        self.registry.sink.publish(AuthEvent::LoginConfirmed {
            transport: slot.name.clone(),
            episode: handle.drained.episode,
            data,
        });
        Ok(handle)
    }

    async fn reject(
        &self,
        active: &mut Option<TransportName>,
        name: &str,
        data: Option<Value>,
        reason: Option<String>,
    ) -> Result<Drained> {
        let slot = self.registry.slot(name)?;
        let buffer = slot.existing_buffer().ok_or(Error::NoPendingEpisode)?;
        let abandoned = reason.is_none();
        let drained = buffer
            .reject_all(reason)
            .await
            .ok_or(Error::NoPendingEpisode)?;

        if active.as_ref() == Some(&slot.name) {
            *active = None;
        }

        info!(
            transport = %slot.name,
            episode = %drained.episode,
            entries = drained.entries,
            abandoned,
            "login cancelled"
        );
        self.registry.sink.publish(AuthEvent::LoginCancelled {
            transport: slot.name.clone(),
            episode: drained.episode,
            data,
        });
        Ok(drained)
    }
}
