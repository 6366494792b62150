//! Scripted in-memory transport and helpers shared by unit tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use transport::{IssueFuture, Outcome, RequestConfig, Transport};

use crate::coordinator::AuthCoordinator;
use crate::events::{AuthEvent, BroadcastSink};
use crate::interceptor::{SettlementFor, TransportInterceptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Route {
    Public,
    Private,
    Admin,
    Broken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TestRequest {
    pub id: u32,
    pub route: Route,
    pub token: Option<String>,
    pub ignore_auth: bool,
}

impl TestRequest {
    fn new(id: u32, route: Route) -> Self {
        Self {
            id,
            route,
            token: None,
            ignore_auth: false,
        }
    }

    pub fn public(id: u32) -> Self {
        Self::new(id, Route::Public)
    }

    pub fn private(id: u32) -> Self {
        Self::new(id, Route::Private)
    }

    pub fn admin(id: u32) -> Self {
        Self::new(id, Route::Admin)
    }

    pub fn broken(id: u32) -> Self {
        Self::new(id, Route::Broken)
    }

    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    pub fn bypass(mut self) -> Self {
        self.ignore_auth = true;
        self
    }
}

impl RequestConfig for TestRequest {
    fn ignore_auth_module(&self) -> bool {
        self.ignore_auth
    }
}

/// Private routes succeed with the accepted token, or with any request once
/// `login()` has opened a session. Every issued request is recorded.
pub(crate) struct ScriptedTransport {
    accepted_token: String,
    session: AtomicBool,
    calls: Mutex<Vec<TestRequest>>,
}

impl ScriptedTransport {
    pub fn new(accepted_token: &str) -> Self {
        Self {
            accepted_token: accepted_token.to_string(),
            session: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn login(&self) {
        self.session.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TestRequest> {
        self.calls.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    type Request = TestRequest;
    type Response = String;
    type Failure = String;

    fn issue(&self, request: TestRequest) -> IssueFuture<'_, String, String> {
        self.calls.lock().unwrap().push(request.clone());
        let id = request.id;
        let authorized = self.session.load(Ordering::SeqCst)
            || request.token.as_deref() == Some(self.accepted_token.as_str());
        let outcome = match request.route {
            Route::Public => Outcome::Success(format!("ok:{id}")),
            Route::Private if authorized => Outcome::Success(format!("ok:{id}")),
            Route::Private => Outcome::AuthRequired(format!("401:{id}")),
            Route::Admin => Outcome::Forbidden(format!("403:{id}")),
            Route::Broken => Outcome::Failure(format!("500:{id}")),
        };
        Box::pin(async move { outcome })
    }
}

pub(crate) type Harness = (
    AuthCoordinator<ScriptedTransport>,
    broadcast::Receiver<AuthEvent<String>>,
    HashMap<String, Arc<ScriptedTransport>>,
);

/// Coordinator over one scripted transport per name, all accepting `good`.
pub(crate) fn harness(names: &[&str]) -> Harness {
    let sink = Arc::new(BroadcastSink::new(64));
    let events = sink.subscribe();
    let mut builder = AuthCoordinator::builder();
    let mut transports = HashMap::new();
    for name in names {
        let transport = Arc::new(ScriptedTransport::new("good"));
        builder = builder.register(*name, transport.clone());
        transports.insert(name.to_string(), transport);
    }
    (builder.build(sink).unwrap(), events, transports)
}

/// Issue a private request per id and wait until each one is suspended, so
/// buffer order matches `ids`.
pub(crate) async fn suspend(
    interceptor: &TransportInterceptor<ScriptedTransport>,
    events: &mut broadcast::Receiver<AuthEvent<String>>,
    ids: &[u32],
) -> Vec<JoinHandle<SettlementFor<ScriptedTransport>>> {
    let mut calls = Vec::new();
    for id in ids {
        let interceptor = interceptor.clone();
        let request = TestRequest::private(*id);
        calls.push(tokio::spawn(async move { interceptor.issue(request).await }));
        match events.recv().await.unwrap() {
            AuthEvent::LoginRequired { .. } => {}
            other => panic!("expected LoginRequired, got {other:?}"),
        }
    }
    calls
}

/// Everything published so far.
pub(crate) fn drain_events(
    events: &mut broadcast::Receiver<AuthEvent<String>>,
) -> Vec<AuthEvent<String>> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
