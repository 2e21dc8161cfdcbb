//! Process-local pub/sub over a broadcast medium shared by all windows.
//!
//! Every envelope carries a [`Target`]; receivers drop envelopes not meant
//! for their current role. Requests are paired with responses through a
//! correlation id and a table of pending resolvers.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::BusError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    Response,
    WindowOpen,
    WindowClose,
    WindowUpdate,
    WindowInfo,
    /// Periodic body snapshot, authority to followers.
    EngineUpdate,
    EngineAdd,
    EngineRemove,
    EngineConfigure,
    DragStart,
    DragEnd,
    DragMove,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Target {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "client")]
    Followers,
    #[serde(rename = "host")]
    Authority,
}

impl Target {
    pub fn accepts(self, is_authority: bool) -> bool {
        match self {
            Target::All => true,
            Target::Authority => is_authority,
            Target::Followers => !is_authority,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn new() -> Self {
        CorrelationId(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One message unit on the bus. The JSON form is the wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub target: Target,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CorrelationId>,
}

impl Envelope {
    pub fn new<T: Serialize>(kind: MessageKind, target: Target, data: &T) -> Result<Self, BusError> {
        let data = serde_json::to_value(data).map_err(|source| BusError::Payload { kind, source })?;
        Ok(Envelope {
            kind,
            target,
            data,
            id: None,
        })
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BusError> {
        T::deserialize(&self.data).map_err(|source| BusError::Payload {
            kind: self.kind,
            source,
        })
    }

    pub fn to_json(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(s: &str) -> Result<Self, BusError> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Broadcast medium. Delivers to every other peer, never back to the sender.
pub trait Transport {
    fn post(&self, envelope: &Envelope) -> Result<(), BusError>;
}

/// Resolves once the correlated response arrives, or with
/// [`BusError::NoResponse`] once the request expires.
pub struct PendingResponse {
    id: CorrelationId,
    rx: oneshot::Receiver<Value>,
}

impl PendingResponse {
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl Future for PendingResponse {
    type Output = Result<Value, BusError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(v)) => Poll::Ready(Ok(v)),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(BusError::NoResponse(id))),
            Poll::Pending => Poll::Pending,
        }
    }
}

type Handler = Box<dyn FnMut(&Envelope)>;

struct Pending {
    resolve: oneshot::Sender<Value>,
    issued_at: f64,
}

pub struct Messenger {
    transport: Rc<dyn Transport>,
    handlers: HashMap<MessageKind, Vec<Handler>>,
    pending: HashMap<CorrelationId, Pending>,
    timeout_ms: Option<f64>,
    clock: f64,
}

impl Messenger {
    /// `timeout_ms = None` keeps unanswered requests pending forever.
    pub fn new(transport: Rc<dyn Transport>, timeout_ms: Option<f64>) -> Self {
        Messenger {
            transport,
            handlers: HashMap::new(),
            pending: HashMap::new(),
            timeout_ms,
            clock: 0.0,
        }
    }

    pub fn publish<T: Serialize>(&self, kind: MessageKind, data: &T, target: Target) -> Result<(), BusError> {
        let env = Envelope::new(kind, target, data)?;
        self.transport.post(&env)
    }

    pub fn request<T: Serialize>(
        &mut self,
        kind: MessageKind,
        data: &T,
        target: Target,
    ) -> Result<PendingResponse, BusError> {
        let id = CorrelationId::new();
        let mut env = Envelope::new(kind, target, data)?;
        env.id = Some(id);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            Pending {
                resolve: tx,
                issued_at: self.clock,
            },
        );
        if let Err(e) = self.transport.post(&env) {
            self.pending.remove(&id);
            return Err(e);
        }
        Ok(PendingResponse { id, rx })
    }

    pub fn respond<T: Serialize>(&self, data: &T, target: Target, id: Option<CorrelationId>) -> Result<(), BusError> {
        let mut env = Envelope::new(MessageKind::Response, target, data)?;
        env.id = id;
        self.transport.post(&env)
    }

    /// Handlers run in subscription order for every accepted envelope of
    /// `kind` that response correlation didn't consume.
    pub fn subscribe(&mut self, kind: MessageKind, handler: impl FnMut(&Envelope) + 'static) {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Runs one received envelope through target filtering, response
    /// correlation and subscribed handlers. Returns the envelope when the
    /// owner still has to dispatch it.
    pub fn accept(&mut self, envelope: Envelope, is_authority: bool) -> Option<Envelope> {
        if !envelope.target.accepts(is_authority) {
            return None;
        }
        if envelope.kind == MessageKind::Response
            && let Some(id) = envelope.id
            && let Some(p) = self.pending.remove(&id)
        {
            // The requester may have given up already; that's fine.
            let _ = p.resolve.send(envelope.data);
            return None;
        }
        if let Some(hs) = self.handlers.get_mut(&envelope.kind) {
            for h in hs.iter_mut() {
                h(&envelope);
            }
        }
        Some(envelope)
    }

    /// Advances the bus clock and resolves every request older than the
    /// timeout to `NoResponse`. Returns how many expired.
    pub fn expire(&mut self, now: f64) -> usize {
        self.clock = now;
        let Some(timeout) = self.timeout_ms else {
            return 0;
        };
        let before = self.pending.len();
        self.pending.retain(|id, p| {
            let keep = now - p.issued_at < timeout;
            if !keep {
                debug!("bus: request {id} expired");
            }
            keep
        });
        let expired = before - self.pending.len();
        if expired > 0 {
            warn!("bus: {expired} request(s) got no response");
        }
        expired
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use futures::executor::block_on;
    use futures::FutureExt;

    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<Envelope>>);

    impl Transport for Recorder {
        fn post(&self, envelope: &Envelope) -> Result<(), BusError> {
            self.0.borrow_mut().push(envelope.clone());
            Ok(())
        }
    }

    fn messenger(timeout: Option<f64>) -> (Rc<Recorder>, Messenger) {
        let rec = Rc::new(Recorder::default());
        let bus = Messenger::new(rec.clone(), timeout);
        (rec, bus)
    }

    #[test]
    fn wire_names_match_the_browser_protocol() {
        let env = Envelope::new(MessageKind::WindowClose, Target::Authority, &"abc").unwrap();
        let json = env.to_json().unwrap();
        assert_eq!(json, r#"{"type":"window-close","target":"host","data":"abc"}"#);
        let back = Envelope::from_json(r#"{"type":"engine-update","target":"client","data":[]}"#).unwrap();
        assert_eq!(back.kind, MessageKind::EngineUpdate);
        assert_eq!(back.target, Target::Followers);
    }

    #[test]
    fn target_filtering() {
        let (_, mut bus) = messenger(None);
        let to_host = Envelope::new(MessageKind::WindowUpdate, Target::Authority, &1).unwrap();
        let to_clients = Envelope::new(MessageKind::EngineUpdate, Target::Followers, &1).unwrap();
        let to_all = Envelope::new(MessageKind::WindowClose, Target::All, &1).unwrap();

        assert!(bus.accept(to_host.clone(), false).is_none());
        assert!(bus.accept(to_host, true).is_some());
        assert!(bus.accept(to_clients.clone(), true).is_none());
        assert!(bus.accept(to_clients, false).is_some());
        assert!(bus.accept(to_all.clone(), true).is_some());
        assert!(bus.accept(to_all, false).is_some());
    }

    #[test]
    fn response_resolves_matching_request_only() {
        let (rec, mut bus) = messenger(None);
        let pending = bus.request(MessageKind::WindowInfo, &"who", Target::All).unwrap();
        let id = rec.0.borrow()[0].id.unwrap();
        assert_eq!(pending.id(), id);

        let mut stray = Envelope::new(MessageKind::Response, Target::All, &0).unwrap();
        stray.id = Some(CorrelationId::new());
        assert!(bus.accept(stray, false).is_some());
        assert_eq!(bus.pending_len(), 1);

        let mut reply = Envelope::new(MessageKind::Response, Target::All, &42).unwrap();
        reply.id = Some(id);
        assert!(bus.accept(reply, false).is_none());
        assert_eq!(bus.pending_len(), 0);
        assert_eq!(block_on(pending).unwrap(), Value::from(42));
    }

    #[test]
    fn expired_request_yields_no_response() {
        let (_, mut bus) = messenger(Some(100.0));
        bus.expire(1_000.0);
        let mut pending = bus.request(MessageKind::WindowInfo, &"x", Target::All).unwrap();
        assert!((&mut pending).now_or_never().is_none());
        assert_eq!(bus.expire(1_050.0), 0);
        assert_eq!(bus.expire(1_100.0), 1);
        assert!(matches!(block_on(pending), Err(BusError::NoResponse(_))));
    }

    #[test]
    fn without_timeout_requests_stay_pending() {
        let (_, mut bus) = messenger(None);
        let _pending = bus.request(MessageKind::WindowInfo, &"x", Target::All).unwrap();
        assert_eq!(bus.expire(1e12), 0);
        assert_eq!(bus.pending_len(), 1);
    }

    #[test]
    fn handlers_run_in_subscription_order() {
        let (_, mut bus) = messenger(None);
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = seen.clone();
            bus.subscribe(MessageKind::WindowOpen, move |_| seen.borrow_mut().push(tag));
        }
        let env = Envelope::new(MessageKind::WindowOpen, Target::All, &()).unwrap();
        bus.accept(env, true);
        assert_eq!(*seen.borrow(), vec!["first", "second"]);
    }
}
