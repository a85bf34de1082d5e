//! In-process identity directory and session router.
//!
//! ```text
//!   initiator                      responder
//!   ─────────                      ─────────
//!   open(from, to, kind)
//!     │  mpsc(cap) ──────────────▶ rx
//!     │  rx ◀────────────────────── mpsc(cap)
//!     └─ IncomingSession{kind} ──▶ inbox of `to`
//! ```
//!
//! Each direction is a bounded channel sized by the initiator's
//! [`SessionConfig::channel_capacity`]; with the default of 1 at most one
//! message is outstanding per direction. Delivery within a session is
//! reliable and ordered. A dropped end reads as a hang-up on the other.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use swapline_types::{
    Party, PartyKey, Result, SessionConfig, SessionId, SwaplineError, constants,
};
use tokio::sync::mpsc;

use crate::messages::{FlowMessage, MessageKind, SessionKind};

/// A session delivered to a responder's inbox.
#[derive(Debug)]
pub struct IncomingSession {
    pub kind: SessionKind,
    pub session: Session,
}

struct Registration {
    party: Party,
    session: SessionConfig,
    inbox: mpsc::Sender<IncomingSession>,
}

/// Directory of registered parties plus the inboxes sessions are routed to.
#[derive(Default)]
pub struct InMemoryNetwork {
    by_key: DashMap<PartyKey, Registration>,
    by_name: DashMap<String, PartyKey>,
}

impl InMemoryNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `party` and return the receiving end of its inbox.
    ///
    /// Sessions `party` answers use the timeout from `session`.
    ///
    /// # Errors
    /// `Configuration` if the name is already taken by another key.
    pub fn register(
        &self,
        party: &Party,
        session: SessionConfig,
    ) -> Result<mpsc::Receiver<IncomingSession>> {
        match self.by_name.entry(party.name.clone()) {
            Entry::Occupied(e) if *e.get() != party.key => {
                return Err(SwaplineError::Configuration(format!(
                    "party name {} is already registered to another key",
                    party.name
                )));
            }
            Entry::Occupied(_) => {}
            Entry::Vacant(e) => {
                e.insert(party.key);
            }
        }
        let (tx, rx) = mpsc::channel(constants::DEFAULT_INBOX_CAPACITY);
        self.by_key.insert(
            party.key,
            Registration {
                party: party.clone(),
                session,
                inbox: tx,
            },
        );
        tracing::debug!(party = %party, key = %party.key, "Party registered");
        Ok(rx)
    }

    /// Resolve a well-known name.
    ///
    /// # Errors
    /// `PeerNotFound` if nobody registered under `name`.
    pub fn party_by_name(&self, name: &str) -> Result<Party> {
        self.by_name
            .get(name)
            .and_then(|key| self.party_by_key(key.value()))
            .ok_or_else(|| SwaplineError::PeerNotFound(name.to_string()))
    }

    #[must_use]
    pub fn party_by_key(&self, key: &PartyKey) -> Option<Party> {
        self.by_key.get(key).map(|r| r.party.clone())
    }

    /// Open a session from `from` to `to` and hand the responder end to
    /// `to`'s inbox.
    ///
    /// # Errors
    /// - `PeerNotFound` if either side is not registered
    /// - `SessionAborted` if `to` is no longer accepting sessions
    pub async fn open(&self, from: &Party, to: &Party, kind: SessionKind) -> Result<Session> {
        let own = self
            .by_key
            .get(&from.key)
            .map(|r| r.session.clone())
            .ok_or_else(|| SwaplineError::PeerNotFound(from.to_string()))?;
        let (inbox, peer_session) = self
            .by_key
            .get(&to.key)
            .map(|r| (r.inbox.clone(), r.session.clone()))
            .ok_or_else(|| SwaplineError::PeerNotFound(to.to_string()))?;

        let capacity = own.channel_capacity.max(1);
        let (to_responder, from_initiator) = mpsc::channel(capacity);
        let (to_initiator, from_responder) = mpsc::channel(capacity);
        let id = SessionId::new();

        let initiator = Session {
            id,
            peer: to.clone(),
            tx: to_responder,
            rx: from_responder,
            timeout: own.timeout(),
        };
        let responder = Session {
            id,
            peer: from.clone(),
            tx: to_initiator,
            rx: from_initiator,
            timeout: peer_session.timeout(),
        };

        inbox
            .send(IncomingSession {
                kind,
                session: responder,
            })
            .await
            .map_err(|_| SwaplineError::SessionAborted {
                reason: format!("{to} is not accepting sessions"),
            })?;
        tracing::debug!(session = %id, from = %from, to = %to, kind = %kind, "Session opened");
        Ok(initiator)
    }
}

/// One end of a bidirectional, ordered conversation with a single peer.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    peer: Party,
    tx: mpsc::Sender<FlowMessage>,
    rx: mpsc::Receiver<FlowMessage>,
    timeout: Duration,
}

impl Session {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn peer(&self) -> &Party {
        &self.peer
    }

    /// Send one message, waiting for channel capacity up to the timeout.
    ///
    /// # Errors
    /// `CounterpartyTimeout` if the peer never makes room, `SessionAborted`
    /// if it hung up.
    pub async fn send(&self, msg: FlowMessage) -> Result<()> {
        let kind = msg.kind();
        match tokio::time::timeout(self.timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(self.hung_up()),
            Err(_) => Err(SwaplineError::CounterpartyTimeout {
                peer: self.peer.to_string(),
                waiting_for: format!("room to send {kind}"),
            }),
        }
    }

    /// Wait for the next message and check it is of the `expected` kind.
    ///
    /// # Errors
    /// - `CounterpartyTimeout` if nothing arrives in time
    /// - `SessionAborted` if the peer aborted or hung up
    /// - `UnexpectedMessage` for any other kind
    pub async fn receive(&mut self, expected: MessageKind) -> Result<FlowMessage> {
        let msg = match tokio::time::timeout(self.timeout, self.rx.recv()).await {
            Ok(Some(msg)) => msg,
            Ok(None) => return Err(self.hung_up()),
            Err(_) => {
                return Err(SwaplineError::CounterpartyTimeout {
                    peer: self.peer.to_string(),
                    waiting_for: expected.to_string(),
                });
            }
        };
        match msg {
            FlowMessage::Abort { reason } if expected != MessageKind::Abort => {
                Err(SwaplineError::SessionAborted { reason })
            }
            msg if msg.kind() == expected => Ok(msg),
            msg => Err(unexpected(expected, &msg)),
        }
    }

    /// Tell the peer we gave up. Never blocks and never fails: if the
    /// channel is full or closed the peer learns from its own timeout or
    /// the hang-up.
    pub fn abort(&self, reason: &str) {
        if self
            .tx
            .try_send(FlowMessage::Abort {
                reason: reason.to_string(),
            })
            .is_err()
        {
            tracing::debug!(session = %self.id, peer = %self.peer, "Abort not delivered");
        }
    }

    fn hung_up(&self) -> SwaplineError {
        SwaplineError::SessionAborted {
            reason: format!("{} hung up", self.peer),
        }
    }
}

/// The error for a message that arrived where `expected` should have.
pub(crate) fn unexpected(expected: MessageKind, actual: &FlowMessage) -> SwaplineError {
    SwaplineError::UnexpectedMessage {
        expected: expected.to_string(),
        actual: actual.kind().to_string(),
    }
}
