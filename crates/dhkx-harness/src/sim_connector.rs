//! Fault-injecting in-memory transport.
//!
//! [`SimNetwork`] owns the [`SimPeer`] and a script of faults. Tests keep a
//! clone of the network to inject faults and inspect traffic, while the
//! coordinator dials it through a [`SimConnector`].
//!
//! Faults are consumed in order: each dial pops one [`DialFault`], each call
//! pops one [`CallFault`] queued for its method. With nothing queued the call
//! reaches the peer.

use std::{
    collections::{HashMap, VecDeque},
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use dhkx_core::{ConnectError, Connector, Endpoint, RpcChannel, RpcError, TlsSettings};
use dhkx_crypto::DomainParameters;
use dhkx_proto::{ErrorReply, Method, Request, Response, SendResult};

use crate::sim_peer::{Delivery, SimPeer};

/// Failure for one connect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialFault {
    /// Peer does not answer (retried)
    Unreachable,
    /// Trust material cannot be loaded (fatal)
    BadCredentials,
}

/// Failure for one call of a given method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallFault {
    /// Never reply; the caller's deadline decides
    Hang,
    /// Transport breaks before the reply
    ConnectionLost,
    /// Peer answers with an error reply
    Remote(ErrorReply),
    /// Peer answers an exchange with a different sequence number
    WrongSequence,
    /// Peer answers an exchange with an out-of-range public key
    BadPublicKey,
    /// Peer answers a send with this result code without decrypting
    Reject(i32),
}

#[derive(Default)]
struct Script {
    dial_faults: VecDeque<DialFault>,
    call_faults: HashMap<Method, VecDeque<CallFault>>,
    calls: Vec<Method>,
    dials: u32,
    closes: u32,
}

struct NetworkState {
    peer: SimPeer,
    script: Script,
}

/// Shared simulated network around one peer.
#[derive(Clone)]
pub struct SimNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl SimNetwork {
    /// Network whose peer uses `params` and randomness from `peer_seed`.
    pub fn new(params: Arc<DomainParameters>, peer_seed: u64) -> Self {
        let state = NetworkState { peer: SimPeer::new(params, peer_seed), script: Script::default() };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Connector dialing this network.
    pub fn connector(&self) -> SimConnector {
        SimConnector { network: self.clone() }
    }

    /// Fail the next `count` dials with `fault`.
    pub fn fail_dials(&self, fault: &DialFault, count: usize) {
        let mut state = self.lock();
        state.script.dial_faults.extend(std::iter::repeat_n(fault.clone(), count));
    }

    /// Queue `fault` for the next unfaulted call of `method`.
    pub fn inject(&self, method: Method, fault: CallFault) {
        self.lock().script.call_faults.entry(method).or_default().push_back(fault);
    }

    /// Every call the client made, in order, faulted or not.
    pub fn calls(&self) -> Vec<Method> {
        self.lock().script.calls.clone()
    }

    /// Number of calls made for `method`.
    pub fn calls_of(&self, method: Method) -> usize {
        self.lock().script.calls.iter().filter(|&&m| m == method).count()
    }

    /// Connect attempts, successful or not.
    pub fn dials(&self) -> u32 {
        self.lock().script.dials
    }

    /// Channels closed by the client.
    pub fn closes(&self) -> u32 {
        self.lock().script.closes
    }

    /// Messages the peer decrypted.
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.lock().peer.deliveries().to_vec()
    }

    fn lock(&self) -> MutexGuard<'_, NetworkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dial(&self) -> Result<(), ConnectError> {
        let mut state = self.lock();
        state.script.dials += 1;

        match state.script.dial_faults.pop_front() {
            None => Ok(()),
            Some(DialFault::Unreachable) => {
                Err(ConnectError::Unreachable("simulated peer unreachable".to_string()))
            },
            Some(DialFault::BadCredentials) => {
                Err(ConnectError::Credentials("simulated trust store unreadable".to_string()))
            },
        }
    }

    /// Decide the fate of one call. Runs under the lock and never awaits.
    fn step(&self, request: Request) -> Step {
        let mut state = self.lock();
        let method = request.method();
        state.script.calls.push(method);

        let fault = state.script.call_faults.get_mut(&method).and_then(VecDeque::pop_front);
        match fault {
            None => Step::Reply(state.peer.handle(request)),
            Some(CallFault::Hang) => Step::Hang,
            Some(CallFault::ConnectionLost) => {
                Step::Fail(RpcError::ConnectionLost("simulated stream reset".to_string()))
            },
            Some(CallFault::Remote(reply)) => Step::Reply(Response::Error(reply)),
            Some(CallFault::WrongSequence) => match state.peer.handle(request) {
                Response::PublicKey(mut answer) => {
                    answer.sequence += 1;
                    Step::Reply(Response::PublicKey(answer))
                },
                other => Step::Reply(other),
            },
            Some(CallFault::BadPublicKey) => match request {
                Request::ExchangePublicKey(offer) => {
                    Step::Reply(Response::PublicKey(dhkx_proto::PublicKeyMessage {
                        sequence: offer.sequence,
                        public_key: vec![1],
                    }))
                },
                other => Step::Reply(state.peer.handle(other)),
            },
            Some(CallFault::Reject(result_code)) => {
                Step::Reply(Response::SendResult(SendResult { result_code }))
            },
        }
    }
}

enum Step {
    Reply(Response),
    Fail(RpcError),
    Hang,
}

/// [`Connector`] into a [`SimNetwork`].
pub struct SimConnector {
    network: SimNetwork,
}

impl Connector for SimConnector {
    type Channel = SimChannel;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        _tls: &TlsSettings,
    ) -> impl Future<Output = Result<SimChannel, ConnectError>> + Send {
        tracing::trace!("sim dial {endpoint}");
        let result =
            self.network.dial().map(|()| SimChannel { network: self.network.clone(), open: true });
        std::future::ready(result)
    }
}

/// Channel produced by [`SimConnector`].
pub struct SimChannel {
    network: SimNetwork,
    open: bool,
}

impl RpcChannel for SimChannel {
    fn call(&mut self, request: Request) -> impl Future<Output = Result<Response, RpcError>> + Send {
        let step = if self.open {
            self.network.step(request)
        } else {
            Step::Fail(RpcError::ConnectionLost("channel closed".to_string()))
        };

        async move {
            match step {
                Step::Reply(response) => Ok(response),
                Step::Fail(err) => Err(err),
                Step::Hang => std::future::pending().await,
            }
        }
    }

    fn close(&mut self) {
        if std::mem::replace(&mut self.open, false) {
            self.network.lock().script.closes += 1;
        }
    }
}
