// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The RPC-controlled [`ChannelAcceptor`], which hands each decision to an external client.

use crate::acceptor::{AcceptFuture, AcceptorRole, ChannelAcceptor, OpenChannelRequest};
use crate::msgs::PendingChannelId;
use crate::util::config::ChannelAcceptorConfig;
use crate::util::errors::APIError;
use crate::util::logger::{Logger, WithContext};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use core::fmt;
use core::mem;
use core::ops::Deref;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// How many requests may queue up for the dispatch task before `accept` callers wait on it.
const DISPATCH_QUEUE_DEPTH: usize = 32;

/// How many requests (resp. responses) may queue up in each direction between the dispatch task
/// and the client.
const CLIENT_QUEUE_DEPTH: usize = 32;

/// A decision on a channel open, sent by the client in response to an [`OpenChannelRequest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpenChannelResponse {
	/// The pending channel id of the request this decides on, see
	/// [`OpenChannelRequest::pending_channel_id`].
	pub pending_channel_id: PendingChannelId,
	/// Whether the channel should be accepted.
	pub accept: bool,
}

/// The handle an external client uses to decide on channel opens on behalf of an
/// [`RpcAcceptor`], as returned by [`RpcAcceptor::register_client`].
///
/// The client should answer every request it receives via [`Self::next_request`] with a
/// [`Self::respond`] call, within the acceptor's configured timeout. Once the client is
/// unregistered, or the acceptor is stopped, the handle is closed and no further requests are
/// delivered.
///
/// Dropping the handle unregisters the client.
pub struct ChannelAcceptorClient {
	requests: mpsc::Receiver<OpenChannelRequest>,
	responses: mpsc::Sender<OpenChannelResponse>,
	// The sending side lives in the acceptor's client slot and is dropped on unregistration.
	closed: watch::Receiver<()>,
}

impl ChannelAcceptorClient {
	/// Waits for the next channel open to decide on.
	///
	/// Returns `None` once this client has been unregistered or the acceptor stopped.
	pub async fn next_request(&mut self) -> Option<OpenChannelRequest> {
		if self.is_closed() {
			return None;
		}
		tokio::select! {
			biased;
			_ = self.closed.changed() => None,
			request = self.requests.recv() => request,
		}
	}

	/// Hands a decision back to the acceptor.
	///
	/// Responses for requests which have already timed out, or which were never sent, are
	/// silently dropped by the acceptor. A response accepted here is still applied if the client
	/// is unregistered right after. Fails with [`APIError::ClientDisconnected`] if this client is
	/// no longer registered.
	pub async fn respond(&self, response: OpenChannelResponse) -> Result<(), APIError> {
		if self.is_closed() {
			return Err(APIError::ClientDisconnected);
		}
		self.responses.send(response).await.map_err(|_| APIError::ClientDisconnected)
	}

	/// Whether this client has been unregistered or its acceptor stopped.
	pub fn is_closed(&self) -> bool {
		self.closed.has_changed().is_err()
	}
}

/// Why a delegated decision could not be obtained. Each of these results in a rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DelegationFailure {
	NotRunning,
	NoActiveClient,
	DuplicatePendingChannelId,
	Timeout,
	ShuttingDown,
}

impl fmt::Display for DelegationFailure {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Self::NotRunning => f.write_str("the acceptor is not running"),
			Self::NoActiveClient => f.write_str("no active client"),
			Self::DuplicatePendingChannelId => {
				f.write_str("a request with the same pending channel id is already awaiting a decision")
			},
			Self::Timeout => f.write_str("timed out waiting for the client"),
			Self::ShuttingDown => f.write_str("the acceptor is shutting down"),
		}
	}
}

enum ClientSlot {
	Vacant,
	Active {
		id: u64,
		// Dropping this closes the client's handle and its link to the dispatch task.
		closed: watch::Sender<()>,
	},
}

struct PendingDecision {
	seq: u64,
	decision_tx: oneshot::Sender<bool>,
}

/// Everything `accept` callers and the dispatch task share, behind a single lock.
struct DecisionState {
	client: ClientSlot,
	pending: HashMap<PendingChannelId, PendingDecision>,
	next_seq: u64,
	next_client_id: u64,
}

struct RpcAcceptorInner<L: Deref>
where
	L::Target: Logger,
{
	config: ChannelAcceptorConfig,
	logger: L,
	state: Mutex<DecisionState>,
}

impl<L: Deref> RpcAcceptorInner<L>
where
	L::Target: Logger,
{
	fn resolve_response(&self, response: OpenChannelResponse) {
		let pending = self.state.lock().unwrap().pending.remove(&response.pending_channel_id);
		let logger = WithContext::from(&self.logger, None, Some(response.pending_channel_id));
		match pending {
			Some(pending) => {
				// The caller may have given up in the meantime, in which case nobody is listening.
				let _ = pending.decision_tx.send(response.accept);
			},
			None => {
				log_debug!(logger, "Discarding client response for a request which is not awaiting a decision");
			},
		}
	}

	/// Resolves the responses a departing client managed to send before it went away.
	fn resolve_queued_responses(&self, responses: &mut mpsc::Receiver<OpenChannelResponse>) {
		while let Ok(response) = responses.try_recv() {
			self.resolve_response(response);
		}
	}

	fn reject_undelivered(&self, pending_channel_id: PendingChannelId, seq: u64) {
		let mut state = self.state.lock().unwrap();
		if state.pending.get(&pending_channel_id).map(|pending| pending.seq) == Some(seq) {
			if let Some(pending) = state.pending.remove(&pending_channel_id) {
				let _ = pending.decision_tx.send(false);
			}
		}
	}

	fn vacate_client_slot(&self, client_id: u64) {
		let mut state = self.state.lock().unwrap();
		if let ClientSlot::Active { id, .. } = state.client {
			if id == client_id {
				state.client = ClientSlot::Vacant;
			}
		}
	}
}

/// Removes an `accept` call's entry from the pending table when the call completes, however it
/// completes.
struct PendingEntry<'a> {
	state: &'a Mutex<DecisionState>,
	pending_channel_id: PendingChannelId,
	seq: u64,
}

impl Drop for PendingEntry<'_> {
	fn drop(&mut self) {
		let mut state = self.state.lock().unwrap();
		// The dispatch task removes entries it resolves, after which the id may be reused.
		if state.pending.get(&self.pending_channel_id).map(|pending| pending.seq) == Some(self.seq) {
			state.pending.remove(&self.pending_channel_id);
		}
	}
}

struct DispatchedRequest {
	request: OpenChannelRequest,
	seq: u64,
}

/// The dispatch task's side of a registered client.
struct ClientLink {
	id: u64,
	requests: mpsc::Sender<OpenChannelRequest>,
	responses: mpsc::Receiver<OpenChannelResponse>,
	closed: watch::Receiver<()>,
}

enum ForwardOutcome {
	Delivered,
	ClientUnavailable,
	Quit,
}

impl ClientLink {
	/// Hands a request to the client, resolving any responses which arrive in the meantime so that
	/// a client blocked on sending them cannot stall us.
	async fn forward<L: Deref>(
		&mut self, dispatched: DispatchedRequest, quit: &mut watch::Receiver<()>,
		inner: &RpcAcceptorInner<L>,
	) -> ForwardOutcome
	where
		L::Target: Logger,
	{
		let DispatchedRequest { request, seq } = dispatched;
		let pending_channel_id = request.pending_channel_id();
		let send = self.requests.send(request);
		tokio::pin!(send);
		loop {
			tokio::select! {
				biased;
				_ = quit.changed() => return ForwardOutcome::Quit,
				_ = self.closed.changed() => break,
				sent = &mut send => {
					if sent.is_ok() {
						return ForwardOutcome::Delivered;
					}
					break;
				},
				response = self.responses.recv() => match response {
					Some(response) => inner.resolve_response(response),
					None => break,
				},
			}
		}
		inner.resolve_queued_responses(&mut self.responses);
		// The request never reached the client, so nobody will answer it.
		inner.reject_undelivered(pending_channel_id, seq);
		ForwardOutcome::ClientUnavailable
	}
}

enum DispatchEvent {
	Quit,
	NewClient(ClientLink),
	ClientClosed,
	ClientDropped,
	Response(OpenChannelResponse),
	Request(DispatchedRequest),
}

/// Shuttles requests from `accept` callers to the client and its decisions back, for as long as
/// the acceptor is running.
async fn process_requests<L: Deref + Send + Sync + 'static>(
	inner: Arc<RpcAcceptorInner<L>>, mut dispatch_rx: mpsc::Receiver<DispatchedRequest>,
	mut link_rx: mpsc::UnboundedReceiver<ClientLink>, mut quit: watch::Receiver<()>,
) where
	L::Target: Logger,
{
	let mut client: Option<ClientLink> = None;
	loop {
		let event = match client.as_mut() {
			Some(link) => tokio::select! {
				biased;
				_ = quit.changed() => DispatchEvent::Quit,
				new_link = link_rx.recv() => new_link.map_or(DispatchEvent::Quit, DispatchEvent::NewClient),
				_ = link.closed.changed() => DispatchEvent::ClientClosed,
				response = link.responses.recv() => response.map_or(DispatchEvent::ClientDropped, DispatchEvent::Response),
				request = dispatch_rx.recv() => request.map_or(DispatchEvent::Quit, DispatchEvent::Request),
			},
			// With no client there is nothing to poll on its behalf, so we sleep until one
			// registers, a request needs rejecting, or we are told to quit.
			None => tokio::select! {
				biased;
				_ = quit.changed() => DispatchEvent::Quit,
				new_link = link_rx.recv() => new_link.map_or(DispatchEvent::Quit, DispatchEvent::NewClient),
				request = dispatch_rx.recv() => request.map_or(DispatchEvent::Quit, DispatchEvent::Request),
			},
		};

		match event {
			DispatchEvent::Quit => break,
			DispatchEvent::NewClient(link) => {
				log_debug!(inner.logger, "Forwarding channel open requests to client {}", link.id);
				if let Some(mut previous) = client.replace(link) {
					inner.resolve_queued_responses(&mut previous.responses);
				}
			},
			DispatchEvent::ClientClosed => {
				if let Some(mut link) = client.take() {
					log_debug!(inner.logger, "Client {} was unregistered", link.id);
					inner.resolve_queued_responses(&mut link.responses);
				}
			},
			DispatchEvent::ClientDropped => {
				if let Some(link) = client.take() {
					log_info!(inner.logger, "Client {} went away without unregistering", link.id);
					inner.vacate_client_slot(link.id);
				}
			},
			DispatchEvent::Response(response) => inner.resolve_response(response),
			DispatchEvent::Request(dispatched) => {
				let logger = WithContext::from(
					&inner.logger, Some(*dispatched.request.counterparty_node_id()),
					Some(dispatched.request.pending_channel_id()),
				);
				match client.as_mut() {
					Some(link) => {
						let client_id = link.id;
						match link.forward(dispatched, &mut quit, &*inner).await {
							ForwardOutcome::Delivered => {
								log_trace!(logger, "Forwarded channel open request to client {}", client_id);
							},
							ForwardOutcome::ClientUnavailable => {
								log_debug!(logger, "Client {} went away before it could receive the channel open request", client_id);
								client = None;
								inner.vacate_client_slot(client_id);
							},
							ForwardOutcome::Quit => break,
						}
					},
					None => {
						log_debug!(logger, "No client to forward the channel open request to");
						inner.reject_undelivered(dispatched.request.pending_channel_id(), dispatched.seq);
					},
				}
			},
		}
	}
	log_debug!(inner.logger, "Channel acceptor dispatch task exiting");
}

struct RunningState {
	dispatch_tx: mpsc::Sender<DispatchedRequest>,
	link_tx: mpsc::UnboundedSender<ClientLink>,
	// Never written to, dropping it tells the dispatch task and every waiting `accept` call to
	// give up.
	quit: watch::Sender<()>,
	handle: JoinHandle<()>,
}

/// A [`ChannelAcceptor`] which delegates each decision to a single external client, usually an
/// RPC streaming client.
///
/// Each request is handed to the client registered via [`Self::register_client`] and the
/// acceptor then waits for the client's [`OpenChannelResponse`] carrying the request's pending
/// channel id. Requests are rejected if no client is registered, if no answer arrives within
/// [`ChannelAcceptorConfig::rpc_timeout`], or if the acceptor is stopped while waiting.
///
/// Responses are dispatched by a background task on the Tokio runtime [`Self::start`] is called
/// from, which runs until [`Self::stop`] is called or the acceptor is dropped.
///
/// Only one client may be registered at a time.
///
/// ## Usage Example:
///
/// ```ignore
/// let rpc_acceptor = Arc::new(RpcAcceptor::new(ChannelAcceptorConfig::default(), Arc::clone(&logger)));
/// rpc_acceptor.start()?;
///
/// let chained = ChainedAcceptor::with_acceptors(vec![
/// 	Arc::new(DefaultAcceptor::new()),
/// 	Arc::clone(&rpc_acceptor) as Arc<dyn ChannelAcceptor + Send + Sync>,
/// ], Arc::clone(&logger));
///
/// // Once a controller connects over RPC:
/// let mut client = rpc_acceptor.register_client()?;
/// while let Some(request) = client.next_request().await {
/// 	let accept = request.open_channel_msg().funding_satoshis >= 100_000;
/// 	let response = OpenChannelResponse { pending_channel_id: request.pending_channel_id(), accept };
/// 	client.respond(response).await?;
/// }
/// ```
pub struct RpcAcceptor<L: Deref + Send + Sync + 'static>
where
	L::Target: Logger,
{
	inner: Arc<RpcAcceptorInner<L>>,
	running: Mutex<Option<RunningState>>,
}

impl<L: Deref + Send + Sync + 'static> RpcAcceptor<L>
where
	L::Target: Logger,
{
	/// Creates a new `RpcAcceptor`. It rejects every request until [`Self::start`] has been called
	/// and a client registered.
	pub fn new(config: ChannelAcceptorConfig, logger: L) -> Self {
		let state = DecisionState {
			client: ClientSlot::Vacant,
			pending: HashMap::new(),
			next_seq: 0,
			next_client_id: 0,
		};
		RpcAcceptor {
			inner: Arc::new(RpcAcceptorInner { config, logger, state: Mutex::new(state) }),
			running: Mutex::new(None),
		}
	}

	/// Spawns the background task dispatching requests to, and responses from, the client.
	///
	/// Must be called from within a Tokio runtime. Calling it while already started does nothing;
	/// after [`Self::stop`] it may be called again.
	pub fn start(&self) -> Result<(), APIError> {
		let mut running = self.running.lock().unwrap();
		if running.is_some() {
			return Ok(());
		}
		let runtime = tokio::runtime::Handle::try_current().map_err(|_| APIError::APIMisuseError {
			err: "RpcAcceptor::start must be called from within a Tokio runtime".to_owned(),
		})?;

		let (dispatch_tx, dispatch_rx) = mpsc::channel(DISPATCH_QUEUE_DEPTH);
		let (link_tx, link_rx) = mpsc::unbounded_channel();
		let (quit, quit_rx) = watch::channel(());
		let handle = runtime.spawn(process_requests(Arc::clone(&self.inner), dispatch_rx, link_rx, quit_rx));
		*running = Some(RunningState { dispatch_tx, link_tx, quit, handle });

		log_info!(self.inner.logger, "Started RPC channel acceptor");
		Ok(())
	}

	/// Stops the background task and waits for it to exit.
	///
	/// Any registered client is unregistered and every `accept` call still waiting for a decision
	/// resolves to a rejection. Calling it while not started does nothing.
	pub async fn stop(&self) {
		let handle = {
			let mut running = self.running.lock().unwrap();
			let RunningState { dispatch_tx, link_tx, quit, handle } = match running.take() {
				Some(running) => running,
				None => return,
			};
			// Clear up while still holding the lifecycle lock, so that a concurrent restart
			// cannot have registered a client we'd drop here.
			let mut state = self.inner.state.lock().unwrap();
			state.client = ClientSlot::Vacant;
			state.pending.clear();
			mem::drop((dispatch_tx, link_tx, quit));
			handle
		};

		if let Err(e) = handle.await {
			log_error!(self.inner.logger, "RPC channel acceptor dispatch task failed: {}", e);
		}
		log_info!(self.inner.logger, "Stopped RPC channel acceptor");
	}

	/// Registers the external client all decisions are delegated to from now on.
	///
	/// Fails with [`APIError::ClientAlreadyRegistered`] if a client is already registered, which
	/// is left undisturbed, and with [`APIError::AcceptorNotRunning`] if the acceptor has not been
	/// started.
	pub fn register_client(&self) -> Result<ChannelAcceptorClient, APIError> {
		let running = self.running.lock().unwrap();
		let link_tx = match running.as_ref() {
			Some(running) => &running.link_tx,
			None => return Err(APIError::AcceptorNotRunning),
		};

		let mut state = self.inner.state.lock().unwrap();
		if let ClientSlot::Active { id, .. } = state.client {
			log_warn!(self.inner.logger, "Refusing to register a second client while client {} is registered", id);
			return Err(APIError::ClientAlreadyRegistered);
		}

		let id = state.next_client_id;
		state.next_client_id += 1;
		let (request_tx, request_rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
		let (response_tx, response_rx) = mpsc::channel(CLIENT_QUEUE_DEPTH);
		let (closed_tx, closed_rx) = watch::channel(());
		let link = ClientLink { id, requests: request_tx, responses: response_rx, closed: closed_rx.clone() };
		if link_tx.send(link).is_err() {
			return Err(APIError::AcceptorNotRunning);
		}
		state.client = ClientSlot::Active { id, closed: closed_tx };

		log_info!(self.inner.logger, "Registered channel acceptor client {}", id);
		Ok(ChannelAcceptorClient { requests: request_rx, responses: response_tx, closed: closed_rx })
	}

	/// Unregisters the current client, closing its [`ChannelAcceptorClient`].
	///
	/// Requests it has already received but not answered are rejected once they time out. Does
	/// nothing if no client is registered.
	pub fn unregister_client(&self) {
		let mut state = self.inner.state.lock().unwrap();
		match mem::replace(&mut state.client, ClientSlot::Vacant) {
			ClientSlot::Active { id, .. } => {
				log_info!(self.inner.logger, "Unregistered channel acceptor client {}", id);
			},
			ClientSlot::Vacant => {
				log_debug!(self.inner.logger, "No channel acceptor client to unregister");
			},
		}
	}

	/// Whether a client is registered to delegate decisions to.
	///
	/// Composing acceptors should check this before calling [`ChannelAcceptor::accept`], as
	/// without a client every request is rejected.
	pub fn is_client_active(&self) -> bool {
		matches!(self.inner.state.lock().unwrap().client, ClientSlot::Active { .. })
	}

	#[cfg(test)]
	pub(crate) fn pending_decisions(&self) -> usize {
		self.inner.state.lock().unwrap().pending.len()
	}

	async fn delegate(&self, request: &OpenChannelRequest) -> Result<bool, DelegationFailure> {
		let (dispatch_tx, mut quit) = match self.running.lock().unwrap().as_ref() {
			Some(running) => (running.dispatch_tx.clone(), running.quit.subscribe()),
			None => return Err(DelegationFailure::NotRunning),
		};

		let pending_channel_id = request.pending_channel_id();
		let (decision_tx, decision_rx) = oneshot::channel();
		let seq = {
			let mut state = self.inner.state.lock().unwrap();
			if let ClientSlot::Vacant = state.client {
				return Err(DelegationFailure::NoActiveClient);
			}
			if state.pending.contains_key(&pending_channel_id) {
				return Err(DelegationFailure::DuplicatePendingChannelId);
			}
			let seq = state.next_seq;
			state.next_seq += 1;
			state.pending.insert(pending_channel_id, PendingDecision { seq, decision_tx });
			seq
		};
		let _entry = PendingEntry { state: &self.inner.state, pending_channel_id, seq };

		let dispatched = DispatchedRequest { request: request.clone(), seq };
		let decision = async move {
			dispatch_tx.send(dispatched).await.map_err(|_| DelegationFailure::ShuttingDown)?;
			// The sender is only dropped without a decision when the table is cleared on stop.
			decision_rx.await.map_err(|_| DelegationFailure::ShuttingDown)
		};

		tokio::select! {
			biased;
			_ = quit.changed() => Err(DelegationFailure::ShuttingDown),
			res = tokio::time::timeout(self.inner.config.rpc_timeout, decision) => {
				res.unwrap_or(Err(DelegationFailure::Timeout))
			},
		}
	}
}

impl<L: Deref + Send + Sync + 'static> ChannelAcceptor for RpcAcceptor<L>
where
	L::Target: Logger,
{
	fn accept<'a>(&'a self, request: &'a OpenChannelRequest) -> AcceptFuture<'a> {
		Box::pin(async move {
			let logger = WithContext::from(
				&self.inner.logger, Some(*request.counterparty_node_id()), Some(request.pending_channel_id()),
			);
			match self.delegate(request).await {
				Ok(accept) => {
					log_debug!(logger, "Client {} the channel", if accept { "accepted" } else { "rejected" });
					accept
				},
				Err(failure @ (DelegationFailure::Timeout | DelegationFailure::DuplicatePendingChannelId)) => {
					log_warn!(logger, "Rejecting channel as {}", failure);
					false
				},
				Err(failure) => {
					log_debug!(logger, "Rejecting channel as {}", failure);
					false
				},
			}
		})
	}

	fn role(&self) -> AcceptorRole {
		AcceptorRole::Delegated { client_active: self.is_client_active() }
	}
}
