// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::acceptor::{AcceptFuture, AcceptorRole, ChannelAcceptor, OpenChannelRequest};
use crate::util::logger::{Logger, WithContext};

use core::ops::Deref;
use std::sync::Arc;

/// A [`ChannelAcceptor`] representing the conjunction of the acceptors it holds.
///
/// Acceptors are consulted in the order they were added and a channel is only accepted if none
/// of them rejects it. Every acceptor is consulted for every request, even once an earlier one
/// has rejected, so that all of them observe the same stream of requests.
///
/// A [`AcceptorRole::Delegated`] acceptor with no client attached abstains, rather than holding
/// each request for its full timeout. An acceptor with [`AcceptorRole::Unrecognized`] is never
/// consulted and causes every request to be rejected.
pub struct ChainedAcceptor<L: Deref>
where
	L::Target: Logger,
{
	acceptors: Vec<Arc<dyn ChannelAcceptor + Send + Sync>>,
	logger: L,
}

impl<L: Deref> ChainedAcceptor<L>
where
	L::Target: Logger,
{
	/// Creates an empty chain, which accepts everything until acceptors are added.
	pub fn new(logger: L) -> Self {
		Self::with_acceptors(Vec::new(), logger)
	}

	/// Creates a chain evaluating the given acceptors, in order.
	pub fn with_acceptors(acceptors: Vec<Arc<dyn ChannelAcceptor + Send + Sync>>, logger: L) -> Self {
		ChainedAcceptor { acceptors, logger }
	}

	/// Appends an acceptor to the end of the chain.
	pub fn add_acceptor(&mut self, acceptor: Arc<dyn ChannelAcceptor + Send + Sync>) {
		self.acceptors.push(acceptor);
	}

	/// The number of acceptors in the chain.
	pub fn len(&self) -> usize {
		self.acceptors.len()
	}

	/// Whether the chain holds no acceptors.
	pub fn is_empty(&self) -> bool {
		self.acceptors.is_empty()
	}

	async fn accept_all(&self, request: &OpenChannelRequest) -> bool {
		let logger = WithContext::from(
			&self.logger, Some(*request.counterparty_node_id()), Some(request.pending_channel_id()),
		);

		let mut result = true;
		let mut saw_unrecognized = false;
		for (idx, acceptor) in self.acceptors.iter().enumerate() {
			match acceptor.role() {
				AcceptorRole::Delegated { client_active: false } => {
					log_trace!(logger, "Skipping acceptor {} as it has no client to delegate to", idx);
					continue;
				},
				AcceptorRole::Unrecognized => {
					log_error!(logger, "Acceptor {} has an unrecognized role, rejecting the channel", idx);
					saw_unrecognized = true;
					continue;
				},
				AcceptorRole::Local | AcceptorRole::Delegated { client_active: true } => {},
			}

			if !acceptor.accept(request).await {
				log_debug!(logger, "Acceptor {} rejected the channel", idx);
				result = false;
			}
		}

		result && !saw_unrecognized
	}
}

impl<L: Deref + Send + Sync> ChannelAcceptor for ChainedAcceptor<L>
where
	L::Target: Logger,
{
	fn accept<'a>(&'a self, request: &'a OpenChannelRequest) -> AcceptFuture<'a> {
		Box::pin(self.accept_all(request))
	}

	fn role(&self) -> AcceptorRole {
		AcceptorRole::Local
	}
}
