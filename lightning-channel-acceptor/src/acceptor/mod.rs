// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The [`ChannelAcceptor`] interface and the acceptors implementing it.
//!
//! An acceptor is a predicate on an [`OpenChannelRequest`]. Acceptors are consulted after a peer's
//! `open_channel` message has been read but before we respond with `accept_channel`, and a
//! `false` verdict causes the channel to be rejected.

use bitcoin::secp256k1::PublicKey;

use core::future::Future;
use core::pin::Pin;

use crate::msgs::{OpenChannel, PendingChannelId};

mod chained;
mod default;
mod rpc;

#[cfg(test)]
mod functional_tests;

pub use chained::ChainedAcceptor;
pub use default::DefaultAcceptor;
pub use rpc::{ChannelAcceptorClient, OpenChannelResponse, RpcAcceptor};

/// A request to open an inbound channel, as handed to each [`ChannelAcceptor`].
///
/// Contains the requesting node's public key along with the `open_channel` message they sent, so
/// that each acceptor can leverage its own decision-making on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenChannelRequest {
	counterparty_node_id: PublicKey,
	open_channel_msg: OpenChannel,
}

impl OpenChannelRequest {
	/// Builds a request for the given peer's `open_channel` message.
	pub fn new(counterparty_node_id: PublicKey, open_channel_msg: OpenChannel) -> Self {
		OpenChannelRequest { counterparty_node_id, open_channel_msg }
	}

	/// The node id of the peer proposing the channel.
	pub fn counterparty_node_id(&self) -> &PublicKey {
		&self.counterparty_node_id
	}

	/// The `open_channel` message the peer sent.
	pub fn open_channel_msg(&self) -> &OpenChannel {
		&self.open_channel_msg
	}

	/// The id the peer picked for the channel while it is being negotiated.
	pub fn pending_channel_id(&self) -> PendingChannelId {
		self.open_channel_msg.pending_channel_id
	}
}

/// The future returned by [`ChannelAcceptor::accept`], resolving to the acceptor's verdict.
pub type AcceptFuture<'a> = Pin<Box<dyn Future<Output = bool> + 'a + Send>>;

/// How a [`ChainedAcceptor`] treats an acceptor it contains.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcceptorRole {
	/// Decides locally and is consulted for every request.
	Local,
	/// Delegates its decisions elsewhere and is only consulted while something is there to
	/// decide. While `client_active` is false it abstains.
	Delegated {
		/// Whether an external decision-maker is currently attached.
		client_active: bool,
	},
	/// Unknown to chain composition. A chain containing such an acceptor rejects every request.
	Unrecognized,
}

/// A predicate on the data contained in an [`OpenChannelRequest`].
pub trait ChannelAcceptor {
	/// Decides whether the channel described by `request` should be accepted.
	///
	/// Rather than failing, implementations which cannot come to a decision should return
	/// `false`.
	fn accept<'a>(&'a self, request: &'a OpenChannelRequest) -> AcceptFuture<'a>;

	/// Describes how a [`ChainedAcceptor`] should consult this acceptor.
	///
	/// Defaults to [`AcceptorRole::Unrecognized`], so acceptors have to opt in to being chained.
	fn role(&self) -> AcceptorRole {
		AcceptorRole::Unrecognized
	}
}
