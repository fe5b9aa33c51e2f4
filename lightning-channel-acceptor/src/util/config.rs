// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! User-configurable settings applied by the channel acceptors.

use core::time::Duration;

/// The default time [`RpcAcceptor`] waits for its external client to decide on a channel open
/// before rejecting it.
///
/// [`RpcAcceptor`]: crate::acceptor::RpcAcceptor
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(15);

/// Configuration for the channel acceptors.
///
/// `Default::default()` provides sane defaults.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChannelAcceptorConfig {
	/// How long a delegated channel-open decision may take, from the moment the request is handed
	/// to the [`RpcAcceptor`] until the external client's answer arrives. If no answer arrives in
	/// time the channel is rejected.
	///
	/// The remote peer is kept waiting for our `accept_channel` for this long, so it should stay
	/// well below the peer's own negotiation timeout.
	///
	/// Default value: [`DEFAULT_RPC_TIMEOUT`] (15 seconds).
	///
	/// [`RpcAcceptor`]: crate::acceptor::RpcAcceptor
	pub rpc_timeout: Duration,
}

impl Default for ChannelAcceptorConfig {
	fn default() -> Self {
		ChannelAcceptorConfig { rpc_timeout: DEFAULT_RPC_TIMEOUT }
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_timeout_is_fifteen_seconds() {
		assert_eq!(ChannelAcceptorConfig::default().rpc_timeout, Duration::from_secs(15));
	}
}
