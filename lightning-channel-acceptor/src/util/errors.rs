// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Error types live here.

use core::fmt;

/// Indicates an error on the client's part, returned by the acceptors' configuration-time API.
///
/// Failures to obtain a channel-open decision are never surfaced this way; those always resolve
/// to a rejection of the channel.
#[derive(Clone, PartialEq, Eq)]
pub enum APIError {
	/// Indicates the API was wholly misused (see err for more). Cases where these can be returned
	/// are documented, but generally indicates some precondition of a function was violated.
	APIMisuseError {
		/// A human-readable error message
		err: String,
	},
	/// An external decision-making client is already registered. Only one may be registered at a
	/// time; the existing registration is left untouched.
	ClientAlreadyRegistered,
	/// The acceptor has not been started, or is being stopped, and so cannot take on a client.
	AcceptorNotRunning,
	/// The client this response was sent from is no longer registered, or the acceptor it was
	/// registered with has been stopped. The response was dropped.
	ClientDisconnected,
}

impl fmt::Debug for APIError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			APIError::APIMisuseError { ref err } => write!(f, "Misuse error: {}", err),
			APIError::ClientAlreadyRegistered => f.write_str("Client already registered"),
			APIError::AcceptorNotRunning => f.write_str("Channel acceptor is not running"),
			APIError::ClientDisconnected => {
				f.write_str("Client is no longer registered with the channel acceptor")
			},
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for APIError {}
