// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::acceptor::{AcceptFuture, AcceptorRole, ChannelAcceptor, OpenChannelRequest};

/// The default [`ChannelAcceptor`], used when no other acceptors are configured. Accepts every
/// channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultAcceptor;

impl DefaultAcceptor {
	/// Creates a new `DefaultAcceptor`.
	pub fn new() -> Self {
		DefaultAcceptor
	}
}

impl ChannelAcceptor for DefaultAcceptor {
	fn accept<'a>(&'a self, _request: &'a OpenChannelRequest) -> AcceptFuture<'a> {
		Box::pin(core::future::ready(true))
	}

	fn role(&self) -> AcceptorRole {
		AcceptorRole::Local
	}
}
