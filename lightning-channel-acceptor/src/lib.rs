// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Gating of inbound channel opens for nodes running in Tokio environments.
//!
//! Every `open_channel` message received from a peer is wrapped in an [`OpenChannelRequest`] and
//! handed to the [`ChannelAcceptor`] installed as the node's policy, which renders an
//! accept/reject verdict before any funds are committed.
//!
//! Three acceptors are provided:
//!  * [`DefaultAcceptor`] accepts everything and is the fallback when nothing stricter is
//!    configured,
//!  * [`RpcAcceptor`] forwards each request to a single external controller (usually reached over
//!    an RPC stream) and waits, for a bounded time, for its decision,
//!  * [`ChainedAcceptor`] combines any number of acceptors, requiring all of them to accept.
//!
//! A typical node installs a [`ChainedAcceptor`] holding a [`DefaultAcceptor`] and an
//! [`RpcAcceptor`]. While no controller is registered the [`RpcAcceptor`] abstains and the chain
//! behaves like the default policy; once one registers, every request waits for its answer.
//!
//! Any failure to obtain a delegated decision (no controller, a timeout, shutdown) results in the
//! channel being rejected, never in it being silently accepted.
//!
//! [`OpenChannelRequest`]: acceptor::OpenChannelRequest
//! [`ChannelAcceptor`]: acceptor::ChannelAcceptor
//! [`DefaultAcceptor`]: acceptor::DefaultAcceptor
//! [`RpcAcceptor`]: acceptor::RpcAcceptor
//! [`ChainedAcceptor`]: acceptor::ChainedAcceptor

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

#![deny(missing_docs)]
#![deny(unsafe_code)]

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

#[macro_use]
pub mod util;
pub mod msgs;
pub mod acceptor;
