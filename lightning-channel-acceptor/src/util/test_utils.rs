// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::acceptor::{
	AcceptFuture, AcceptorRole, ChannelAcceptor, ChannelAcceptorClient, OpenChannelRequest,
	OpenChannelResponse,
};
use crate::msgs::{OpenChannel, PendingChannelId};
use crate::util::config::ChannelAcceptorConfig;
use crate::util::logger::{Level, Logger, Record};

use bitcoin::constants::ChainHash;
use bitcoin::Network;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct TestLogger {
	level: Level,
	id: String,
	pub lines: Mutex<HashMap<(String, String), usize>>,
	pub context: Mutex<HashMap<(String, Option<PublicKey>, Option<PendingChannelId>), usize>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		Self::with_id("".to_owned())
	}
	pub fn with_id(id: String) -> TestLogger {
		TestLogger {
			level: Level::Trace,
			id,
			lines: Mutex::new(HashMap::new()),
			context: Mutex::new(HashMap::new()),
		}
	}
	pub fn assert_log(&self, module: &str, line: String, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		assert_eq!(log_entries.get(&(module.to_string(), line)), Some(&count));
	}

	/// Search for the number of occurrence of the logged lines which
	/// 1. belongs to the specified module and
	/// 2. contains `line` in it.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		assert_eq!(self.count_log_contains(module, line), count);
	}

	pub fn count_log_contains(&self, module: &str, line: &str) -> usize {
		let log_entries = self.lines.lock().unwrap();
		log_entries.iter().filter(|&(&(ref m, ref l), _c)| {
			m == module && l.contains(line)
		}).map(|(_, c)| { c }).sum()
	}

	/// Search for the number of occurrences of logged lines which
	/// 1. belong to the specified module and
	/// 2. match the given peer and pending channel context.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_context_contains(
		&self, module: &str, peer_id: Option<PublicKey>, pending_channel_id: Option<PendingChannelId>,
		count: usize,
	) {
		let context_entries = self.context.lock().unwrap();
		let l = context_entries.get(&(module.to_string(), peer_id, pending_channel_id)).unwrap();
		assert_eq!(*l, count)
	}
}

impl Logger for TestLogger {
	fn log(&self, record: Record) {
		let context = (record.module_path.to_string(), record.peer_id, record.pending_channel_id);
		let s = record.args.to_string();
		*self.lines.lock().unwrap().entry((record.module_path.to_string(), s)).or_insert(0) += 1;
		*self.context.lock().unwrap().entry(context).or_insert(0) += 1;
		if record.level >= self.level {
			println!("{:<5} {} [{} : {}, {}] {}", record.level.to_string(), self.id, record.module_path, record.file, record.line, record.args);
		}
	}
}

pub fn pubkey(byte: u8) -> PublicKey {
	let secp_ctx = Secp256k1::new();
	PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[byte; 32]).unwrap())
}

pub fn open_channel_msg(pending_channel_id: PendingChannelId) -> OpenChannel {
	OpenChannel {
		chain_hash: ChainHash::using_genesis_block(Network::Testnet),
		pending_channel_id,
		funding_satoshis: 1_000_000,
		push_msat: 0,
		dust_limit_satoshis: 354,
		max_htlc_value_in_flight_msat: 500_000_000,
		channel_reserve_satoshis: 10_000,
		htlc_minimum_msat: 1,
		feerate_per_kw: 253,
		to_self_delay: 144,
		max_accepted_htlcs: 483,
		funding_pubkey: pubkey(10),
		revocation_basepoint: pubkey(11),
		payment_basepoint: pubkey(12),
		delayed_payment_basepoint: pubkey(13),
		htlc_basepoint: pubkey(14),
		first_per_commitment_point: pubkey(15),
		channel_flags: 1,
		shutdown_scriptpubkey: None,
	}
}

/// Builds a request from the peer derived from `node_byte` with every byte of the pending channel
/// id set to `id_byte`.
pub fn open_channel_request(node_byte: u8, id_byte: u8) -> OpenChannelRequest {
	OpenChannelRequest::new(pubkey(node_byte), open_channel_msg(PendingChannelId([id_byte; 32])))
}

pub fn config_with_timeout(rpc_timeout: Duration) -> ChannelAcceptorConfig {
	ChannelAcceptorConfig { rpc_timeout }
}

/// An acceptor returning a fixed verdict, counting how often it is consulted.
pub struct RecordingAcceptor {
	verdict: bool,
	role: AcceptorRole,
	pub accept_calls: AtomicUsize,
	pub role_checks: AtomicUsize,
}

impl RecordingAcceptor {
	pub fn new(verdict: bool) -> Self {
		Self::with_role(verdict, AcceptorRole::Local)
	}
	pub fn with_role(verdict: bool, role: AcceptorRole) -> Self {
		RecordingAcceptor {
			verdict,
			role,
			accept_calls: AtomicUsize::new(0),
			role_checks: AtomicUsize::new(0),
		}
	}
	pub fn accept_calls(&self) -> usize {
		self.accept_calls.load(Ordering::Acquire)
	}
	pub fn role_checks(&self) -> usize {
		self.role_checks.load(Ordering::Acquire)
	}
}

impl ChannelAcceptor for RecordingAcceptor {
	fn accept<'a>(&'a self, _request: &'a OpenChannelRequest) -> AcceptFuture<'a> {
		self.accept_calls.fetch_add(1, Ordering::AcqRel);
		let verdict = self.verdict;
		Box::pin(async move { verdict })
	}

	fn role(&self) -> AcceptorRole {
		self.role_checks.fetch_add(1, Ordering::AcqRel);
		self.role
	}
}

/// An acceptor which does not describe its role, and so is unknown to a chain.
pub struct UnrecognizedAcceptor {
	pub accept_calls: AtomicUsize,
}

impl UnrecognizedAcceptor {
	pub fn new() -> Self {
		UnrecognizedAcceptor { accept_calls: AtomicUsize::new(0) }
	}
}

impl ChannelAcceptor for UnrecognizedAcceptor {
	fn accept<'a>(&'a self, _request: &'a OpenChannelRequest) -> AcceptFuture<'a> {
		self.accept_calls.fetch_add(1, Ordering::AcqRel);
		Box::pin(async { true })
	}
}

/// Answers every request `client` receives with `decide`'s verdict until the client is closed,
/// returning how many requests were answered.
pub fn spawn_responder<F>(mut client: ChannelAcceptorClient, decide: F) -> tokio::task::JoinHandle<usize>
where
	F: Fn(&OpenChannelRequest) -> bool + Send + 'static,
{
	tokio::spawn(async move {
		let mut answered = 0;
		while let Some(request) = client.next_request().await {
			let response = OpenChannelResponse {
				pending_channel_id: request.pending_channel_id(),
				accept: decide(&request),
			};
			if client.respond(response).await.is_err() {
				break;
			}
			answered += 1;
		}
		answered
	})
}
