// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Tests exercising chains of acceptors with an RPC client deciding on requests from several
//! peers at once.

use crate::acceptor::{
	ChainedAcceptor, ChannelAcceptor, DefaultAcceptor, OpenChannelRequest, OpenChannelResponse,
	RpcAcceptor,
};
use crate::msgs::PendingChannelId;
use crate::util::test_utils::{self, RecordingAcceptor, TestLogger};

use std::sync::Arc;
use std::time::{Duration, Instant};

type TestRpcAcceptor = RpcAcceptor<Arc<TestLogger>>;

fn rpc_acceptor(logger: &Arc<TestLogger>, rpc_timeout: Duration) -> Arc<TestRpcAcceptor> {
	let acceptor = Arc::new(RpcAcceptor::new(test_utils::config_with_timeout(rpc_timeout), Arc::clone(logger)));
	acceptor.start().unwrap();
	acceptor
}

fn default_and_rpc_chain(
	logger: &Arc<TestLogger>, rpc: &Arc<TestRpcAcceptor>,
) -> Arc<ChainedAcceptor<Arc<TestLogger>>> {
	Arc::new(ChainedAcceptor::with_acceptors(
		vec![Arc::new(DefaultAcceptor::new()), Arc::clone(rpc) as Arc<dyn ChannelAcceptor + Send + Sync>],
		Arc::clone(logger),
	))
}

fn spawn_accept(
	acceptor: &Arc<ChainedAcceptor<Arc<TestLogger>>>, request: OpenChannelRequest,
) -> tokio::task::JoinHandle<bool> {
	let acceptor = Arc::clone(acceptor);
	tokio::spawn(async move { acceptor.accept(&request).await })
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_peers_get_their_own_decisions() {
	let logger = Arc::new(TestLogger::new());
	let rpc = rpc_acceptor(&logger, Duration::from_secs(15));
	let chain = default_and_rpc_chain(&logger, &rpc);
	let mut client = rpc.register_client().unwrap();

	let peer_a = test_utils::open_channel_request(0xa, 0x01);
	let peer_b = test_utils::open_channel_request(0xb, 0x02);
	let call_a = spawn_accept(&chain, peer_a.clone());
	let call_b = spawn_accept(&chain, peer_b.clone());

	let mut received = vec![client.next_request().await.unwrap(), client.next_request().await.unwrap()];
	received.sort_by_key(|request| request.pending_channel_id());
	assert_eq!(received, vec![peer_a, peer_b]);

	// Answer in the opposite order the requests were made in.
	client.respond(OpenChannelResponse { pending_channel_id: PendingChannelId([0x02; 32]), accept: true }).await.unwrap();
	client.respond(OpenChannelResponse { pending_channel_id: PendingChannelId([0x01; 32]), accept: false }).await.unwrap();

	assert!(!call_a.await.unwrap());
	assert!(call_b.await.unwrap());
	assert_eq!(rpc.pending_decisions(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn many_peers_without_cross_talk() {
	let logger = Arc::new(TestLogger::new());
	let rpc = rpc_acceptor(&logger, Duration::from_secs(15));
	let chain = default_and_rpc_chain(&logger, &rpc);
	let mut client = rpc.register_client().unwrap();

	let mut calls = Vec::new();
	for id in 1..=40u8 {
		calls.push((id, spawn_accept(&chain, test_utils::open_channel_request(id, id))));
	}

	let mut received = Vec::new();
	for _ in 0..calls.len() {
		received.push(client.next_request().await.unwrap());
	}
	// Odd ids are accepted, answered from the last received to the first.
	for request in received.iter().rev() {
		let pending_channel_id = request.pending_channel_id();
		let accept = pending_channel_id.0[0] % 2 == 1;
		client.respond(OpenChannelResponse { pending_channel_id, accept }).await.unwrap();
	}

	for (id, call) in calls {
		assert_eq!(call.await.unwrap(), id % 2 == 1);
	}
	assert_eq!(rpc.pending_decisions(), 0);
}

#[tokio::test]
async fn chain_without_client_falls_back_to_local_acceptors() {
	let logger = Arc::new(TestLogger::new());
	let rpc = rpc_acceptor(&logger, Duration::from_secs(15));
	let chain = default_and_rpc_chain(&logger, &rpc);

	let start = Instant::now();
	assert!(chain.accept(&test_utils::open_channel_request(1, 1)).await);
	assert!(start.elapsed() < Duration::from_secs(1));
	logger.assert_log_contains(
		"lightning_channel_acceptor::acceptor::chained", "as it has no client to delegate to", 1,
	);
}

#[tokio::test]
async fn client_rejection_still_consults_every_acceptor() {
	let logger = Arc::new(TestLogger::new());
	let rpc = rpc_acceptor(&logger, Duration::from_secs(15));
	let before = Arc::new(RecordingAcceptor::new(true));
	let after = Arc::new(RecordingAcceptor::new(true));
	let chain = Arc::new(ChainedAcceptor::with_acceptors(
		vec![before.clone(), Arc::clone(&rpc) as Arc<dyn ChannelAcceptor + Send + Sync>, after.clone()],
		Arc::clone(&logger),
	));
	let responder = test_utils::spawn_responder(rpc.register_client().unwrap(), |_| false);

	assert!(!chain.accept(&test_utils::open_channel_request(1, 1)).await);
	assert!(!chain.accept(&test_utils::open_channel_request(2, 2)).await);
	assert_eq!(before.accept_calls(), 2);
	assert_eq!(after.accept_calls(), 2);

	rpc.unregister_client();
	assert_eq!(responder.await.unwrap(), 2);
	// With the client gone the remaining acceptors decide alone.
	assert!(chain.accept(&test_utils::open_channel_request(3, 3)).await);
	assert_eq!(after.accept_calls(), 3);
}

#[tokio::test]
async fn silent_client_times_out_the_chain() {
	let logger = Arc::new(TestLogger::new());
	let rpc_timeout = Duration::from_millis(200);
	let rpc = rpc_acceptor(&logger, rpc_timeout);
	let chain = default_and_rpc_chain(&logger, &rpc);
	let mut client = rpc.register_client().unwrap();

	let request = test_utils::open_channel_request(1, 1);
	let start = Instant::now();
	let (verdict, received) = tokio::join!(chain.accept(&request), client.next_request());
	assert!(!verdict);
	assert_eq!(received, Some(request));
	assert!(start.elapsed() >= rpc_timeout);
	assert_eq!(rpc.pending_decisions(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn stopping_releases_waiting_chains() {
	let logger = Arc::new(TestLogger::new());
	let rpc = rpc_acceptor(&logger, Duration::from_secs(30));
	let chain = default_and_rpc_chain(&logger, &rpc);
	let mut client = rpc.register_client().unwrap();

	let calls: Vec<_> = (1..=3u8).map(|id| spawn_accept(&chain, test_utils::open_channel_request(id, id))).collect();
	for _ in 0..3 {
		assert!(client.next_request().await.is_some());
	}

	rpc.stop().await;
	for call in calls {
		assert!(!tokio::time::timeout(Duration::from_secs(1), call).await.unwrap().unwrap());
	}
	assert_eq!(client.next_request().await, None);

	// A stopped acceptor has no client, so the chain no longer waits on it.
	assert!(chain.accept(&test_utils::open_channel_request(4, 4)).await);
}
