// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The already-decoded `open_channel` message the acceptors make their decision on.
//!
//! Reading the message off the wire is left to the peer handling layer; this module only defines
//! the fields it yields.

use bitcoin::constants::ChainHash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::ScriptBuf;

use core::fmt;

/// The 32-byte identifier a proposing peer picks for a channel while it is being negotiated.
///
/// It is unique among the negotiations the peer has open with us and is what a delegated
/// decision is matched back to its request by.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PendingChannelId(pub [u8; 32]);

impl PendingChannelId {
	/// Wraps the given bytes.
	pub fn from_bytes(data: [u8; 32]) -> Self {
		Self(data)
	}
}

impl fmt::Display for PendingChannelId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&crate::util::logger::DebugBytes(&self.0), f)
	}
}

/// An open_channel message received from a peer.
///
/// Only the fields are described here, see BOLT 2 for their meaning and encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenChannel {
	/// The genesis hash of the blockchain where the channel is to be opened
	pub chain_hash: ChainHash,
	/// A temporary channel ID, until the funding outpoint is announced
	pub pending_channel_id: PendingChannelId,
	/// The channel value
	pub funding_satoshis: u64,
	/// The amount to push to the counterparty as part of the open, in milli-satoshi
	pub push_msat: u64,
	/// The threshold below which outputs on transactions broadcast by sender will be omitted
	pub dust_limit_satoshis: u64,
	/// The maximum inbound HTLC value in flight towards sender, in milli-satoshi
	pub max_htlc_value_in_flight_msat: u64,
	/// The minimum value unencumbered by HTLCs for the counterparty to keep in the channel
	pub channel_reserve_satoshis: u64,
	/// The minimum HTLC size incoming to sender, in milli-satoshi
	pub htlc_minimum_msat: u64,
	/// The feerate per 1000-weight of sender generated transactions, until updated by update_fee
	pub feerate_per_kw: u32,
	/// The number of blocks which the counterparty will have to wait to claim on-chain funds if
	/// they broadcast a commitment transaction
	pub to_self_delay: u16,
	/// The maximum number of inbound HTLCs towards sender
	pub max_accepted_htlcs: u16,
	/// The sender's key controlling the funding transaction
	pub funding_pubkey: PublicKey,
	/// Used to derive a revocation key for transactions broadcast by counterparty
	pub revocation_basepoint: PublicKey,
	/// A payment key to sender for transactions broadcast by counterparty
	pub payment_basepoint: PublicKey,
	/// Used to derive a payment key to sender for transactions broadcast by sender
	pub delayed_payment_basepoint: PublicKey,
	/// Used to derive an HTLC payment key to sender
	pub htlc_basepoint: PublicKey,
	/// The first to-be-broadcast-by-sender transaction's per commitment point
	pub first_per_commitment_point: PublicKey,
	/// The channel flags to be used
	pub channel_flags: u8,
	/// Optionally, a request to pre-set the to-sender output's scriptPubkey for when we collaboratively close
	pub shutdown_scriptpubkey: Option<ScriptBuf>,
}

#[cfg(test)]
mod tests {
	use super::PendingChannelId;

	#[test]
	fn pending_channel_id_display_is_hex() {
		let mut bytes = [0; 32];
		bytes[0] = 0xab;
		bytes[31] = 0x01;
		let id = PendingChannelId::from_bytes(bytes);
		let shown = format!("{}", id);
		assert_eq!(shown.len(), 64);
		assert!(shown.starts_with("ab00"));
		assert!(shown.ends_with("0001"));
	}
}
