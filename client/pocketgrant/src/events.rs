//! Canonical event types emitted by the PocketGrant contract.
//!
//! These mirror the `ProgramCreated` and `Claimed` events declared in
//! [`crate::abi::sig`]. Indexed events are derived data; the contract stays
//! authoritative.

use serde::{Deserialize, Serialize};

use crate::abi::{self, sig};
use crate::types::{Address, Log};

/// All recognised event kinds from the PocketGrant contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A provider funded a new program.
    ProgramCreated,
    /// A beneficiary received funds from a program.
    Claimed,
}

impl EventKind {
    /// Short identifier stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProgramCreated => "program_created",
            Self::Claimed => "claimed",
        }
    }

    /// First topic of logs of this kind.
    pub fn topic(&self) -> [u8; 32] {
        match self {
            Self::ProgramCreated => abi::event_topic(sig::PROGRAM_CREATED),
            Self::Claimed => abi::event_topic(sig::CLAIMED),
        }
    }

    pub fn all_topics() -> [[u8; 32]; 2] {
        [Self::ProgramCreated.topic(), Self::Claimed.topic()]
    }
}

/// A fully decoded PocketGrant event, ready to be stored in the database.
///
/// Amounts are decimal strings of base units; SQLite integers are too narrow
/// for `uint256`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantEvent {
    pub event_type: String,
    pub program_id: i64,
    /// Provider for `program_created`, claimant for `claimed`.
    pub actor: String,
    pub amount: String,
    /// Program mode discriminant, only on `program_created`.
    pub mode: Option<i64>,
    pub block_number: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub contract: String,
}

/// A raw event record as stored in / read from the database.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventRecord {
    pub id: i64,
    pub event_type: String,
    pub program_id: i64,
    pub actor: String,
    pub amount: String,
    pub mode: Option<i64>,
    pub block_number: i64,
    pub tx_hash: String,
    pub log_index: i64,
    pub contract: String,
    pub created_at: i64,
}

/// Decode a log from `contract` into a [`GrantEvent`].
///
/// Returns `None` for logs from other contracts, unknown topics, malformed
/// payloads, and pending logs that carry no position yet.
pub fn decode(log: &Log, contract: Address) -> Option<GrantEvent> {
    if log.address != contract {
        return None;
    }
    let block_number = i64::try_from(log.block_number?).ok()?;
    let log_index = i64::try_from(log.log_index?).ok()?;
    let tx_hash = log.tx_hash.clone()?.to_lowercase();

    let (kind, program_id, actor, amount, mode) = if let Some(ev) = abi::decode_program_created(log)
    {
        (
            EventKind::ProgramCreated,
            ev.program_id,
            ev.provider,
            ev.total_fund,
            Some(i64::from(ev.mode)),
        )
    } else if let Some(ev) = abi::decode_claimed(log) {
        (EventKind::Claimed, ev.program_id, ev.claimant, ev.amount, None)
    } else {
        return None;
    };

    Some(GrantEvent {
        event_type: kind.as_str().to_string(),
        program_id: i64::try_from(program_id).ok()?,
        actor: actor.to_string(),
        amount: amount.to_string(),
        mode,
        block_number,
        tx_hash,
        log_index,
        contract: contract.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::abi::{encode_args, Token};

    pub fn contract() -> Address {
        Address([0x44; 20])
    }

    fn word(token: Token) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&encode_args(&[token]));
        out
    }

    pub fn created_log(id: u64, provider: Address, total: u128, block: u64, index: u64) -> Log {
        Log {
            address: contract(),
            topics: vec![
                EventKind::ProgramCreated.topic(),
                word(Token::Uint(id.into())),
                word(Token::Address(provider)),
            ],
            data: encode_args(&[Token::Uint(total), Token::Uint(1)]),
            block_number: Some(block),
            tx_hash: Some(format!("0x{:064x}", block * 100 + index)),
            log_index: Some(index),
        }
    }

    pub fn claimed_log(id: u64, claimant: Address, amount: u128, block: u64, index: u64) -> Log {
        Log {
            address: contract(),
            topics: vec![
                EventKind::Claimed.topic(),
                word(Token::Uint(id.into())),
                word(Token::Address(claimant)),
            ],
            data: encode_args(&[Token::Uint(amount)]),
            block_number: Some(block),
            tx_hash: Some(format!("0x{:064x}", block * 100 + index)),
            log_index: Some(index),
        }
    }

    #[test]
    fn decodes_program_created() {
        let ev = decode(&created_log(7, Address([0x11; 20]), 500_000, 42, 3), contract()).unwrap();
        assert_eq!(ev.event_type, "program_created");
        assert_eq!(ev.program_id, 7);
        assert_eq!(ev.actor, Address([0x11; 20]).to_string());
        assert_eq!(ev.amount, "500000");
        assert_eq!(ev.mode, Some(1));
        assert_eq!((ev.block_number, ev.log_index), (42, 3));
    }

    #[test]
    fn decodes_claimed() {
        let ev = decode(&claimed_log(2, Address([0x22; 20]), 5_000, 10, 0), contract()).unwrap();
        assert_eq!(ev.event_type, "claimed");
        assert_eq!(ev.amount, "5000");
        assert_eq!(ev.mode, None);
    }

    #[test]
    fn ignores_foreign_and_pending_logs() {
        let mut foreign = claimed_log(2, Address([0x22; 20]), 5_000, 10, 0);
        foreign.address = Address([0x99; 20]);
        assert!(decode(&foreign, contract()).is_none());

        let mut pending = claimed_log(2, Address([0x22; 20]), 5_000, 10, 0);
        pending.block_number = None;
        assert!(decode(&pending, contract()).is_none());

        let mut unknown = claimed_log(2, Address([0x22; 20]), 5_000, 10, 0);
        unknown.topics[0] = [0xee; 32];
        assert!(decode(&unknown, contract()).is_none());
    }
}
