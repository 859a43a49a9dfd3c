//! PocketGrant and IDRX contract interface: the single source of truth for
//! every function signature, event topic and argument layout the client uses.
//!
//! ## Encoding
//!
//! * Selectors and topics are the first 4 / all 32 bytes of keccak-256 over the
//!   canonical signature.
//! * Static arguments occupy one 32-byte big-endian word each; the
//!   `createProgram` config tuple is fully static and is therefore encoded in
//!   place.
//! * Dynamic `string` arguments are written as an offset in the head and a
//!   length-prefixed, zero-padded payload in the tail.
//!
//! Decoders never truncate: a `uint256` that does not fit the Rust type is a
//! [`ClientError::Decode`].

use sha3::{Digest, Keccak256};

use crate::errors::{ClientError, Result};
use crate::types::{Address, ClaimCheck, Log, Program, ProgramConfig, Receipt};

const WORD: usize = 32;

// ─────────────────────────────────────────────────────────
// Signatures
// ─────────────────────────────────────────────────────────

pub mod sig {
    // PocketGrant reads
    pub const GET_PROGRAM: &str = "getProgram(uint256)";
    pub const CAN_CLAIM: &str = "canClaimDanaKaget(uint256,address)";
    pub const HAS_CLAIMED: &str = "hasClaimed(uint256,address)";
    pub const IS_VERIFIED: &str = "isVerified(uint256,address)";
    pub const PROGRAM_COUNT: &str = "programCount()";
    pub const ADMIN: &str = "admin()";
    pub const VERIFIERS: &str = "verifiers(address)";
    pub const GLOBAL_PAUSED: &str = "globalPaused()";

    // PocketGrant writes
    pub const CREATE_PROGRAM: &str =
        "createProgram((uint256,uint256,uint8,uint256,uint64,uint64,bytes32,bool))";
    pub const CLAIM_INSTANT: &str = "claimDanaKaget(uint256)";
    pub const CLAIM_GIFT: &str = "claimGift(uint256,string)";
    pub const SUBMIT_REQUEST: &str = "submitRequest(uint256,uint256)";
    pub const PAUSE_PROGRAM: &str = "pauseProgram(uint256)";
    pub const RESUME_PROGRAM: &str = "resumeProgram(uint256)";
    pub const END_PROGRAM: &str = "endProgram(uint256)";
    pub const VERIFY_BENEFICIARY: &str = "verifyBeneficiary(uint256,address)";
    pub const TOP_UP_PROGRAM: &str = "topUpProgram(uint256,uint256)";

    // PocketGrant events
    pub const PROGRAM_CREATED: &str = "ProgramCreated(uint256,address,uint256,uint8)";
    pub const CLAIMED: &str = "Claimed(uint256,address,uint256)";

    // ERC-20
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
    pub const APPROVE: &str = "approve(address,uint256)";
    pub const DECIMALS: &str = "decimals()";
    pub const SYMBOL: &str = "symbol()";

    /// Solidity `require`/`revert` payload.
    pub const ERROR_STRING: &str = "Error(string)";
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

// ─────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────

/// A single ABI argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u128),
    Address(Address),
    Bool(bool),
    Bytes32([u8; 32]),
    String(String),
}

fn uint_word(v: u128) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[16..].copy_from_slice(&v.to_be_bytes());
    w
}

fn address_word(a: &Address) -> [u8; 32] {
    let mut w = [0u8; 32];
    w[12..].copy_from_slice(&a.0);
    w
}

/// Head/tail encode a flat argument list.
pub fn encode_args(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(v) => head.extend_from_slice(&uint_word(*v)),
            Token::Address(a) => head.extend_from_slice(&address_word(a)),
            Token::Bool(b) => head.extend_from_slice(&uint_word(u128::from(*b))),
            Token::Bytes32(b) => head.extend_from_slice(b),
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u128));
                let bytes = s.as_bytes();
                tail.extend_from_slice(&uint_word(bytes.len() as u128));
                tail.extend_from_slice(bytes);
                let pad = (WORD - bytes.len() % WORD) % WORD;
                tail.extend(std::iter::repeat(0u8).take(pad));
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

pub fn encode_call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut data = selector(signature).to_vec();
    data.extend_from_slice(&encode_args(tokens));
    data
}

// ─────────────────────────────────────────────────────────
// Call builders
// ─────────────────────────────────────────────────────────

pub fn get_program(id: u64) -> Vec<u8> {
    encode_call(sig::GET_PROGRAM, &[Token::Uint(id.into())])
}

pub fn can_claim(id: u64, wallet: Address) -> Vec<u8> {
    encode_call(sig::CAN_CLAIM, &[Token::Uint(id.into()), Token::Address(wallet)])
}

pub fn has_claimed(id: u64, wallet: Address) -> Vec<u8> {
    encode_call(sig::HAS_CLAIMED, &[Token::Uint(id.into()), Token::Address(wallet)])
}

pub fn is_verified(id: u64, wallet: Address) -> Vec<u8> {
    encode_call(sig::IS_VERIFIED, &[Token::Uint(id.into()), Token::Address(wallet)])
}

pub fn program_count() -> Vec<u8> {
    encode_call(sig::PROGRAM_COUNT, &[])
}

pub fn admin() -> Vec<u8> {
    encode_call(sig::ADMIN, &[])
}

pub fn verifiers(account: Address) -> Vec<u8> {
    encode_call(sig::VERIFIERS, &[Token::Address(account)])
}

pub fn global_paused() -> Vec<u8> {
    encode_call(sig::GLOBAL_PAUSED, &[])
}

pub fn create_program(config: &ProgramConfig) -> Vec<u8> {
    encode_call(
        sig::CREATE_PROGRAM,
        &[
            Token::Uint(config.total_fund),
            Token::Uint(config.max_per_claim),
            Token::Uint(config.mode.as_u8().into()),
            Token::Uint(config.cap_per_wallet),
            Token::Uint(config.start.into()),
            Token::Uint(config.end.into()),
            Token::Bytes32(config.gift_code_hash),
            Token::Bool(config.require_verification),
        ],
    )
}

pub fn claim_instant(id: u64) -> Vec<u8> {
    encode_call(sig::CLAIM_INSTANT, &[Token::Uint(id.into())])
}

pub fn claim_gift(id: u64, code: &str) -> Vec<u8> {
    encode_call(
        sig::CLAIM_GIFT,
        &[Token::Uint(id.into()), Token::String(code.to_string())],
    )
}

pub fn submit_request(id: u64, amount: u128) -> Vec<u8> {
    encode_call(sig::SUBMIT_REQUEST, &[Token::Uint(id.into()), Token::Uint(amount)])
}

pub fn pause_program(id: u64) -> Vec<u8> {
    encode_call(sig::PAUSE_PROGRAM, &[Token::Uint(id.into())])
}

pub fn resume_program(id: u64) -> Vec<u8> {
    encode_call(sig::RESUME_PROGRAM, &[Token::Uint(id.into())])
}

pub fn end_program(id: u64) -> Vec<u8> {
    encode_call(sig::END_PROGRAM, &[Token::Uint(id.into())])
}

pub fn verify_beneficiary(id: u64, beneficiary: Address) -> Vec<u8> {
    encode_call(
        sig::VERIFY_BENEFICIARY,
        &[Token::Uint(id.into()), Token::Address(beneficiary)],
    )
}

pub fn top_up_program(id: u64, amount: u128) -> Vec<u8> {
    encode_call(sig::TOP_UP_PROGRAM, &[Token::Uint(id.into()), Token::Uint(amount)])
}

pub fn balance_of(owner: Address) -> Vec<u8> {
    encode_call(sig::BALANCE_OF, &[Token::Address(owner)])
}

pub fn allowance(owner: Address, spender: Address) -> Vec<u8> {
    encode_call(sig::ALLOWANCE, &[Token::Address(owner), Token::Address(spender)])
}

pub fn approve(spender: Address, amount: u128) -> Vec<u8> {
    encode_call(sig::APPROVE, &[Token::Address(spender), Token::Uint(amount)])
}

pub fn decimals() -> Vec<u8> {
    encode_call(sig::DECIMALS, &[])
}

pub fn symbol() -> Vec<u8> {
    encode_call(sig::SYMBOL, &[])
}

/// `keccak256(code)`, stored on-chain for gift-code programs.
pub fn gift_code_hash(code: &str) -> [u8; 32] {
    keccak256(code.trim().as_bytes())
}

// ─────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────

/// Word-indexed view over ABI-encoded return data.
pub struct Decoder<'a> {
    data: &'a [u8],
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn word(&self, index: usize) -> Result<&'a [u8]> {
        let start = index * WORD;
        self.data.get(start..start + WORD).ok_or_else(|| {
            ClientError::Decode(format!(
                "return data too short: need word {index}, have {} bytes",
                self.data.len()
            ))
        })
    }

    fn uint_with_width(&self, index: usize, bytes: usize) -> Result<u128> {
        let w = self.word(index)?;
        if w[..WORD - bytes].iter().any(|b| *b != 0) {
            return Err(ClientError::Decode(format!(
                "word {index} overflows a {}-bit integer",
                bytes * 8
            )));
        }
        let mut buf = [0u8; 16];
        buf[16 - bytes..].copy_from_slice(&w[WORD - bytes..]);
        Ok(u128::from_be_bytes(buf))
    }

    pub fn u128(&self, index: usize) -> Result<u128> {
        self.uint_with_width(index, 16)
    }

    pub fn u64(&self, index: usize) -> Result<u64> {
        Ok(self.uint_with_width(index, 8)? as u64)
    }

    pub fn u8(&self, index: usize) -> Result<u8> {
        Ok(self.uint_with_width(index, 1)? as u8)
    }

    pub fn bool(&self, index: usize) -> Result<bool> {
        match self.uint_with_width(index, 1)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ClientError::Decode(format!("word {index} is not a bool ({other})"))),
        }
    }

    pub fn address(&self, index: usize) -> Result<Address> {
        let w = self.word(index)?;
        if w[..12].iter().any(|b| *b != 0) {
            return Err(ClientError::Decode(format!("word {index} is not an address")));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&w[12..]);
        Ok(Address(out))
    }

    /// Dynamic `string` whose offset is stored at `index`.
    pub fn string(&self, index: usize) -> Result<String> {
        let offset = self.u64(index)? as usize;
        if offset % WORD != 0 {
            return Err(ClientError::Decode(format!("unaligned string offset {offset}")));
        }
        let tail = Decoder::new(self.data.get(offset..).unwrap_or_default());
        let len = tail.u64(0)? as usize;
        let bytes = WORD
            .checked_add(len)
            .and_then(|end| tail.data.get(WORD..end))
            .ok_or_else(|| ClientError::Decode(format!("string length {len} exceeds payload")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| ClientError::Decode(format!("string is not UTF-8: {e}")))
    }
}

pub fn decode_program(id: u64, data: &[u8]) -> Result<Program> {
    let d = Decoder::new(data);
    Ok(Program {
        id,
        owner: d.address(0)?,
        total_fund: d.u128(1)?,
        remaining_fund: d.u128(2)?,
        max_per_claim: d.u128(3)?,
        mode: d.u8(4)?.try_into()?,
        status: d.u8(5)?.try_into()?,
        cap_per_wallet: d.u128(6)?,
        start: d.u64(7)?,
        end: d.u64(8)?,
        require_verification: d.bool(9)?,
    })
}

pub fn decode_claim_check(data: &[u8]) -> Result<ClaimCheck> {
    let d = Decoder::new(data);
    Ok(ClaimCheck {
        can_claim: d.bool(0)?,
        amount: d.u128(1)?,
    })
}

/// Decode the reason out of an `Error(string)` revert payload.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let body = data.strip_prefix(&selector(sig::ERROR_STRING)[..])?;
    Decoder::new(body).string(0).ok()
}

// ─────────────────────────────────────────────────────────
// Events
// ─────────────────────────────────────────────────────────

/// Decoded `ProgramCreated` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramCreated {
    pub program_id: u64,
    pub provider: Address,
    pub total_fund: u128,
    pub mode: u8,
}

/// Decoded `Claimed` log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimed {
    pub program_id: u64,
    pub claimant: Address,
    pub amount: u128,
}

fn topic_u64(topic: &[u8; 32]) -> Result<u64> {
    Decoder::new(topic).u64(0)
}

fn topic_address(topic: &[u8; 32]) -> Result<Address> {
    Decoder::new(topic).address(0)
}

pub fn decode_program_created(log: &Log) -> Option<ProgramCreated> {
    if log.topics.first()? != &event_topic(sig::PROGRAM_CREATED) || log.topics.len() < 3 {
        return None;
    }
    let data = Decoder::new(&log.data);
    Some(ProgramCreated {
        program_id: topic_u64(&log.topics[1]).ok()?,
        provider: topic_address(&log.topics[2]).ok()?,
        total_fund: data.u128(0).ok()?,
        mode: data.u8(1).ok()?,
    })
}

pub fn decode_claimed(log: &Log) -> Option<Claimed> {
    if log.topics.first()? != &event_topic(sig::CLAIMED) || log.topics.len() < 3 {
        return None;
    }
    Some(Claimed {
        program_id: topic_u64(&log.topics[1]).ok()?,
        claimant: topic_address(&log.topics[2]).ok()?,
        amount: Decoder::new(&log.data).u128(0).ok()?,
    })
}

/// Program id minted by a `createProgram` transaction, read from its receipt.
pub fn created_program_id(receipt: &Receipt, grant: Address) -> Option<u64> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == grant)
        .find_map(decode_program_created)
        .map(|ev| ev.program_id)
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
