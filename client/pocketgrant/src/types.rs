//! # Types
//!
//! Client-side mirrors of the PocketGrant contract's data plus the primitive
//! chain types (addresses, hashes, receipts) the hooks pass around.
//!
//! Nothing here is authoritative. A [`Program`] is a snapshot of the last
//! successful `getProgram` read and is replaced wholesale by the next one.
//!
//! ### Program lifecycle
//!
//! ```text
//! Active ◄──► Paused
//!    │          │
//!    └──► Ended ◄┘
//! ```
//!
//! `Ended` is terminal. `mode` never changes after creation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ClientError;

/// A 20-byte EVM account or contract address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Shortened form for display: `0x1234...abcd`.
    pub fn truncated(&self) -> String {
        let full = self.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = ClientError;

    /// Accepts exactly `0x` followed by 40 hex digits, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or_else(|| ClientError::Decode(format!("address must start with 0x: {s}")))?;
        if body.len() != 40 {
            return Err(ClientError::Decode(format!("address must be 40 hex digits: {s}")));
        }
        let mut out = [0u8; 20];
        hex::decode_to_slice(body, &mut out)
            .map_err(|e| ClientError::Decode(format!("invalid address {s}: {e}")))?;
        Ok(Address(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// `true` when `s` is a well-formed `0x`-prefixed 40-digit hex address.
pub fn is_valid_address(s: &str) -> bool {
    s.parse::<Address>().is_ok()
}

/// Submission identifier returned by the wallet.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self.0)
    }
}

/// How a program disburses funds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramMode {
    /// Beneficiaries submit a request for manual approval.
    Request,
    /// First-come random claim ("Dana Kaget").
    InstantRandomClaim,
    /// Redemption with a secret gift code.
    GiftCode,
}

impl ProgramMode {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Request => 0,
            Self::InstantRandomClaim => 1,
            Self::GiftCode => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Request => "Request",
            Self::InstantRandomClaim => "Dana Kaget",
            Self::GiftCode => "Gift Card",
        }
    }
}

impl TryFrom<u8> for ProgramMode {
    type Error = ClientError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Request),
            1 => Ok(Self::InstantRandomClaim),
            2 => Ok(Self::GiftCode),
            other => Err(ClientError::Decode(format!("unknown program mode {other}"))),
        }
    }
}

/// Lifecycle status of a program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Active,
    Paused,
    Ended,
}

impl ProgramStatus {
    /// Whether the contract can move a program from `self` to `to`.
    pub fn can_transition_to(self, to: ProgramStatus) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Paused)
                | (Self::Paused, Self::Active)
                | (Self::Active, Self::Ended)
                | (Self::Paused, Self::Ended)
        )
    }
}

impl TryFrom<u8> for ProgramStatus {
    type Error = ClientError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(Self::Active),
            1 => Ok(Self::Paused),
            2 => Ok(Self::Ended),
            other => Err(ClientError::Decode(format!("unknown program status {other}"))),
        }
    }
}

/// Snapshot of an on-chain program as returned by `getProgram`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Program {
    /// Sequential identifier, starting at 1.
    pub id: u64,
    /// Provider that funded the program.
    pub owner: Address,
    pub total_fund: u128,
    pub remaining_fund: u128,
    pub max_per_claim: u128,
    pub mode: ProgramMode,
    pub status: ProgramStatus,
    /// Claims allowed per wallet; 0 means the contract default.
    pub cap_per_wallet: u128,
    /// Unix seconds; `start == 0 && end == 0` means not time-bounded.
    pub start: u64,
    pub end: u64,
    pub require_verification: bool,
}

impl Program {
    pub fn is_time_bounded(&self) -> bool {
        self.start != 0 || self.end != 0
    }
}

/// Result of `canClaimDanaKaget`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimCheck {
    pub can_claim: bool,
    pub amount: u128,
}

/// Arguments of `createProgram`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgramConfig {
    pub total_fund: u128,
    pub max_per_claim: u128,
    pub mode: ProgramMode,
    pub cap_per_wallet: u128,
    pub start: u64,
    pub end: u64,
    pub gift_code_hash: [u8; 32],
    pub require_verification: bool,
}

/// One log entry of a transaction receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
    pub tx_hash: Option<String>,
    pub log_index: Option<u64>,
}

/// Decoded `eth_getTransactionReceipt` result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: u64,
    pub logs: Vec<Log>,
}

/// Paymaster capability attached to a sponsored call (EIP-5792).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub paymaster_service: PaymasterService,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymasterService {
    pub url: String,
}

/// A fully encoded mutating call, ready for the wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteCall {
    pub to: Address,
    pub data: Vec<u8>,
    pub capabilities: Option<Capabilities>,
}

impl WriteCall {
    pub fn new(to: Address, data: Vec<u8>) -> Self {
        Self {
            to,
            data,
            capabilities: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_parse_and_display() {
        let a: Address = "0x486C001D1A07B15613BA57B9EEB5B1333A1383EF".parse().unwrap();
        assert_eq!(a.to_string(), "0x486c001d1a07b15613ba57b9eeb5b1333a1383ef");
        assert_eq!(a.truncated(), "0x486c...83ef");
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_address("0x7cca9d58715511d51c9d270a155df79c8f990586"));
        assert!(!is_valid_address("7cca9d58715511d51c9d270a155df79c8f990586"));
        assert!(!is_valid_address("0x7cca9d58715511d51c9d270a155df79c8f99058"));
        assert!(!is_valid_address("0xzzca9d58715511d51c9d270a155df79c8f990586"));
        assert!(!is_valid_address(""));
    }

    #[test]
    fn address_serde_as_string() {
        let a: Address = "0x7cca9d58715511d51c9d270a155df79c8f990586".parse().unwrap();
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"0x7cca9d58715511d51c9d270a155df79c8f990586\"");
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn mode_and_status_discriminants() {
        assert_eq!(ProgramMode::try_from(0).unwrap(), ProgramMode::Request);
        assert_eq!(ProgramMode::try_from(2).unwrap(), ProgramMode::GiftCode);
        assert!(ProgramMode::try_from(3).is_err());
        assert_eq!(ProgramStatus::try_from(1).unwrap(), ProgramStatus::Paused);
        assert!(ProgramStatus::try_from(9).is_err());
    }

    #[test]
    fn status_transitions_are_monotonic_except_pause() {
        use ProgramStatus::*;
        assert!(Active.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Active));
        assert!(Active.can_transition_to(Ended));
        assert!(!Ended.can_transition_to(Active));
        assert!(!Ended.can_transition_to(Paused));
    }
}
