//! Seams between the client logic and the outside world.
//!
//! [`GrantReader`] is the read surface of the PocketGrant and IDRX contracts
//! plus the network clock. [`Wallet`] is whatever holds the user's keys: it
//! reports the connected account and network, signs and submits calls, and
//! reports receipts. [`LogSource`] feeds the event indexer.
//! [`crate::rpc::RpcChain`] implements all three over JSON-RPC; tests use an
//! in-memory contract.

use std::future::Future;

use crate::errors::Result;
use crate::types::{Address, ClaimCheck, Log, Program, Receipt, TxHash, WriteCall};

pub trait GrantReader: Send + Sync + 'static {
    fn get_program(&self, id: u64) -> impl Future<Output = Result<Program>> + Send;

    fn can_claim(&self, id: u64, wallet: Address)
        -> impl Future<Output = Result<ClaimCheck>> + Send;

    fn has_claimed(&self, id: u64, wallet: Address) -> impl Future<Output = Result<bool>> + Send;

    fn is_verified(&self, id: u64, wallet: Address) -> impl Future<Output = Result<bool>> + Send;

    fn program_count(&self) -> impl Future<Output = Result<u64>> + Send;

    fn admin(&self) -> impl Future<Output = Result<Address>> + Send;

    fn is_verifier(&self, account: Address) -> impl Future<Output = Result<bool>> + Send;

    fn global_paused(&self) -> impl Future<Output = Result<bool>> + Send;

    fn balance_of(&self, owner: Address) -> impl Future<Output = Result<u128>> + Send;

    /// Allowance granted by `owner` to the PocketGrant contract.
    fn allowance(&self, owner: Address) -> impl Future<Output = Result<u128>> + Send;

    fn token_decimals(&self) -> impl Future<Output = Result<u8>> + Send;

    fn token_symbol(&self) -> impl Future<Output = Result<String>> + Send;

    /// Timestamp of the latest block, in Unix seconds.
    fn latest_timestamp(&self) -> impl Future<Output = Result<u64>> + Send;
}

pub trait Wallet: Send + Sync + 'static {
    /// Connected account, or `None` when no wallet is connected.
    fn account(&self) -> impl Future<Output = Result<Option<Address>>> + Send;

    /// Network the wallet is currently on.
    fn chain_id(&self) -> impl Future<Output = Result<u64>> + Send;

    fn switch_chain(&self, chain_id: u64) -> impl Future<Output = Result<()>> + Send;

    /// Ask the wallet to sign and submit `call` from `from`.
    fn send(&self, from: Address, call: WriteCall) -> impl Future<Output = Result<TxHash>> + Send;

    /// Receipt of a submitted transaction, `None` while still pending.
    fn receipt(&self, hash: TxHash) -> impl Future<Output = Result<Option<Receipt>>> + Send;
}

pub trait LogSource: Send + Sync + 'static {
    /// Latest block number on the network.
    fn block_number(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Logs emitted by the PocketGrant contract in `[from, to]` whose first
    /// topic is any of `topics`.
    fn grant_logs(
        &self,
        from: u64,
        to: u64,
        topics: &[[u8; 32]],
    ) -> impl Future<Output = Result<Vec<Log>>> + Send;
}
