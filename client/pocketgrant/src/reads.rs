//! Read hooks: cached, de-duplicated contract queries.
//!
//! A [`ReadHook`] maps a query key to the latest [`ReadState`]. Concurrent
//! `get`s for the same key share a single in-flight request. `refetch` always
//! goes back to the chain, and every request is stamped with a sequence number
//! so that a slow, older response can never overwrite a newer one.
//!
//! [`Reads`] bundles one hook per query the flows need.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::chain::{GrantReader, Wallet};
use crate::errors::Result;
use crate::types::{Address, ClaimCheck, Program};

/// Observable state of one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum ReadState<T> {
    /// A required input (usually the wallet) is missing; nothing was requested.
    Disabled,
    Loading,
    Loaded(T),
    Errored(String),
}

impl<T> ReadState<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            ReadState::Loaded(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, ReadState::Loaded(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ReadState<U> {
        match self {
            ReadState::Disabled => ReadState::Disabled,
            ReadState::Loading => ReadState::Loading,
            ReadState::Loaded(v) => ReadState::Loaded(f(v)),
            ReadState::Errored(e) => ReadState::Errored(e),
        }
    }
}

type Cell<V> = Arc<OnceCell<std::result::Result<V, String>>>;

struct Slot<V> {
    /// Sequence number of the request owning `cell`.
    seq: u64,
    cell: Cell<V>,
    /// Latest settled state and the sequence number that produced it.
    settled: Option<(u64, ReadState<V>)>,
}

pub struct ReadHook<K, V> {
    name: &'static str,
    slots: Mutex<HashMap<K, Slot<V>>>,
    next_seq: AtomicU64,
}

impl<K, V> ReadHook<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Slot<V>>> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached value for `key`, fetching it if nothing usable is cached.
    /// `None` short-circuits to [`ReadState::Disabled`].
    pub async fn get<F, Fut>(&self, key: Option<K>, fetch: F) -> ReadState<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let Some(key) = key else {
            return ReadState::Disabled;
        };
        let (seq, cell) = self.claim_cell(&key, false);
        self.resolve(key, seq, cell, fetch).await
    }

    /// Always issue a fresh request for `key`.
    pub async fn refetch<F, Fut>(&self, key: Option<K>, fetch: F) -> ReadState<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let Some(key) = key else {
            return ReadState::Disabled;
        };
        let (seq, cell) = self.claim_cell(&key, true);
        self.resolve(key, seq, cell, fetch).await
    }

    /// Current state without fetching.
    pub fn peek(&self, key: &K) -> ReadState<V> {
        match self.lock().get(key) {
            None => ReadState::Loading,
            Some(slot) => match &slot.settled {
                Some((_, state)) => state.clone(),
                None => ReadState::Loading,
            },
        }
    }

    /// Reuse the current cell unless a fresh one is forced or the cached
    /// result is an error.
    fn claim_cell(&self, key: &K, fresh: bool) -> (u64, Cell<V>) {
        let mut slots = self.lock();
        if let Some(slot) = slots.get(key) {
            let errored = matches!(slot.cell.get(), Some(Err(_)));
            if !fresh && !errored {
                return (slot.seq, slot.cell.clone());
            }
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let cell: Cell<V> = Arc::new(OnceCell::new());
        let settled = slots.remove(key).and_then(|s| s.settled);
        slots.insert(
            key.clone(),
            Slot {
                seq,
                cell: cell.clone(),
                settled,
            },
        );
        (seq, cell)
    }

    async fn resolve<F, Fut>(&self, key: K, seq: u64, cell: Cell<V>, fetch: F) -> ReadState<V>
    where
        F: FnOnce(K) -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let name = self.name;
        let fetch_key = key.clone();
        let result = cell
            .get_or_init(|| async move {
                debug!(hook = name, key = ?fetch_key, seq, "read");
                fetch(fetch_key).await.map_err(|e| e.to_string())
            })
            .await;
        let state = match result {
            Ok(v) => ReadState::Loaded(v.clone()),
            Err(e) => ReadState::Errored(e.clone()),
        };
        self.settle(&key, seq, state)
    }

    /// Record `state` unless a newer request already settled; return whatever
    /// is now current.
    fn settle(&self, key: &K, seq: u64, state: ReadState<V>) -> ReadState<V> {
        let mut slots = self.lock();
        let Some(slot) = slots.get_mut(key) else {
            return state;
        };
        match &slot.settled {
            Some((settled_seq, current)) if *settled_seq > seq => {
                debug!(hook = self.name, key = ?key, seq, newer = settled_seq, "stale read discarded");
                current.clone()
            }
            _ => {
                slot.settled = Some((seq, state.clone()));
                state
            }
        }
    }
}

// ─────────────────────────────────────────────────────────
// Query bundle
// ─────────────────────────────────────────────────────────

type ProgramWallet = (u64, Address);

/// Every read the flows and views use, over one chain client.
pub struct Reads<C> {
    chain: Arc<C>,
    program: ReadHook<u64, Program>,
    can_claim: ReadHook<ProgramWallet, ClaimCheck>,
    has_claimed: ReadHook<ProgramWallet, bool>,
    is_verified: ReadHook<ProgramWallet, bool>,
    program_count: ReadHook<(), u64>,
    admin: ReadHook<(), Address>,
    is_verifier: ReadHook<Address, bool>,
    global_paused: ReadHook<(), bool>,
    balance: ReadHook<Address, u128>,
    allowance: ReadHook<Address, u128>,
    decimals: ReadHook<(), u8>,
    symbol: ReadHook<(), String>,
    wallet_chain: ReadHook<(), u64>,
    /// `(program, wallet)` pairs that have been seen as claimed this session.
    claimed_latch: Mutex<HashSet<ProgramWallet>>,
}

impl<C: GrantReader + Wallet> Reads<C> {
    pub fn new(chain: Arc<C>) -> Self {
        Self {
            chain,
            program: ReadHook::new("program"),
            can_claim: ReadHook::new("can_claim"),
            has_claimed: ReadHook::new("has_claimed"),
            is_verified: ReadHook::new("is_verified"),
            program_count: ReadHook::new("program_count"),
            admin: ReadHook::new("admin"),
            is_verifier: ReadHook::new("is_verifier"),
            global_paused: ReadHook::new("global_paused"),
            balance: ReadHook::new("balance"),
            allowance: ReadHook::new("allowance"),
            decimals: ReadHook::new("decimals"),
            symbol: ReadHook::new("symbol"),
            wallet_chain: ReadHook::new("wallet_chain"),
            claimed_latch: Mutex::new(HashSet::new()),
        }
    }

    pub fn chain(&self) -> &Arc<C> {
        &self.chain
    }

    pub async fn program(&self, id: u64, fresh: bool) -> ReadState<Program> {
        let chain = &self.chain;
        let fetch = |id| chain.get_program(id);
        if fresh {
            self.program.refetch(Some(id), fetch).await
        } else {
            self.program.get(Some(id), fetch).await
        }
    }

    pub async fn can_claim(&self, id: u64, wallet: Option<Address>, fresh: bool) -> ReadState<ClaimCheck> {
        let chain = &self.chain;
        let key = wallet.map(|w| (id, w));
        let fetch = |(id, w)| chain.can_claim(id, w);
        if fresh {
            self.can_claim.refetch(key, fetch).await
        } else {
            self.can_claim.get(key, fetch).await
        }
    }

    /// Claim record, latched: once `true` for a pair it stays `true`.
    pub async fn has_claimed(&self, id: u64, wallet: Option<Address>, fresh: bool) -> ReadState<bool> {
        let chain = &self.chain;
        let key = wallet.map(|w| (id, w));
        let fetch = |(id, w)| chain.has_claimed(id, w);
        let state = if fresh {
            self.has_claimed.refetch(key, fetch).await
        } else {
            self.has_claimed.get(key, fetch).await
        };
        let Some(key) = key else {
            return state;
        };
        let mut latch = self.claimed_latch.lock().unwrap_or_else(|e| e.into_inner());
        if state == ReadState::Loaded(true) {
            latch.insert(key);
        }
        if latch.contains(&key) {
            ReadState::Loaded(true)
        } else {
            state
        }
    }

    pub async fn is_verified(&self, id: u64, wallet: Option<Address>, fresh: bool) -> ReadState<bool> {
        let chain = &self.chain;
        let key = wallet.map(|w| (id, w));
        let fetch = |(id, w)| chain.is_verified(id, w);
        if fresh {
            self.is_verified.refetch(key, fetch).await
        } else {
            self.is_verified.get(key, fetch).await
        }
    }

    pub async fn program_count(&self, fresh: bool) -> ReadState<u64> {
        let chain = &self.chain;
        let fetch = |()| chain.program_count();
        if fresh {
            self.program_count.refetch(Some(()), fetch).await
        } else {
            self.program_count.get(Some(()), fetch).await
        }
    }

    pub async fn admin(&self) -> ReadState<Address> {
        let chain = &self.chain;
        self.admin.get(Some(()), |()| chain.admin()).await
    }

    pub async fn is_verifier(&self, account: Option<Address>, fresh: bool) -> ReadState<bool> {
        let chain = &self.chain;
        let fetch = |a| chain.is_verifier(a);
        if fresh {
            self.is_verifier.refetch(account, fetch).await
        } else {
            self.is_verifier.get(account, fetch).await
        }
    }

    pub async fn global_paused(&self, fresh: bool) -> ReadState<bool> {
        let chain = &self.chain;
        let fetch = |()| chain.global_paused();
        if fresh {
            self.global_paused.refetch(Some(()), fetch).await
        } else {
            self.global_paused.get(Some(()), fetch).await
        }
    }

    pub async fn balance(&self, owner: Option<Address>, fresh: bool) -> ReadState<u128> {
        let chain = &self.chain;
        let fetch = |o| chain.balance_of(o);
        if fresh {
            self.balance.refetch(owner, fetch).await
        } else {
            self.balance.get(owner, fetch).await
        }
    }

    pub async fn allowance(&self, owner: Option<Address>, fresh: bool) -> ReadState<u128> {
        let chain = &self.chain;
        let fetch = |o| chain.allowance(o);
        if fresh {
            self.allowance.refetch(owner, fetch).await
        } else {
            self.allowance.get(owner, fetch).await
        }
    }

    pub async fn decimals(&self) -> ReadState<u8> {
        let chain = &self.chain;
        self.decimals.get(Some(()), |()| chain.token_decimals()).await
    }

    pub async fn symbol(&self) -> ReadState<String> {
        let chain = &self.chain;
        self.symbol.get(Some(()), |()| chain.token_symbol()).await
    }

    /// Network the wallet is on; disabled when no wallet is connected.
    pub async fn wallet_chain(&self, wallet: Option<Address>, fresh: bool) -> ReadState<u64> {
        let chain = &self.chain;
        let key = wallet.map(|_| ());
        let fetch = |()| Wallet::chain_id(chain.as_ref());
        if fresh {
            self.wallet_chain.refetch(key, fetch).await
        } else {
            self.wallet_chain.get(key, fetch).await
        }
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
