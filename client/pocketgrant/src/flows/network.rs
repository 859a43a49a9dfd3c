//! Switching the connected wallet onto the required network.

use tracing::info;

use super::FlowEnv;
use crate::chain::{GrantReader, Wallet};
use crate::classify::ErrorClass;
use crate::context::Locale;
use crate::errors::Result;
use crate::notify::NotificationKind;
use crate::reads::ReadState;

pub const SWITCH_KEY: &str = "switch-network";

fn pending_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Switching network...",
        Locale::Id => "Mengganti jaringan...",
    }
}

fn success_message(locale: Locale) -> &'static str {
    match locale {
        Locale::En => "Network switched",
        Locale::Id => "Jaringan berhasil diganti",
    }
}

/// Ask the wallet to move to the configured chain, then re-read the wallet
/// network so guards see the change. Returns the re-read chain id.
pub async fn switch_network<C: GrantReader + Wallet>(env: &FlowEnv<C>) -> Result<ReadState<u64>> {
    let wallet = env.wallet_required().await?;
    let notifications = &env.ctx.notifications;
    let locale = env.ctx.locale;
    let required = env.ctx.config.chain_id;

    notifications.show(SWITCH_KEY, NotificationKind::Loading, pending_message(locale));
    if let Err(e) = env.chain().switch_chain(required).await {
        let class = ErrorClass::classify(&e.to_string());
        notifications.show(SWITCH_KEY, NotificationKind::Error, class.message(locale));
        return Err(e);
    }

    let chain = env.reads.wallet_chain(Some(wallet), true).await;
    info!(required, state = ?chain, "wallet network switched");
    if chain == ReadState::Loaded(required) {
        notifications.show(SWITCH_KEY, NotificationKind::Success, success_message(locale));
    } else {
        notifications.dismiss(SWITCH_KEY);
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::env;
    use super::*;
    use crate::errors::ClientError;
    use crate::guards;
    use crate::testutil::CHAIN_ID;

    #[tokio::test]
    async fn switches_and_rereads() {
        let (chain, env) = env();
        chain.set_wallet_chain(1);
        let before = env.snapshot(env.wallet().await.unwrap(), None, None, false).await;
        assert!(guards::wrong_network(&before));
        assert_eq!(guards::available_actions(&before), vec![guards::Action::SwitchNetwork]);

        assert_eq!(switch_network(&env).await.unwrap(), ReadState::Loaded(CHAIN_ID));
        let after = env.snapshot(env.wallet().await.unwrap(), None, None, false).await;
        assert!(!guards::wrong_network(&after));

        let note = env.ctx.notifications.get(SWITCH_KEY).unwrap();
        assert_eq!(note.kind, NotificationKind::Success);
    }

    #[tokio::test]
    async fn rejection_is_reported() {
        let (chain, env) = env();
        chain.set_wallet_chain(1);
        chain.fail_next_send("User rejected the request");

        assert!(matches!(switch_network(&env).await, Err(ClientError::Rpc { code: 4001, .. })));
        let note = env.ctx.notifications.get(SWITCH_KEY).unwrap();
        assert_eq!(note.kind, NotificationKind::Error);
        assert_eq!(note.message, "Transaction cancelled");
    }

    #[tokio::test]
    async fn needs_a_wallet() {
        let (chain, env) = env();
        chain.set_account(None);
        assert!(matches!(switch_network(&env).await, Err(ClientError::WalletUnavailable)));
        assert!(env.ctx.notifications.get(SWITCH_KEY).is_none());
    }
}
