//! Gas sponsorship.

use crate::types::{Capabilities, PaymasterService, WriteCall};

/// Attach paymaster capabilities when a sponsorship endpoint is configured.
/// Without one the call is returned unchanged and will be paid by the sender.
pub fn with_paymaster(mut call: WriteCall, paymaster_url: Option<&str>) -> WriteCall {
    match paymaster_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => {
            call.capabilities = Some(Capabilities {
                paymaster_service: PaymasterService { url: url.to_string() },
            });
            call
        }
        None => call,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn call() -> WriteCall {
        WriteCall::new(Address([7; 20]), vec![0xde, 0xad])
    }

    #[test]
    fn unchanged_without_endpoint() {
        assert_eq!(with_paymaster(call(), None), call());
        assert_eq!(with_paymaster(call(), Some("  ")), call());
    }

    #[test]
    fn attaches_paymaster_capability() {
        let sponsored = with_paymaster(call(), Some("https://paymaster.example/rpc"));
        assert_eq!(sponsored.to, call().to);
        assert_eq!(sponsored.data, call().data);
        let json = serde_json::to_value(sponsored.capabilities.unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "paymasterService": { "url": "https://paymaster.example/rpc" } })
        );
    }
}
