//! Wiring two plugin instances over one logical ledger

use std::sync::Arc;
use tokio::sync::mpsc;
use transfer_core::{ConditionVerifier, PluginConfig, PreimageSha256};

use crate::plugin::Plugin;
use crate::relay::spawn_relay;

/// Build two plugins joined by crossed relay channels
///
/// Each side holds its own registry and expiry timers; they reconcile
/// purely through the relay, matching the "two plugins, one ledger"
/// topology. Both use the default SHA-256 preimage verifier.
pub fn pair_plugins(config_a: PluginConfig, config_b: PluginConfig) -> (Plugin, Plugin) {
    pair_plugins_with_verifier(config_a, config_b, Arc::new(PreimageSha256))
}

/// Build a joined pair sharing a specific condition verifier
pub fn pair_plugins_with_verifier(
    config_a: PluginConfig,
    config_b: PluginConfig,
    verifier: Arc<dyn ConditionVerifier>,
) -> (Plugin, Plugin) {
    let (to_b, inbox_b) = mpsc::channel(config_a.mailbox_capacity);
    let (to_a, inbox_a) = mpsc::channel(config_b.mailbox_capacity);

    let plugin_a = Plugin::with_peer(config_a, Arc::clone(&verifier), Some(to_b));
    let plugin_b = Plugin::with_peer(config_b, verifier, Some(to_a));

    spawn_relay(plugin_a.shared(), inbox_a);
    spawn_relay(plugin_b.shared(), inbox_b);

    (plugin_a, plugin_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::LedgerPlugin;

    #[tokio::test]
    async fn test_paired_plugins_start_disconnected() {
        let (a, b) = pair_plugins(
            PluginConfig::for_account("example.ledger.", "example.ledger.alice"),
            PluginConfig::for_account("example.ledger.", "example.ledger.bob"),
        );

        assert!(!a.is_connected());
        assert!(!b.is_connected());

        a.connect().await.unwrap();
        b.connect().await.unwrap();
        assert!(a.is_connected());
        assert!(b.is_connected());
    }
}
