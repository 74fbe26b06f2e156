use std::time::Duration;

use chain::{Stake, MIN_STAKE};
use protocol::{AuthPreamble, Command, Packet};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{
    error_json, error_json_with_id, ERR_DISABLED, ERR_NO_CONSENSUS, ERR_NO_NODES,
    ERR_NO_RESPONSE, ERR_NO_STAKE,
};
use crate::peers::rate_key;
use crate::plugins::PluginExecutor;
use crate::{XRouterApp, SEND_RETRY_WAIT};

/// First payload that holds a strict majority (`> confirmations / 2`)
/// of the response list, scanning in arrival order.
pub(crate) fn majority_reply(responses: &[String], confirmations: usize) -> Option<&String> {
    for candidate in responses {
        let count = responses.iter().filter(|r| *r == candidate).count();
        if count > confirmations / 2 {
            return Some(candidate);
        }
    }
    None
}

fn errorcode_of(reply: &str) -> Option<i64> {
    let value: Value = serde_json::from_str(reply).ok()?;
    match value.get("errorcode")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl XRouterApp {
    /// Sends a signed query to `confirmations` eligible service nodes
    /// and returns the consensus reply, or an error object.
    ///
    /// The result is always a JSON string: the winning payload
    /// verbatim, or `{"error": ..., "uuid"?: ...}`.
    pub async fn call(
        &self,
        command: Command,
        currency: &str,
        args: &[&str],
        confirmations: usize,
    ) -> String {
        let settings = self.settings_snapshot();
        if !settings.xrouter_enabled() {
            return error_json(ERR_DISABLED);
        }
        let confirmations = confirmations.max(1);
        self.update_configs().await;

        let Some(stake) = self.wallet.find_stake(MIN_STAKE).await else {
            return error_json(ERR_NO_STAKE);
        };

        let id = protocol::new_query_id();
        let packet = match self.build_signed_packet(command, &id, currency, args, &stake) {
            Ok(packet) => packet,
            Err(reply) => return reply,
        };

        let selected = self.peers.select_for_command(command, currency);
        if selected.len() < confirmations {
            return error_json(ERR_NO_NODES);
        }

        let mut waiter = self.queries.register(&id, confirmations);
        let key = rate_key(command, currency);
        let wire = packet.into_wire();
        for addr in selected.iter().take(confirmations) {
            if let Err(err) = self.transport.send(addr, wire.clone()).await {
                warn!(peer = %addr, error = %err, "query send failed");
            }
            self.peers.mark_sent(addr, &key);
            debug!(peer = %addr, query = %id, %command, "query sent");
        }

        // The wait is cumulative: up to `confirmations` full slices.
        let wait = Duration::from_millis(settings.wait_ms());
        let mut woken = 0;
        while woken < confirmations {
            if !waiter.next_response(wait).await {
                break;
            }
            woken += 1;
        }

        let responses = self.queries.responses(&id);
        self.queries.complete(&id);

        if responses.len() <= confirmations / 2 {
            return error_json_with_id(ERR_NO_RESPONSE, &id);
        }
        match majority_reply(&responses, confirmations) {
            Some(reply) => reply.clone(),
            None => error_json(ERR_NO_CONSENSUS),
        }
    }

    fn build_signed_packet(
        &self,
        command: Command,
        id: &str,
        currency: &str,
        args: &[&str],
        stake: &Stake,
    ) -> Result<Packet, String> {
        let mut packet = Packet::new(command);
        packet.append_preamble(&AuthPreamble {
            utxo_tx_hash: stake.tx_hash,
            utxo_vout: stake.vout,
        });
        packet.append_str(id);
        packet.append_str(currency);
        for arg in args {
            if !arg.is_empty() {
                packet.append_str(arg);
            }
        }
        packet.sign(&stake.key).map_err(|err| error_json(&err.to_string()))?;
        Ok(packet)
    }

    pub async fn get_block_count(&self, currency: &str, confirmations: usize) -> String {
        self.call(Command::GetBlockCount, currency, &[], confirmations)
            .await
    }

    pub async fn get_block_hash(
        &self,
        currency: &str,
        block_id: &str,
        confirmations: usize,
    ) -> String {
        self.call(Command::GetBlockHash, currency, &[block_id], confirmations)
            .await
    }

    pub async fn get_block(
        &self,
        currency: &str,
        block_hash: &str,
        confirmations: usize,
    ) -> String {
        self.call(Command::GetBlock, currency, &[block_hash], confirmations)
            .await
    }

    pub async fn get_transaction(
        &self,
        currency: &str,
        tx_hash: &str,
        confirmations: usize,
    ) -> String {
        self.call(Command::GetTransaction, currency, &[tx_hash], confirmations)
            .await
    }

    pub async fn get_all_blocks(
        &self,
        currency: &str,
        from: i64,
        confirmations: usize,
    ) -> String {
        let from = from.to_string();
        self.call(Command::GetAllBlocks, currency, &[&from], confirmations)
            .await
    }

    pub async fn get_all_transactions(
        &self,
        currency: &str,
        account: &str,
        blocks: i64,
        confirmations: usize,
    ) -> String {
        let blocks = blocks.to_string();
        self.call(
            Command::GetAllTransactions,
            currency,
            &[account, &blocks],
            confirmations,
        )
        .await
    }

    pub async fn get_balance(
        &self,
        currency: &str,
        account: &str,
        confirmations: usize,
    ) -> String {
        self.call(Command::GetBalance, currency, &[account], confirmations)
            .await
    }

    pub async fn get_balance_update(
        &self,
        currency: &str,
        account: &str,
        blocks: i64,
        confirmations: usize,
    ) -> String {
        let blocks = blocks.to_string();
        self.call(
            Command::GetBalanceUpdate,
            currency,
            &[account, &blocks],
            confirmations,
        )
        .await
    }

    pub async fn get_transactions_bloom_filter(
        &self,
        currency: &str,
        blocks: i64,
        filter_hex: &str,
        confirmations: usize,
    ) -> String {
        let blocks = blocks.to_string();
        self.call(
            Command::GetTransactionsBloomFilter,
            currency,
            &[&blocks, filter_hex],
            confirmations,
        )
        .await
    }

    /// Broadcasts a raw transaction through one service node at a time.
    /// A reply carrying a negative `errorcode` (daemon rejection) moves
    /// on to the next eligible peer, reusing the same query id.
    pub async fn send_transaction(&self, currency: &str, raw_tx: &str) -> String {
        let settings = self.settings_snapshot();
        if !settings.xrouter_enabled() {
            return error_json(ERR_DISABLED);
        }
        self.update_configs().await;

        let Some(stake) = self.wallet.find_stake(MIN_STAKE).await else {
            return error_json(ERR_NO_STAKE);
        };

        let id = protocol::new_query_id();
        let packet = match self.build_signed_packet(
            Command::SendTransaction,
            &id,
            currency,
            &[raw_tx],
            &stake,
        ) {
            Ok(packet) => packet,
            Err(reply) => return reply,
        };

        let selected = self
            .peers
            .select_for_command(Command::SendTransaction, currency);
        if selected.is_empty() {
            return error_json(ERR_NO_NODES);
        }

        let mut waiter = self.queries.register(&id, 1);
        let key = rate_key(Command::SendTransaction, currency);
        let wire = packet.into_wire();
        for addr in &selected {
            if let Err(err) = self.transport.send(addr, wire.clone()).await {
                warn!(peer = %addr, error = %err, "broadcast send failed");
            }
            self.peers.mark_sent(addr, &key);

            if !waiter.next_response(SEND_RETRY_WAIT).await {
                continue;
            }
            let responses = self.queries.responses(&id);
            let Some(reply) = responses.first() else {
                continue;
            };
            if matches!(errorcode_of(reply), Some(code) if code < 0) {
                debug!(peer = %addr, query = %id, "daemon rejected transaction; trying next peer");
                self.queries.clear_responses(&id);
                continue;
            }
            let reply = reply.clone();
            self.queries.complete(&id);
            return reply;
        }

        self.queries.complete(&id);
        error_json_with_id(ERR_NO_RESPONSE, &id)
    }

    /// Invokes a named plugin. A plugin hosted locally runs without any
    /// network round-trip; otherwise the call goes to a single service
    /// node advertising it.
    pub async fn send_custom_call(&self, name: &str, params: &[&str]) -> String {
        let settings = self.settings_snapshot();
        if !settings.xrouter_enabled() {
            return error_json(ERR_DISABLED);
        }

        let owned: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        if let Some(plugin) = settings.plugin_settings(name) {
            return self.executor.run(plugin, &owned).await;
        }

        self.update_configs().await;

        let Some(stake) = self.wallet.find_stake(MIN_STAKE).await else {
            return error_json(ERR_NO_STAKE);
        };

        let Some(addr) = self.peers.select_for_plugin(name) else {
            return error_json(ERR_NO_NODES);
        };
        let plugin = self
            .peers
            .settings_of(&addr)
            .and_then(|remote| remote.plugin_settings(name).cloned());
        let Some(plugin) = plugin else {
            return error_json(ERR_NO_NODES);
        };
        if let Err(reply) = PluginExecutor::check_arity(&plugin, params.len()) {
            return reply;
        }

        let id = protocol::new_query_id();
        let mut packet = Packet::new(Command::CustomCall);
        packet.append_preamble(&AuthPreamble {
            utxo_tx_hash: stake.tx_hash,
            utxo_vout: stake.vout,
        });
        packet.append_str(&id);
        packet.append_str(name);
        for param in &owned {
            packet.append_str(param);
        }
        if let Err(err) = packet.sign(&stake.key) {
            return error_json(&err.to_string());
        }

        let mut waiter = self.queries.register(&id, 1);
        self.peers.mark_sent(&addr, name);
        if let Err(err) = self.transport.send(&addr, packet.into_wire()).await {
            warn!(peer = %addr, error = %err, "custom call send failed");
        }

        let wait = Duration::from_millis(settings.wait_ms());
        if waiter.next_response(wait).await {
            if let Some(reply) = self.queries.responses(&id).first() {
                let reply = reply.clone();
                self.queries.complete(&id);
                return reply;
            }
        }
        self.queries.complete(&id);
        error_json_with_id(ERR_NO_RESPONSE, &id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replies(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn unanimous_majority_wins() {
        let responses = replies(&["{\"result\":42}", "{\"result\":42}"]);
        assert_eq!(
            majority_reply(&responses, 2),
            Some(&"{\"result\":42}".to_string())
        );
    }

    #[test]
    fn two_of_three_is_a_majority() {
        let responses = replies(&["{\"result\":42}", "{\"result\":43}", "{\"result\":42}"]);
        assert_eq!(
            majority_reply(&responses, 3),
            Some(&"{\"result\":42}".to_string())
        );
    }

    #[test]
    fn an_even_split_has_no_majority() {
        let responses = replies(&["A", "B", "A", "B"]);
        assert_eq!(majority_reply(&responses, 4), None);
    }

    #[test]
    fn scan_order_is_arrival_order_but_counts_decide() {
        // "B" arrived first but only "A" clears the threshold.
        let responses = replies(&["B", "A", "A"]);
        assert_eq!(majority_reply(&responses, 3), Some(&"A".to_string()));
    }

    #[test]
    fn single_confirmation_accepts_the_only_reply() {
        let responses = replies(&["A"]);
        assert_eq!(majority_reply(&responses, 1), Some(&"A".to_string()));
    }

    #[test]
    fn errorcode_parses_numbers_and_numeric_strings() {
        assert_eq!(errorcode_of("{\"errorcode\": -26}"), Some(-26));
        assert_eq!(errorcode_of("{\"errorcode\": \"-100\"}"), Some(-100));
        assert_eq!(errorcode_of("{\"result\": \"txid\"}"), None);
        assert_eq!(errorcode_of("not json"), None);
    }
}
