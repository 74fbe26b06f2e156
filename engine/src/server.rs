use std::time::Duration;

use chain::verify_block_requirement;
use protocol::{Command, Packet};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::config_exchange::config_envelope;
use crate::error::{error_json, ERR_NO_PLUGIN};
use crate::peers::rate_key;
use crate::{XRouterApp, CONFIG_RATE_LIMIT};

/// Penalty for packets that fail to parse, verify, or satisfy the
/// stake requirement.
const DOS_BAD_PACKET: u32 = 10;
/// Penalty for requests violating a rate-limit window.
const DOS_RATE_LIMIT: u32 = 100;

impl XRouterApp {
    /// Inbound pipeline for one packet from `peer`.
    ///
    /// Admission failures are never answered: the packet is dropped and
    /// the peer penalized through the transport, so a misbehaving
    /// client only ever observes a timeout.
    pub async fn on_message(&self, peer: &str, bytes: &[u8]) {
        let settings = self.settings_snapshot();
        if !settings.xrouter_enabled() {
            return;
        }
        // The transport only delivers from connected peers.
        self.peers.connected(peer);

        let packet = match Packet::decode(bytes) {
            Ok(packet) => packet,
            Err(err) => {
                warn!(peer, error = %err, "dropping malformed packet");
                self.transport.penalize(peer, DOS_BAD_PACKET);
                return;
            }
        };
        let command = packet.command();

        if command.requires_auth() {
            if !packet.verify() {
                warn!(peer, %command, "unsigned packet or signature error");
                self.transport.penalize(peer, DOS_BAD_PACKET);
                return;
            }
            if let Err(err) = verify_block_requirement(&packet, self.backend.as_ref()).await {
                warn!(peer, %command, error = %err, "block requirement not satisfied");
                self.transport.penalize(peer, DOS_BAD_PACKET);
                return;
            }
        }

        // Decoding guarantees at least two string fields.
        let fields = match packet.strings() {
            Ok(fields) => fields,
            Err(err) => {
                warn!(peer, error = %err, "dropping malformed packet");
                self.transport.penalize(peer, DOS_BAD_PACKET);
                return;
            }
        };
        let query_id = &fields[0];

        match command {
            Command::Reply => {
                debug!(peer, query = %query_id, "got reply");
                self.queries.add_response(query_id, peer, fields[1].clone());
                return;
            }
            Command::ConfigReply => {
                if let Err(err) = self.ingest_config_reply(peer, &fields[1]) {
                    warn!(peer, error = %err, "dropping bad config reply");
                }
                return;
            }
            Command::GetConfig => {
                self.handle_get_config(peer, query_id, &fields[1]).await;
                return;
            }
            _ => {}
        }

        let currency = &fields[1];
        if command != Command::CustomCall && !settings.is_available_command(command, currency) {
            debug!(peer, %command, %currency, "command not offered here; dropping");
            return;
        }
        let args = &fields[2..];

        let reply = if command == Command::CustomCall {
            match settings.plugin_settings(currency) {
                None => error_json(ERR_NO_PLUGIN),
                Some(plugin) => {
                    let window = plugin.timeout();
                    if window >= 0.0
                        && !self
                            .peers
                            .check_receive(peer, currency, Duration::from_secs_f64(window))
                    {
                        warn!(peer, plugin = %currency, "too many requests to plugin");
                        self.transport.penalize(peer, DOS_RATE_LIMIT);
                        return;
                    }
                    self.executor.run(plugin, args).await
                }
            }
        } else {
            let key = rate_key(command, currency);
            let window = settings.command_timeout(command, currency).max(0.0);
            if !self
                .peers
                .check_receive(peer, &key, Duration::from_secs_f64(window))
            {
                warn!(peer, %key, "too many requests of this type");
                self.transport.penalize(peer, DOS_RATE_LIMIT);
                return;
            }
            self.dispatch_connector(command, currency, args).await
        };

        let mut response = Packet::new(Command::Reply);
        response.append_str(query_id);
        response.append_str(&reply);
        if let Err(err) = self.transport.send(peer, response.into_wire()).await {
            warn!(peer, error = %err, "failed to send reply");
        }
    }

    async fn handle_get_config(&self, peer: &str, query_id: &str, target: &str) {
        if !self.peers.check_receive(peer, "GetConfig", CONFIG_RATE_LIMIT) {
            warn!(peer, "too many config requests");
            self.transport.penalize(peer, DOS_BAD_PACKET);
            return;
        }

        let payload = if target == "self" {
            config_envelope(&self.settings_snapshot())
        } else {
            // Forward a cached third-party config if we hold one.
            match self.peers.settings_of(target) {
                Some(remote) => config_envelope(&remote),
                None => {
                    debug!(peer, target, "no cached config for target; dropping");
                    return;
                }
            }
        };

        let mut response = Packet::new(Command::ConfigReply);
        response.append_str(query_id);
        response.append_str(&payload);
        if let Err(err) = self.transport.send(peer, response.into_wire()).await {
            warn!(peer, error = %err, "failed to send config reply");
        }
    }

    async fn dispatch_connector(&self, command: Command, currency: &str, args: &[String]) -> String {
        let Some(connector) = self.connectors.lookup(currency) else {
            let message = format!("No connector for currency {currency}");
            if command == Command::SendTransaction {
                return json!({ "error": message, "errorcode": -100 }).to_string();
            }
            return error_json(&message);
        };

        let outcome = match command {
            Command::GetBlockCount => connector
                .get_block_count()
                .await
                .map(|v| json!({ "result": v }).to_string()),
            Command::GetBlockHash => match arg(args, 0) {
                Ok(block_id) => connector
                    .get_block_hash(block_id)
                    .await
                    .map(|v| json!({ "result": v }).to_string()),
                Err(reply) => return reply,
            },
            Command::GetBlock => match arg(args, 0) {
                Ok(hash) => connector.get_block(hash).await.map(value_to_reply),
                Err(reply) => return reply,
            },
            Command::GetTransaction => match arg(args, 0) {
                Ok(hash) => connector.get_transaction(hash).await.map(value_to_reply),
                Err(reply) => return reply,
            },
            Command::GetAllBlocks => match int_arg(args, 0) {
                Ok(from) => connector.get_all_blocks(from).await.map(value_to_reply),
                Err(reply) => return reply,
            },
            Command::GetAllTransactions => match (arg(args, 0), int_arg(args, 1)) {
                (Ok(account), Ok(blocks)) => connector
                    .get_all_transactions(account, blocks)
                    .await
                    .map(value_to_reply),
                (Err(reply), _) | (_, Err(reply)) => return reply,
            },
            Command::GetBalance => match arg(args, 0) {
                Ok(account) => connector.get_balance(account).await.map(value_to_reply),
                Err(reply) => return reply,
            },
            Command::GetBalanceUpdate => match (arg(args, 0), int_arg(args, 1)) {
                (Ok(account), Ok(blocks)) => connector
                    .get_balance_update(account, blocks)
                    .await
                    .map(value_to_reply),
                (Err(reply), _) | (_, Err(reply)) => return reply,
            },
            Command::GetTransactionsBloomFilter => match (int_arg(args, 0), arg(args, 1)) {
                (Ok(blocks), Ok(filter)) => connector
                    .get_transactions_bloom_filter(blocks, filter)
                    .await
                    .map(value_to_reply),
                (Err(reply), _) | (_, Err(reply)) => return reply,
            },
            Command::SendTransaction => match arg(args, 0) {
                Ok(raw_tx) => connector.send_transaction(raw_tx).await.map(value_to_reply),
                Err(reply) => return reply,
            },
            // Config, reply, and custom kinds never reach this table.
            _ => return error_json("unsupported command"),
        };

        outcome.unwrap_or_else(|err| error_json(&err.to_string()))
    }
}

/// String payloads travel verbatim; everything else as serialized JSON.
fn value_to_reply(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn arg<'a>(args: &'a [String], index: usize) -> Result<&'a str, String> {
    args.get(index)
        .map(String::as_str)
        .ok_or_else(|| error_json("Missing required argument"))
}

fn int_arg(args: &[String], index: usize) -> Result<i64, String> {
    let raw = arg(args, index)?;
    raw.parse()
        .map_err(|_| error_json(&format!("Invalid numeric argument {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_values_pass_through_verbatim() {
        assert_eq!(value_to_reply(json!("425.17")), "425.17");
        assert_eq!(value_to_reply(json!({"result": 1})), "{\"result\":1}");
        assert_eq!(value_to_reply(json!([1, 2])), "[1,2]");
    }

    #[test]
    fn argument_helpers_reject_missing_and_bad_input() {
        let args = vec!["abc".to_string(), "12".to_string()];
        assert_eq!(arg(&args, 0).unwrap(), "abc");
        assert!(arg(&args, 2).is_err());
        assert_eq!(int_arg(&args, 1).unwrap(), 12);
        assert!(int_arg(&args, 0).is_err());
    }
}
