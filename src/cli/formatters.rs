use crate::chains::{DESTINATION_NATIVE_DECIMALS, DESTINATION_NATIVE_SYMBOL, TokenConfig};
use crate::quote::Quote;
use crate::repository::{PendingTransaction, TransactionRecord};
use crate::saga::{SagaState, TopUpOutcome};
use crate::wallet::DepositLimits;
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn units(value: U256, decimals: u8) -> String {
    format_units(value, decimals).unwrap_or_else(|_| value.to_string())
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_string(rows: &[Vec<String>]) -> String {
    let mut wtr = Writer::from_writer(vec![]);
    for row in rows {
        let _ = wtr.write_record(row);
    }
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

/// Two-column metric/value output shared by the single-record commands.
fn format_metrics(rows: &[(&str, String)], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);
            for (metric, value) in rows {
                table.add_row(vec![Cell::new(metric), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let object: serde_json::Map<_, _> = rows
                .iter()
                .map(|(metric, value)| (metric.to_string(), json!(value)))
                .collect();
            serde_json::to_string_pretty(&object).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut records = vec![vec!["metric".to_string(), "value".to_string()]];
            records.extend(
                rows.iter()
                    .map(|(metric, value)| vec![metric.to_string(), value.clone()]),
            );
            csv_string(&records)
        }
    }
}

pub fn format_quote(quote: &Quote, token: &TokenConfig, format: &OutputFormat) -> String {
    format_metrics(
        &[
            (
                "requested",
                format!(
                    "{} {}",
                    units(quote.requested_amount, DESTINATION_NATIVE_DECIMALS),
                    DESTINATION_NATIVE_SYMBOL
                ),
            ),
            ("requested_wei", quote.requested_amount.to_string()),
            (
                "deposit",
                format!("{} {}", units(quote.source_amount, token.decimals), token.symbol),
            ),
            ("deposit_base_units", quote.source_amount.to_string()),
        ],
        format,
    )
}

pub fn format_estimate(
    source_amount: U256,
    estimate: U256,
    token: &TokenConfig,
    format: &OutputFormat,
) -> String {
    format_metrics(
        &[
            (
                "deposit",
                format!("{} {}", units(source_amount, token.decimals), token.symbol),
            ),
            ("deposit_base_units", source_amount.to_string()),
            (
                "estimated",
                format!(
                    "{} {}",
                    units(estimate, DESTINATION_NATIVE_DECIMALS),
                    DESTINATION_NATIVE_SYMBOL
                ),
            ),
            ("estimated_wei", estimate.to_string()),
        ],
        format,
    )
}

pub fn format_limits(limits: &DepositLimits, token: &TokenConfig, format: &OutputFormat) -> String {
    format_metrics(
        &[
            ("token", token.symbol.clone()),
            ("enabled", limits.enabled.to_string()),
            ("min_deposit", units(limits.min_deposit, token.decimals)),
            ("max_deposit", units(limits.max_deposit, token.decimals)),
        ],
        format,
    )
}

pub fn format_steps(state: &SagaState, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Step", "Status"]);
            for (step, status) in state.statuses() {
                table.add_row(vec![
                    Cell::new(format!("{}. {}", step.id(), state.label(step))),
                    Cell::new(status.as_str()),
                ]);
            }
            let mut out = table.to_string();
            if let Some(error) = state.error() {
                out.push_str(&format!("\nError: {error}"));
            }
            out
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "steps": state
                .statuses()
                .map(|(step, status)| json!({
                    "id": step.id(),
                    "label": state.label(step),
                    "status": status.as_str(),
                }))
                .collect::<Vec<_>>(),
            "error": state.error(),
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut rows = vec![vec![
                "id".to_string(),
                "label".to_string(),
                "status".to_string(),
            ]];
            rows.extend(state.statuses().map(|(step, status)| {
                vec![
                    step.id().to_string(),
                    state.label(step).to_string(),
                    status.as_str().to_string(),
                ]
            }));
            csv_string(&rows)
        }
    }
}

pub fn format_outcome(outcome: &TopUpOutcome, format: &OutputFormat) -> String {
    format_metrics(
        &[
            ("payment_id", format!("{:?}", outcome.payment_id)),
            (
                "transaction_hash",
                outcome
                    .transaction_hash
                    .map_or("N/A".to_string(), |h| format!("{h:?}")),
            ),
            ("settlement", format!("{:?}", outcome.settlement)),
        ],
        format,
    )
}

pub fn format_pending(
    pending: Option<&PendingTransaction>,
    decimals: u8,
    format: &OutputFormat,
) -> String {
    let Some(pending) = pending else {
        return match format {
            OutputFormat::Json => "null".to_string(),
            _ => "No pending transaction.".to_string(),
        };
    };
    format_metrics(
        &[
            ("payment_id", format!("{:?}", pending.payment_id)),
            ("timestamp", pending.timestamp.to_string()),
            (
                "amount",
                format!("{} {}", units(pending.amount, decimals), pending.token_symbol),
            ),
            ("user", format!("{:?}", pending.user_address)),
            ("source_chain_id", pending.source_chain_id.to_string()),
        ],
        format,
    )
}

pub fn format_history(records: &[TransactionRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if records.is_empty() {
                return "No transactions found.".to_string();
            }
            let mut table = new_table(vec!["Time (ms)", "Amount", "Status", "Payment ID", "Tx Hash"]);
            for record in records {
                table.add_row(vec![
                    Cell::new(record.timestamp),
                    Cell::new(format!(
                        "{} {}",
                        units(record.amount, record.decimals),
                        record.token_symbol
                    )),
                    Cell::new(record.status.as_str()),
                    Cell::new(shorten(&format!("{:?}", record.payment_id))),
                    Cell::new(
                        record
                            .tx_hash
                            .map_or("N/A".to_string(), |h| shorten(&format!("{h:?}"))),
                    ),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut rows = vec![
                [
                    "timestamp",
                    "amount",
                    "amount_base_units",
                    "token",
                    "status",
                    "payment_id",
                    "tx_hash",
                    "source_chain_id",
                ]
                .map(str::to_string)
                .to_vec(),
            ];
            rows.extend(records.iter().map(|r| {
                vec![
                    r.timestamp.to_string(),
                    units(r.amount, r.decimals),
                    r.amount.to_string(),
                    r.token_symbol.clone(),
                    r.status.as_str().to_string(),
                    format!("{:?}", r.payment_id),
                    r.tx_hash.map_or(String::new(), |h| format!("{h:?}")),
                    r.source_chain_id.to_string(),
                ]
            }));
            csv_string(&rows)
        }
    }
}

fn shorten(hash: &str) -> String {
    if hash.len() <= 12 {
        return hash.to_string();
    }
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains::find_token;
    use crate::repository::TransactionStatus;
    use alloy_primitives::{Address, B256};

    fn usdc() -> TokenConfig {
        find_token(8453, "usdc").unwrap()
    }

    #[test]
    fn output_format_parsing() {
        assert_eq!(OutputFormat::from("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::from("csv"), OutputFormat::Csv);
        assert_eq!(OutputFormat::from("anything"), OutputFormat::Table);
    }

    #[test]
    fn quote_json_has_formatted_and_raw_amounts() {
        let quote = Quote {
            requested_amount: U256::from(10u64).pow(U256::from(18u64)),
            source_amount: U256::from(10_200_000u64),
        };
        let out = format_quote(&quote, &usdc(), &OutputFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["deposit"], "10.200000 USDC");
        assert_eq!(value["deposit_base_units"], "10200000");
        assert_eq!(value["requested"], "1.000000000000000000 ROSE");
    }

    #[test]
    fn history_csv_rows() {
        let record = TransactionRecord {
            payment_id: B256::repeat_byte(1),
            timestamp: 42,
            amount: U256::from(1_500_000u64),
            decimals: 6,
            token_symbol: "USDC".to_string(),
            token_address: Address::repeat_byte(2),
            user_address: Address::repeat_byte(3),
            status: TransactionStatus::Completed,
            tx_hash: None,
            source_chain_id: 8453,
        };
        let out = format_history(&[record], &OutputFormat::Csv);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("42,1.500000,1500000,USDC,completed,"));
        assert!(lines[1].ends_with(",,8453"));
    }

    #[test]
    fn empty_outputs() {
        assert_eq!(format_history(&[], &OutputFormat::Table), "No transactions found.");
        assert_eq!(format_pending(None, 6, &OutputFormat::Json), "null");
    }

    #[test]
    fn shorten_keeps_short_strings() {
        assert_eq!(shorten("0x1234"), "0x1234");
        assert_eq!(shorten(&format!("{:?}", B256::repeat_byte(0xab))), "0xabab...abab");
    }
}
