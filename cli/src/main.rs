use std::fs;
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use btcscope_core::block::{parse_block_file, xor_decode};
use btcscope_core::envelope::{analyze_transaction, PrevoutInput, TxAnalysis};
use btcscope_core::error::CoreError;

/// Transaction-mode fixture, or `--block <blk> <rev> <xor>` for block mode.
#[derive(Parser)]
#[command(name = "btcscope")]
#[command(about = "Bitcoin transaction and block analysis")]
struct Cli {
    /// Transaction-mode fixture path
    fixture: Option<PathBuf>,

    /// Block mode: blk*.dat, rev*.dat, xor.dat (in that order)
    #[arg(long = "block", num_args = 3, value_names = ["BLK", "REV", "XOR"])]
    block: Option<Vec<PathBuf>>,
}

#[derive(Debug, Error)]
enum CliError {
    #[error("{0}")]
    InvalidArgs(String),
    #[error("{0}")]
    InvalidFixture(String),
    #[error(transparent)]
    Tx(#[from] CoreError),
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgs(_) => "INVALID_ARGS",
            CliError::InvalidFixture(_) => "INVALID_FIXTURE",
            CliError::Tx(_) => "INVALID_TX",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: ErrorBody,
}

fn error_envelope(code: &str, message: &str) -> ErrorEnvelope {
    ErrorEnvelope {
        ok: false,
        error: ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
        },
    }
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(default = "default_network")]
    network: String,
    raw_tx: String,
    #[serde(default)]
    prevouts: Vec<FixturePrevout>,
}

fn default_network() -> String {
    "mainnet".to_string()
}

#[derive(Deserialize)]
struct FixturePrevout {
    txid: String,
    vout: u32,
    value_sats: u64,
    script_pubkey_hex: String,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let exit_code = match (&cli.fixture, &cli.block) {
        (Some(_), Some(_)) => {
            run_tx_error(CliError::InvalidArgs(
                "transaction fixture and --block are mutually exclusive".to_string(),
            ))
        }
        (None, None) => run_tx_error(CliError::InvalidArgs("no arguments provided".to_string())),
        (Some(fixture_path), None) => run_transaction_mode(fixture_path),
        (None, Some(paths)) => run_block_mode(&paths[0], &paths[1], &paths[2]),
    };

    std::process::exit(exit_code);
}

fn run_tx_error(err: CliError) -> i32 {
    let envelope = error_envelope(err.code(), &err.to_string());
    println!("{}", serde_json::to_string(&envelope).expect("error envelope serializes"));
    1
}

fn run_transaction_mode(fixture_path: &PathBuf) -> i32 {
    match handle_transaction_mode(fixture_path) {
        Ok(()) => 0,
        Err(err) => run_tx_error(err),
    }
}

fn handle_transaction_mode(fixture_path: &PathBuf) -> Result<(), CliError> {
    let raw_fixture = fs::read_to_string(fixture_path)
        .map_err(|e| CliError::InvalidFixture(format!("{}: {e}", fixture_path.display())))?;
    let fixture: Fixture =
        serde_json::from_str(&raw_fixture).map_err(|e| CliError::InvalidFixture(e.to_string()))?;

    if fixture.raw_tx.is_empty() {
        return Err(CliError::InvalidFixture("missing raw_tx in fixture".to_string()));
    }

    let raw = hex::decode(&fixture.raw_tx).map_err(|e| CoreError::from(e))?;
    let prevouts: Vec<PrevoutInput> = fixture
        .prevouts
        .into_iter()
        .map(|p| PrevoutInput {
            txid: p.txid,
            vout: p.vout,
            value_sats: p.value_sats,
            script_pubkey_hex: p.script_pubkey_hex,
        })
        .collect();

    let result: TxAnalysis = analyze_transaction(&raw, &prevouts, &fixture.network)?;

    fs::create_dir_all("out").map_err(CoreError::from)?;
    let out_path = format!("out/{}.json", result.txid);
    let pretty = serde_json::to_string_pretty(&result).expect("tx analysis serializes");
    fs::write(&out_path, &pretty).map_err(CoreError::from)?;
    log::info!("wrote {out_path}");

    println!("{pretty}");
    Ok(())
}

fn run_block_mode(blk_path: &PathBuf, rev_path: &PathBuf, xor_path: &PathBuf) -> i32 {
    match handle_block_mode(blk_path, rev_path, xor_path) {
        Ok(()) => 0,
        Err(message) => {
            let envelope = error_envelope("BLOCK_PARSE_ERROR", &message);
            eprintln!("{}", serde_json::to_string(&envelope).expect("error envelope serializes"));
            1
        }
    }
}

fn handle_block_mode(blk_path: &PathBuf, rev_path: &PathBuf, xor_path: &PathBuf) -> Result<(), String> {
    let xor_key = fs::read(xor_path).map_err(|e| e.to_string())?;
    let blk_raw = fs::read(blk_path).map_err(|e| e.to_string())?;
    let rev_raw = fs::read(rev_path).map_err(|e| e.to_string())?;

    let blk_data = xor_decode(&blk_raw, &xor_key);
    let rev_data = xor_decode(&rev_raw, &xor_key);

    fs::create_dir_all("out").map_err(|e| e.to_string())?;

    let summaries = parse_block_file(&blk_data, &rev_data, |block_result| {
        let out_path = format!("out/{}.json", block_result.block_header.block_hash);
        let body = serde_json::to_string(block_result).expect("block result serializes");
        fs::write(&out_path, body).map_err(CoreError::from)?;
        log::info!("wrote {out_path}");
        Ok(())
    })
    .map_err(|e| e.to_string())?;

    log::info!("processed {} blocks", summaries.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_defaults_network_to_mainnet() {
        let fixture: Fixture = serde_json::from_str(r#"{"raw_tx": "00"}"#).unwrap();
        assert_eq!(fixture.network, "mainnet");
        assert!(fixture.prevouts.is_empty());
    }

    #[test]
    fn fixture_honors_explicit_network_and_prevouts() {
        let fixture: Fixture = serde_json::from_str(
            r#"{"network": "testnet", "raw_tx": "00", "prevouts": [
                {"txid": "aa", "vout": 0, "value_sats": 100, "script_pubkey_hex": "51"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(fixture.network, "testnet");
        assert_eq!(fixture.prevouts.len(), 1);
    }

    #[test]
    fn error_codes_map_to_spec_strings() {
        assert_eq!(CliError::InvalidArgs("x".into()).code(), "INVALID_ARGS");
        assert_eq!(CliError::InvalidFixture("x".into()).code(), "INVALID_FIXTURE");
        assert_eq!(
            CliError::Tx(CoreError::VarintOverflow).code(),
            "INVALID_TX"
        );
    }
}
