#[macro_use]
mod log;

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use btc_analyzer_core::address::Network;
use btc_analyzer_core::error::ErrorBody;
use btc_analyzer_core::report::{self, TxAnalysisInput};
use btc_analyzer_core::tx::Transaction;
use clap::{Parser, ValueEnum};

const VERSION: &str = "0.1.0";

/// CLI-facing mirror of `btc_analyzer_core::address::Network`, kept separate
/// so the wire enum names stay under clap's control.
#[derive(Clone, Copy, ValueEnum)]
#[value(rename_all = "lowercase")]
enum NetworkArg {
    Mainnet,
    Testnet,
    Regtest,
}

impl From<NetworkArg> for Network {
    fn from(arg: NetworkArg) -> Network {
        match arg {
            NetworkArg::Mainnet => Network::Mainnet,
            NetworkArg::Testnet => Network::Testnet,
            NetworkArg::Regtest => Network::Regtest,
        }
    }
}

#[derive(Parser)]
#[command(name = "btc-analyzer")]
#[command(about = "Analyzes raw Bitcoin transactions and blocks into structured JSON reports")]
#[command(version = VERSION)]
struct Args {
    /// Transaction fixture JSON (network, raw_tx hex, prevouts)
    #[arg(long = "tx", value_hint = clap::ValueHint::FilePath)]
    tx: Option<PathBuf>,

    /// Raw blk*.dat-style block file
    #[arg(long = "block", value_hint = clap::ValueHint::FilePath, requires = "rev")]
    block: Option<PathBuf>,

    /// Matching rev*.dat-style undo file
    #[arg(long = "rev", value_hint = clap::ValueHint::FilePath)]
    rev: Option<PathBuf>,

    /// Hex-encoded XOR de-obfuscation key applied to --block/--rev (empty by default)
    #[arg(long = "xor-key", default_value = "")]
    xor_key: String,

    /// Network whose address version bytes/HRP to encode with
    #[arg(long = "network", value_enum, default_value = "mainnet")]
    network: NetworkArg,

    /// Directory reports are written to
    #[arg(long = "out-dir", default_value = "out")]
    out_dir: PathBuf,

    /// Suppress progress output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    log::set_quiet(args.quiet);

    if args.tx.is_none() && args.block.is_none() {
        anyhow::bail!("one of --tx or --block (with --rev) is required");
    }

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating output directory {}", args.out_dir.display()))?;

    if let Some(tx_path) = &args.tx {
        run_transaction_mode(tx_path, &args.out_dir)?;
    }

    if let Some(block_path) = &args.block {
        let rev_path = args
            .rev
            .as_ref()
            .expect("clap enforces --rev alongside --block");
        run_block_mode(
            block_path,
            rev_path,
            &args.xor_key,
            args.network.into(),
            &args.out_dir,
        )?;
    }

    Ok(())
}

fn run_transaction_mode(tx_path: &PathBuf, out_dir: &PathBuf) -> Result<()> {
    log!("reading transaction fixture {}", tx_path.display());
    let fixture_bytes = fs::read(tx_path)
        .with_context(|| format!("reading fixture {}", tx_path.display()))?;
    let fixture: TxAnalysisInput = serde_json::from_slice(&fixture_bytes)
        .with_context(|| format!("parsing fixture {}", tx_path.display()))?;

    let raw = hex::decode(&fixture.raw_tx).context("raw_tx is not valid hex")?;
    let network = Network::parse(&fixture.network)
        .with_context(|| format!("unknown network {:?} in fixture", fixture.network))?;
    let report_json = match Transaction::parse(&raw).and_then(|tx| {
        report::match_prevouts(&tx, &fixture.prevouts)
            .and_then(|prevouts| report::analyze_transaction(network, &tx, &prevouts))
            .map(|report| (tx, report))
    }) {
        Ok((tx, tx_report)) => {
            let txid = hex::encode(tx.txid());
            let out_path = out_dir.join(format!("{txid}.json"));
            let body = serde_json::to_vec_pretty(&tx_report)?;
            fs::write(&out_path, &body)
                .with_context(|| format!("writing {}", out_path.display()))?;
            log!("wrote {}", out_path.display());
            serde_json::to_string_pretty(&tx_report)?
        }
        Err(err) => {
            let body = ErrorBody::from(&err);
            serde_json::to_string_pretty(&body)?
        }
    };

    println!("{report_json}");
    Ok(())
}

fn run_block_mode(
    block_path: &PathBuf,
    rev_path: &PathBuf,
    xor_key_hex: &str,
    network: Network,
    out_dir: &PathBuf,
) -> Result<()> {
    log!("reading block {}", block_path.display());
    let blk_bytes =
        fs::read(block_path).with_context(|| format!("reading {}", block_path.display()))?;
    log!("reading undo file {}", rev_path.display());
    let rev_bytes =
        fs::read(rev_path).with_context(|| format!("reading {}", rev_path.display()))?;
    let xor_key = hex::decode(xor_key_hex).context("--xor-key is not valid hex")?;

    match report::analyze_block(network, &blk_bytes, &rev_bytes, &xor_key) {
        Ok(reports) => {
            for block_report in &reports {
                let out_path = out_dir.join(format!("{}.json", block_report.header.block_hash));
                let body = serde_json::to_vec_pretty(block_report)?;
                fs::write(&out_path, &body)
                    .with_context(|| format!("writing {}", out_path.display()))?;
                log!("wrote {}", out_path.display());
            }
        }
        Err(err) => {
            let body = ErrorBody::from(&err);
            anyhow::bail!(serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}
