use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use shaker_config::{NATIVE_CURRENCY, ProverMode, ShakerConfig};
use shaker_core::{
    Address, DepositCoordinator, HttpProofBackend, HttpProverConfig, HttpRelayer, JsonRpcChain,
    MockProofBackend, ProofBackend, Session, WithdrawRoute, WithdrawalCoordinator,
    WithdrawalOrder, balance_report, compliance_report,
};
use shaker_privacy::{Note, to_decimals};

/// Options shared by every command
#[derive(Default)]
struct Options {
    config: Option<PathBuf>,
    rpc: Option<String>,
    relayer: Option<String>,
    refund: Option<String>,
    positional: Vec<String>,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        return;
    }

    let cmd = &args[1];
    let options = parse_options(&args[2..]);

    match cmd.as_str() {
        "deposit" => {
            let [currency, amount] = &options.positional[..] else {
                println!("Usage: deposit <currency> <amount>");
                return;
            };
            if let Err(e) = deposit(&options, currency, amount).await {
                eprintln!("❌ Error during deposit: {:#}", e);
                std::process::exit(1);
            }
        }
        "withdraw" => {
            let [note, recipient] = &options.positional[..] else {
                println!("Usage: withdraw <note> <recipient> [--relayer <url>] [--refund <eth>]");
                return;
            };
            if let Err(e) = withdraw(&options, note, recipient).await {
                eprintln!("❌ Error during withdrawal: {:#}", e);
                std::process::exit(1);
            }
        }
        "balance" => {
            let (address, token) = match &options.positional[..] {
                [address] => (address, None),
                [address, token] => (address, Some(token)),
                _ => {
                    println!("Usage: balance <address> [token_address]");
                    return;
                }
            };
            if let Err(e) = balance(&options, address, token.map(String::as_str)).await {
                eprintln!("❌ Error reading balance: {:#}", e);
                std::process::exit(1);
            }
        }
        "compliance" => {
            let [note] = &options.positional[..] else {
                println!("Usage: compliance <note>");
                return;
            };
            if let Err(e) = compliance(&options, note).await {
                eprintln!("❌ Error building compliance report: {:#}", e);
                std::process::exit(1);
            }
        }
        "sample-config" => {
            println!("{}", ShakerConfig::generate_sample());
        }
        "help" | "--help" | "-h" => {
            print_usage();
        }
        _ => {
            println!("❌ Unknown command: {}", cmd);
            println!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!("Shaker CLI - private deposits and withdrawals");
    println!();
    println!("USAGE:");
    println!("  shaker <command> [args] [options]");
    println!();
    println!("COMMANDS:");
    println!("  deposit <currency> <amount>      Deposit into a pool and print the note");
    println!("  withdraw <note> <recipient>      Withdraw a note to an address");
    println!("  balance <address> [token]        Show native and token balance");
    println!("  compliance <note>                Show where a note's funds came from and went");
    println!("  sample-config                    Print a sample config.toml");
    println!("  help                             Show this help message");
    println!();
    println!("OPTIONS:");
    println!("  --config <path>                  Config file (default: ./config.toml, ~/.shaker)");
    println!("  --rpc <url>                      Ethereum JSON-RPC endpoint");
    println!("  --relayer <url>                  Withdraw through a relayer");
    println!("  --refund <eth>                   Native currency sent along with the withdrawal");
    println!();
    println!("EXAMPLES:");
    println!("  shaker deposit eth 0.1");
    println!("  shaker deposit dai 100 --rpc http://localhost:8545");
    println!("  shaker withdraw shaker-eth-0.1-1-0x... 0x8589427373D6D84E98730D7795D8f6f8731FDA16 --relayer https://relayer.example");
    println!("  shaker balance 0x8589427373D6D84E98730D7795D8f6f8731FDA16");
    println!();
    println!("ENVIRONMENT VARIABLES:");
    println!("  SHAKER_CONFIG        Config file path");
    println!("  RPC_URL              Ethereum JSON-RPC endpoint");
    println!("  RELAYER_URL          Default relayer");
    println!("  SENDER_ACCOUNT       Node-managed account for deposits");
    println!("  PROVER_MODE          mock or http");
    println!("  RUST_LOG             Log level (debug/info/warn/error)");
}

fn parse_options(args: &[String]) -> Options {
    let mut options = Options::default();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                options.config = args.get(i + 1).map(PathBuf::from);
                i += 1;
            }
            "--rpc" => {
                options.rpc = args.get(i + 1).cloned();
                i += 1;
            }
            "--relayer" => {
                options.relayer = args.get(i + 1).cloned();
                i += 1;
            }
            "--refund" => {
                options.refund = args.get(i + 1).cloned();
                i += 1;
            }
            other => options.positional.push(other.to_string()),
        }
        i += 1;
    }

    options
}

fn load_config(options: &Options) -> Result<ShakerConfig> {
    let mut config = match &options.config {
        Some(path) => ShakerConfig::load_from(path)?,
        None => ShakerConfig::load()?,
    };
    if let Some(rpc) = &options.rpc {
        config.rpc.url = rpc.clone();
    }
    if let Some(relayer) = &options.relayer {
        config.relayer.url = Some(relayer.clone());
    }
    Ok(config)
}

fn prover(config: &ShakerConfig) -> Result<Arc<dyn ProofBackend>> {
    match config.prover.mode {
        ProverMode::Mock => {
            log::warn!("Using the mock prover, proofs will not verify on a real pool");
            Ok(Arc::new(MockProofBackend::new()))
        }
        ProverMode::Http => {
            let backend = HttpProofBackend::new(HttpProverConfig {
                url: config.prover.url.clone(),
                proof_timeout: Duration::from_secs(config.prover.timeout_secs),
                poll_interval: Duration::from_millis(config.prover.poll_interval_ms),
            })?;
            Ok(Arc::new(backend))
        }
    }
}

async fn connect(config: &ShakerConfig, currency: &str) -> Result<Session> {
    let chain = Arc::new(JsonRpcChain::new(&config.rpc.url)?);
    let session = Session::connect(config, currency, chain, prover(config)?).await?;
    Ok(session)
}

async fn deposit(options: &Options, currency: &str, amount: &str) -> Result<()> {
    let config = load_config(options)?;
    let session = connect(&config, currency).await?;

    let mut coordinator = DepositCoordinator::new(&session);
    let outcome = coordinator.run(amount).await;

    // printed even when the deposit failed after note creation
    if let Some(note) = coordinator.note() {
        println!("Your note: {}", note);
    }
    session.shutdown().await;

    let outcome = outcome?;
    println!("✅ Deposit mined in block {}", outcome.receipt.block_number);
    Ok(())
}

async fn withdraw(options: &Options, note: &str, recipient: &str) -> Result<()> {
    let config = load_config(options)?;
    let parsed = Note::decode(note).context("Invalid note")?;
    let recipient: Address = recipient.parse()?;
    let relayer = config
        .relayer
        .url
        .as_deref()
        .map(HttpRelayer::new)
        .transpose()?;

    let session = connect(&config, &parsed.currency).await?;

    let route = match &relayer {
        Some(relayer) => WithdrawRoute::Relayed(relayer),
        None => WithdrawRoute::Direct,
    };

    let mut coordinator = WithdrawalCoordinator::new(&session);
    let outcome = coordinator
        .run(WithdrawalOrder {
            note: note.to_string(),
            recipient,
            refund: options.refund.clone().unwrap_or_else(|| "0".into()),
            route,
        })
        .await;
    session.shutdown().await;

    let outcome = outcome?;
    println!("✅ Withdrawal mined in block {}", outcome.receipt.block_number);
    println!("   Transaction: {}", outcome.tx_hash);
    Ok(())
}

async fn balance(options: &Options, address: &str, token: Option<&str>) -> Result<()> {
    let config = load_config(options)?;
    let chain = JsonRpcChain::new(&config.rpc.url)?;
    let address: Address = address.parse()?;
    let token = token.map(str::parse::<Address>).transpose()?;

    let report = balance_report(&chain, &address, token.as_ref()).await?;
    println!(
        "{} balance is {}",
        NATIVE_CURRENCY.to_uppercase(),
        to_decimals(&report.native, 18, None)
    );
    if let Some(token_balance) = report.token {
        println!("Token balance is {}", to_decimals(&token_balance, 18, None));
    }
    Ok(())
}

async fn compliance(options: &Options, note: &str) -> Result<()> {
    let config = load_config(options)?;
    let parsed = Note::decode(note).context("Invalid note")?;
    let session = connect(&config, &parsed.currency).await?;

    let decimals = session.pool.decimals;
    let report = compliance_report(&session, &parsed).await;
    session.shutdown().await;
    let report = report?;

    println!("=============Note=================");
    println!("Deposit     : {} {}", report.amount, report.currency);
    println!("Spent       : {}", report.deposit.spent);
    println!("=============Deposit==============");
    println!("Commitment  : {}", report.deposit.commitment.to_hex());
    println!("Leaf index  : {}", report.deposit.leaf_index);
    println!("Timestamp   : {}", report.deposit.timestamp);
    println!("Transaction : {}", report.deposit.tx_hash);
    println!("From        : {}", report.deposit.from);

    if report.withdrawals.is_empty() {
        println!("The note has not been withdrawn yet");
        return Ok(());
    }

    for withdrawal in &report.withdrawals {
        println!("=============Withdrawal===========");
        println!("Amount      : {}", to_decimals(&withdrawal.amount, decimals, None));
        println!("Fee         : {}", to_decimals(&withdrawal.fee, decimals, None));
        match withdrawal.timestamp {
            Some(ts) => println!("Timestamp   : {}", ts),
            None => println!("Timestamp   : unknown"),
        }
        println!("Transaction : {}", withdrawal.tx_hash);
        println!("To          : {}", withdrawal.to);
        println!("Relayer     : {}", withdrawal.relayer);
        println!("Nullifier   : {}", withdrawal.nullifier_hash.to_hex());
    }
    Ok(())
}
