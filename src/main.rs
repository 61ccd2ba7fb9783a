use color_eyre::eyre::{
    Result,
    eyre,
};
use ethers::types::Address;
use roshambo_client::{
    client,
    deployment,
    wallets,
};
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: roshambo-client [--mainnet | --testnet | --local] [--rpc-url <url>]\n\
         [--wallet <name>] [--wallet-dir <path>] [--contract <address>]\n\
         \n\
         Flags:\n\
           --mainnet           Connect to Base mainnet (default RPC {})\n\
           --testnet           Connect to Base Sepolia (default RPC {})\n\
           --local             Connect to a local node (default RPC {})\n\
           --rpc-url <url>     Override the RPC URL for the selected network\n\
           --wallet <name>     Keystore name to play with\n\
           --wallet-dir <path> Override keystore directory (defaults to ~/.roshambo/keystores)\n\
           --contract <addr>   Override the recorded contract address",
        client::DEFAULT_MAINNET_RPC_URL,
        client::DEFAULT_TESTNET_RPC_URL,
        client::DEFAULT_LOCAL_RPC_URL,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Mainnet,
        Testnet,
        Local,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut contract: Option<Address> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mainnet" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --mainnet/--testnet/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Mainnet);
            }
            "--testnet" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --mainnet/--testnet/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Testnet);
            }
            "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --mainnet/--testnet/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Local);
            }
            "--rpc-url" => {
                let url = args
                    .next()
                    .ok_or_else(|| eyre!("--rpc-url requires a URL argument"))?;
                if custom_url.is_some() {
                    return Err(eyre!("--rpc-url may only be specified once"));
                }
                if network_flag.is_none() {
                    return Err(eyre!(
                        "--rpc-url must follow a network flag (--mainnet/--testnet/--local)"
                    ));
                }
                custom_url = Some(url);
            }
            "--wallet-dir" => {
                let dir = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet-dir requires a path argument"))?;
                if wallet_dir.is_some() {
                    return Err(eyre!("--wallet-dir may only be specified once"));
                }
                wallet_dir = Some(dir);
            }
            "--wallet" => {
                let name = args
                    .next()
                    .ok_or_else(|| eyre!("--wallet requires a wallet name"))?;
                if wallet_name.is_some() {
                    return Err(eyre!("--wallet may only be specified once"));
                }
                wallet_name = Some(name);
            }
            "--contract" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--contract requires an address argument"))?;
                if contract.is_some() {
                    return Err(eyre!("--contract may only be specified once"));
                }
                let address = Address::from_str(&raw)
                    .map_err(|err| eyre!("Invalid contract address {raw:?}: {err}"))?;
                contract = Some(address);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag {
        None => {
            return Err(eyre!(
                "Select a network with --mainnet, --testnet, or --local"
            ));
        }
        Some(NetworkFlag::Mainnet) => client::NetworkTarget::Mainnet {
            url: custom_url
                .unwrap_or_else(|| client::DEFAULT_MAINNET_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Testnet) => client::NetworkTarget::Testnet {
            url: custom_url
                .unwrap_or_else(|| client::DEFAULT_TESTNET_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Local) => client::NetworkTarget::LocalNode {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
        },
    };

    let wallet = wallet_name
        .ok_or_else(|| eyre!("Specify --wallet <name> to select a keystore"))?;
    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
    let wallets = client::WalletConfig::Keystore {
        owner: wallet.clone(),
        dir,
    };

    Ok(client::AppConfig {
        network,
        wallets,
        contract,
    })
}

/// The TUI owns stdout, so logs go to a file. Keep the guard alive for the
/// lifetime of the program or buffered lines are lost on exit.
fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let _ = std::fs::create_dir_all("logs");
    let appender = tracing_appender::rolling::never("logs", "roshambo-client.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_tracing();
    tracing::info!("starting roshambo client");
    color_eyre::install()?;
    deployment::ensure_structure()?;
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
