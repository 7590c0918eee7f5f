use color_eyre::eyre::{
    Result,
    eyre,
};
use danger_dice::{
    client,
    wallets,
};
use ethers::types::Address;
use std::sync::OnceLock;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::EnvFilter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Logs go to a rolling file because stdout belongs to the TUI.
fn init_tracing() {
    let file_appender = rolling::daily(".logs", "danger-dice.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .try_init();
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: danger-dice (--mainnet | --testnet) [--rpc-url <url>]\n\
         --wallet <name> [--wallet-dir <path>]\n\
         [--game-address <address>]\n\
         \n\
         Flags:\n\
           --mainnet              Connect to Base mainnet (default RPC {})\n\
           --testnet              Connect to Base Sepolia (default RPC {})\n\
           --rpc-url <url>        Override the RPC URL for the selected network\n\
           --wallet <name>        Keystore wallet to play with\n\
           --wallet-dir <path>    Override the keystore directory (defaults to ~/.danger-dice/wallets)\n\
           --game-address <addr>  Override the game contract address",
        client::DEFAULT_MAINNET_RPC_URL,
        client::DEFAULT_TESTNET_RPC_URL,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Mainnet,
        Testnet,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut game_address: Option<Address> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--mainnet" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --mainnet/--testnet"
                    ));
                }
                network_flag = Some(NetworkFlag::Mainnet);
            }
            "--testnet" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --mainnet/--testnet"
                    ));
                }
                network_flag = Some(NetworkFlag::Testnet);
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
                        "--rpc-url must follow a network flag (--mainnet/--testnet)"
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
            "--game-address" => {
                let addr = args
                    .next()
                    .ok_or_else(|| eyre!("--game-address requires an address argument"))?;
                if game_address.is_some() {
                    return Err(eyre!("--game-address may only be specified once"));
                }
                let parsed = addr
                    .parse::<Address>()
                    .map_err(|e| eyre!("Invalid --game-address {addr}: {e}"))?;
                game_address = Some(parsed);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag {
        None => {
            return Err(eyre!("Select a network with --mainnet or --testnet"));
        }
        Some(NetworkFlag::Mainnet) => client::NetworkTarget::Mainnet {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_MAINNET_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Testnet) => client::NetworkTarget::Testnet {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_TESTNET_RPC_URL.to_string()),
        },
    };

    let name =
        wallet_name.ok_or_else(|| eyre!("Specify --wallet <name> to select a keystore wallet"))?;
    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
    let wallet = client::WalletConfig::Keystore { name, dir };

    Ok(client::AppConfig {
        network,
        wallet,
        game_address,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}
