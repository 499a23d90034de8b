use std::path::PathBuf;

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat};
use clap::{Parser, Subcommand};
use envconfig::Envconfig;
use fhevm_local::{accounts::dev_signer, LocalNode};
use log::{info, warn};
use shield_client::{
    rpc::RpcOrderStore, ClientConfig, FhevmStatus, InMemoryStorage, Services, SyncHandle,
};
use shield_common::ports::OrderStorePort;

const DEPLOYMENT_NAME: &str = "ShieldSwap";

#[derive(Parser)]
#[command(name = "shield", about = "Operate ShieldSwap on a local FHE devnet")]
struct Args {
    #[arg(long, default_value = "shield-devnet.json")]
    /// Devnet state file, created on first use
    state: PathBuf,

    #[arg(long, env = "PRIVATE_KEY", hide_env_values = true)]
    /// Hex private key of the acting account; defaults to the first
    /// development account
    private_key: Option<String>,

    #[arg(long)]
    /// Read through a JSON-RPC node instead of the devnet state file, at
    /// SHIELD_RPC_URL or the default endpoint of SHIELD_CHAIN_ID
    remote: bool,

    #[arg(long)]
    /// JSON-RPC endpoint to read through; implies --remote
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy ShieldSwap, unless this devnet already has it
    Deploy,
    /// Print the ShieldSwap address
    Address,
    /// Encrypt and submit a swap order
    SetOrder {
        #[arg(long, allow_hyphen_values = true)]
        /// The from amount (what you pay)
        from: i64,

        #[arg(long, allow_hyphen_values = true)]
        /// The to amount (what you receive)
        to: i64,

        #[arg(long)]
        address: Option<Address>,
    },
    /// Check whether the account has an active order
    CheckOrder {
        #[arg(long)]
        address: Option<Address>,
    },
    /// Decrypt the account's current order
    DecryptOrder {
        #[arg(long)]
        address: Option<Address>,
    },
}

fn signer(private_key: Option<&str>) -> Result<PrivateKeySigner> {
    match private_key {
        Some(key) => key
            .trim_start_matches("0x")
            .parse()
            .context("invalid private key"),
        None => dev_signer(0).context("no development account"),
    }
}

async fn contract_address(node: &LocalNode, address: Option<Address>) -> Result<Address> {
    match address {
        Some(address) => Ok(address),
        None => node
            .read(|chain| chain.deployment(DEPLOYMENT_NAME))
            .await
            .context("ShieldSwap is not deployed on this devnet, run `shield deploy` first"),
    }
}

/// A sync client connected as `signer` to `contract`, with its first read
/// done.
async fn connect(
    node: &LocalNode,
    signer: &PrivateKeySigner,
    contract: Address,
) -> Result<SyncHandle> {
    let config = ClientConfig::init_from_env()?;
    if config.chain_id != node.chain_id() {
        warn!(
            "SHIELD_CHAIN_ID is {} but the devnet runs chain {}",
            config.chain_id,
            node.chain_id()
        );
    }
    let services = Services::new(
        node.clone(),
        node.clone(),
        node.clone(),
        InMemoryStorage::default(),
    )
    .with_storage(config.signature_storage()?);
    let deployments = config.load_deployments()?.with(node.chain_id(), contract);

    let sync = SyncHandle::spawn(services, deployments, &config);
    sync.set_fhevm_status(FhevmStatus::Ready).await?;
    sync.set_context(Some(node.chain_id()), Some(signer.clone()))
        .await?;
    let state = sync.wait_idle().await?;
    if state.handles.is_none() {
        bail!("{}", state.message);
    }
    Ok(sync)
}

async fn set_order(
    node: &LocalNode,
    signer: &PrivateKeySigner,
    contract: Address,
    from: i64,
    to: i64,
) -> Result<()> {
    if from < 0 || to < 0 {
        bail!("Arguments --from and --to must be non-negative");
    }
    let sync = connect(node, signer, contract).await?;

    println!("Submitting encrypted order: from={from}, to={to}");
    sync.submit_order(from, to).await?;
    let state = sync.wait_idle().await?;
    if state.message != "setOrder completed" {
        bail!("{}", state.message);
    }
    if let Some(entry) = state
        .log
        .entries()
        .find(|e| e.title == "Submit Encrypted Order")
    {
        info!(
            "{} ({})",
            entry.title,
            entry.details.as_deref().unwrap_or_default()
        );
    }
    if let Some(receipt) = &state.last_receipt {
        println!("Wait for tx:{}...", receipt.tx_hash);
        println!("tx:{} status={}", receipt.tx_hash, u8::from(receipt.status));
    }

    let handles = state.handles.unwrap_or_default();
    println!("Encrypted fromAmount after setOrder: {}", handles.from_amount);
    println!("Encrypted toAmount after setOrder: {}", handles.to_amount);
    println!("ShieldSwap setOrder(from={from}, to={to}) succeeded!");
    sync.shutdown().await?;
    Ok(())
}

async fn check_order<S: OrderStorePort>(
    store: &S,
    account: Address,
    contract: Address,
) -> Result<()> {
    let has_order = store.has_order(contract, account).await?;
    let timestamp = store.get_my_order_timestamp(contract, account).await?;

    println!("Address: {account}");
    println!("Has active order: {has_order}");
    if has_order && timestamp > 0 {
        let created = DateTime::from_timestamp(timestamp as i64, 0)
            .context("order timestamp out of range")?;
        println!(
            "Order created at: {}",
            created.to_rfc3339_opts(SecondsFormat::Millis, true)
        );
    }
    Ok(())
}

async fn decrypt_order(
    node: &LocalNode,
    signer: &PrivateKeySigner,
    contract: Address,
) -> Result<()> {
    let sync = connect(node, signer, contract).await?;
    let handles = sync.state().handles.unwrap_or_default();

    if !handles.is_complete() {
        println!("No order found for {}", signer.address());
        println!("Encrypted fromAmount: {}", handles.from_amount);
        println!("Encrypted toAmount: {}", handles.to_amount);
        return Ok(());
    }

    sync.decrypt_order().await?;
    let state = sync.wait_idle().await?;
    let Some(clear) = state.clear_order() else {
        bail!("{}", state.message);
    };
    println!("Encrypted fromAmount: {}", handles.from_amount);
    println!("Encrypted toAmount: {}", handles.to_amount);
    println!("Clear fromAmount: {}", clear.from);
    println!("Clear toAmount: {}", clear.to);
    sync.shutdown().await?;
    Ok(())
}

/// The endpoint given on the command line, else the configured one.
fn rpc_endpoint(flag: Option<String>, config: &ClientConfig) -> Result<String> {
    match flag.or_else(|| config.rpc_url()) {
        Some(url) => Ok(url),
        None => bail!(
            "no RPC endpoint known for chain {}, set SHIELD_RPC_URL or pass --rpc-url",
            config.chain_id
        ),
    }
}

/// Commands served through a JSON-RPC node. Encryption and decryption only
/// exist on the devnet, so only the read commands are available here.
async fn run_remote(
    endpoint: Option<String>,
    signer: &PrivateKeySigner,
    command: Command,
) -> Result<()> {
    let config = ClientConfig::init_from_env()?;
    let url = rpc_endpoint(endpoint, &config)?;
    let store = RpcOrderStore::new(&url)?;
    let chain_id = store.chain_id().await?;
    if chain_id != config.chain_id {
        bail!(
            "{url} serves chain {chain_id}, expected {} from SHIELD_CHAIN_ID",
            config.chain_id
        );
    }
    info!("reading chain {chain_id} through {}", store.url());

    let deployments = config.load_deployments()?;
    let contract = |address: Option<Address>| -> Result<Address> {
        match address {
            Some(address) => Ok(address),
            None => deployments
                .resolve(chain_id)
                .map(|entry| entry.address)
                .with_context(|| {
                    format!("ShieldSwap is not registered for chain {chain_id}")
                }),
        }
    };

    match command {
        Command::Address => {
            println!("ShieldSwap address is {}", contract(None)?);
        }
        Command::CheckOrder { address } => {
            let contract = contract(address)?;
            println!("ShieldSwap: {contract}");
            check_order(&store, signer.address(), contract).await?;
        }
        Command::Deploy | Command::SetOrder { .. } | Command::DecryptOrder { .. } => {
            bail!("this command needs the local devnet, run it without --remote or --rpc-url")
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let signer = signer(args.private_key.as_deref())?;
    if args.remote || args.rpc_url.is_some() {
        return run_remote(args.rpc_url, &signer, args.command).await;
    }
    let node = LocalNode::load(&args.state).await?;

    match args.command {
        Command::Deploy => {
            let (address, deployed) = node
                .write(|chain| chain.deploy_named(DEPLOYMENT_NAME, signer.address()))
                .await;
            if deployed {
                println!("ShieldSwap deployed at {address}");
            } else {
                println!("Reusing ShieldSwap deployed at {address}");
            }
        }
        Command::Address => {
            let address = contract_address(&node, None).await?;
            println!("ShieldSwap address is {address}");
        }
        Command::SetOrder { from, to, address } => {
            let contract = contract_address(&node, address).await?;
            println!("ShieldSwap: {contract}");
            set_order(&node, &signer, contract, from, to).await?;
        }
        Command::CheckOrder { address } => {
            let contract = contract_address(&node, address).await?;
            println!("ShieldSwap: {contract}");
            check_order(&node, signer.address(), contract).await?;
        }
        Command::DecryptOrder { address } => {
            let contract = contract_address(&node, address).await?;
            println!("ShieldSwap: {contract}");
            decrypt_order(&node, &signer, contract).await?;
        }
    }

    node.save(&args.state).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use fhevm_local::LocalChain;
    use test_log::test;

    #[test]
    fn arguments_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_set_order() {
        let args = Args::try_parse_from([
            "shield",
            "--state",
            "devnet.json",
            "set-order",
            "--from",
            "100",
            "--to",
            "2500",
        ])
        .unwrap();
        assert_eq!(args.state, PathBuf::from("devnet.json"));
        assert!(matches!(
            args.command,
            Command::SetOrder {
                from: 100,
                to: 2500,
                address: None
            }
        ));
    }

    #[test]
    fn rpc_url_selects_remote_mode() {
        let args = Args::try_parse_from([
            "shield",
            "--rpc-url",
            "http://node:8545",
            "check-order",
        ])
        .unwrap();
        assert_eq!(args.rpc_url.as_deref(), Some("http://node:8545"));
        assert!(matches!(args.command, Command::CheckOrder { address: None }));

        let args = Args::try_parse_from(["shield", "--remote", "address"]).unwrap();
        assert!(args.remote);
        assert!(args.rpc_url.is_none());
    }

    #[test]
    fn rpc_endpoint_precedence() -> Result<()> {
        let config = ClientConfig {
            rpc_url: Some("http://configured:8545".to_string()),
            ..Default::default()
        };
        assert_eq!(
            rpc_endpoint(Some("http://flag:8545".to_string()), &config)?,
            "http://flag:8545"
        );
        assert_eq!(rpc_endpoint(None, &config)?, "http://configured:8545");

        let unknown = ClientConfig {
            chain_id: 7,
            ..Default::default()
        };
        let err = rpc_endpoint(None, &unknown).unwrap_err();
        assert!(err.to_string().contains("chain 7"));
        Ok(())
    }

    #[test(tokio::test)]
    async fn check_order_reads_through_the_order_store() -> Result<()> {
        let mut chain = LocalChain::default();
        let owner = dev_signer(0).unwrap().address();
        let (contract, _) = chain.deploy_named(DEPLOYMENT_NAME, owner);
        let node = LocalNode::new(chain);

        check_order(&node, owner, contract).await?;
        assert!(check_order(&node, owner, Address::repeat_byte(7)).await.is_err());
        Ok(())
    }

    #[test]
    fn default_signer_is_the_first_dev_account() -> Result<()> {
        assert_eq!(signer(None)?.address(), dev_signer(0).unwrap().address());
        let explicit = signer(Some(
            "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        ))?;
        assert_eq!(explicit.address(), dev_signer(1).unwrap().address());
        assert!(signer(Some("nope")).is_err());
        Ok(())
    }
}
