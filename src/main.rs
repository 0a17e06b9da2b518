// src/main.rs
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use ethers::types::{Address, Bytes, H256};
use ethers::utils::parse_ether;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use esign_userop::config::{Args as ConfigArgs, Config};
use esign_userop::flow::{execute_via_email, EmailAccount, FlowSettings};
use esign_userop::network::EthNode;
use esign_userop::relayer::{HttpRelayer, Relayer};
use esign_userop::rpc::{Bundler, HttpBundler};
use esign_userop::signer::{encode_email_auth_msg, EmailSigner};

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(flatten)]
    config: ConfigArgs,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the entry points the bundler supports
    EntryPoints,

    /// Ask the relayer for the account salt of an email address
    AccountSalt {
        #[clap(long)]
        account_code: String,
        #[clap(long)]
        email: String,
    },

    /// Sign an arbitrary hash by email and print the resulting signature
    SignHash {
        #[clap(long)]
        account_code: String,
        #[clap(long)]
        email: String,
        #[clap(long)]
        hash: H256,
    },

    /// Send ETH from an email account through the bundler
    SendEth {
        #[clap(long)]
        account: Address,
        #[clap(long)]
        account_code: String,
        #[clap(long)]
        email: String,
        #[clap(long)]
        to: Address,
        /// Amount in ether
        #[clap(long)]
        amount: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let cli = Cli::parse();
    let config = Config::try_from(cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let bundler = HttpBundler::new(config.bundler_url.as_str())?;
    let relayer = HttpRelayer::new(config.relayer_url.clone());

    match cli.command {
        Command::EntryPoints => {
            for entry_point in bundler.supported_entry_points().await? {
                println!("{entry_point:?}");
            }
        }
        Command::AccountSalt {
            account_code,
            email,
        } => {
            let salt = relayer.account_salt(&account_code, &email).await?;
            println!("0x{}", hex::encode(salt));
        }
        Command::SignHash {
            account_code,
            email,
            hash,
        } => {
            let auth = EmailSigner::new(&relayer, config.dkim_contract, config.relayer_chain.clone())
                .code_exists_in_email(config.code_exists_in_email)
                .poll_policy(config.signing_poll)
                .sign_hash(&account_code, &email, hash, config.signing_timeout)
                .await?;
            info!("Email auth message: {}", serde_json::to_string(&auth)?);
            println!("0x{}", hex::encode(encode_email_auth_msg(&auth)));
        }
        Command::SendEth {
            account,
            account_code,
            email,
            to,
            amount,
        } => {
            let chain = EthNode::new(config.eth_rpc_url.as_str())?;
            let account = EmailAccount {
                address: account,
                account_code,
                email_address: email,
            };
            let receipt = execute_via_email(
                &bundler,
                &chain,
                &relayer,
                &FlowSettings::from(&config),
                &account,
                to,
                parse_ether(&amount)?,
                Bytes::default(),
            )
            .await?;
            info!(success = receipt.success, "User operation included");
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}
