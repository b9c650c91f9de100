//! CRM Trust - Operator CLI
//!
//! # Usage
//!
//! ```bash
//! crm-trust check
//! crm-trust encrypt "jane@example.com"
//! crm-trust decrypt "<base64 blob>"
//! crm-trust mask "+33 6 12 34 56 78" --kind phone
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use crm_trust::crypto::{mask_sensitive_data, MaskKind};
use crm_trust::ratelimit::Plan;
use crm_trust::{field_encryptor, TrustConfig, TrustCore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crm-trust")]
#[command(version)]
#[command(about = "CRM trust core operator tool", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, env = "CRM_TRUST_CONFIG", default_value = "crm-trust.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load configuration and build every component
    Check,
    /// Encrypt a value with the configured master secret
    Encrypt {
        /// Plaintext
        value: String,
    },
    /// Decrypt a stored blob
    Decrypt {
        /// Base64 blob
        blob: String,
    },
    /// Mask a value for display
    Mask {
        /// Value to mask
        value: String,
        /// Masking rule
        #[arg(long, value_enum, default_value_t = Kind::Other)]
        kind: Kind,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Email,
    Phone,
    Other,
}

impl From<Kind> for MaskKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Email => MaskKind::Email,
            Kind::Phone => MaskKind::Phone,
            Kind::Other => MaskKind::Other,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Check => check(&cli.config),
        Commands::Encrypt { value } => {
            let config = TrustConfig::load_from(&cli.config).context("loading configuration")?;
            let blob = field_encryptor(&config)?.encrypt_async(value).await?;
            println!("{}", blob);
            Ok(())
        }
        Commands::Decrypt { blob } => {
            let config = TrustConfig::load_from(&cli.config).context("loading configuration")?;
            match field_encryptor(&config)?.decrypt_async(blob).await? {
                Some(plaintext) => println!("{}", plaintext),
                None => bail!("blob could not be decrypted with the configured secret"),
            }
            Ok(())
        }
        Commands::Mask { value, kind } => {
            println!("{}", mask_sensitive_data(Some(&value), kind.into()).unwrap_or_default());
            Ok(())
        }
    }
}

fn check(path: &str) -> Result<()> {
    let config = TrustConfig::load_from(path).context("loading configuration")?;
    let trust = TrustCore::in_process(&config).context("building trust core")?;

    println!("environment      {:?}", trust.environment());
    println!("permissions      {}", trust.authz().table().permission_count());
    println!("kdf iterations   {}", trust.encryptor().iterations());
    println!();
    println!("{:<16} {:>8} {:>12}  on store failure", "class", "limit", "window ms");
    let limits = trust.rate_limiter().limits();
    for (name, limit) in limits.iter() {
        println!(
            "{:<16} {:>8} {:>12}  {:?}",
            name, limit.max_attempts, limit.window_ms, limit.on_store_failure
        );
    }
    let default = limits.default_limit();
    println!(
        "{:<16} {:>8} {:>12}  {:?}",
        "(default)", default.max_attempts, default.window_ms, default.on_store_failure
    );
    println!();
    println!("{:<16} {:>8}", "plan", "ai/month");
    for plan in Plan::ALL {
        let limit = plan.monthly_ai_limit().map_or_else(|| "unlimited".to_string(), |l| l.to_string());
        println!("{:<16} {:>8}", plan.as_str(), limit);
    }
    Ok(())
}
