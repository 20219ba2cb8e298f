//! Quick probe of a single token's on-chain state.
//!
//! Usage: cargo run --bin check_owner -- --token-id 7

use anyhow::Result;
use clap::Parser;

use ipsync::chain::{HttpLedgerClient, LedgerClient, OwnershipOracle};
use ipsync::config::Settings;

#[derive(Parser, Debug)]
#[command(about = "Probe ownerOf and dataStatus for one token")]
struct Args {
    /// Decimal token id
    #[arg(long)]
    token_id: String,

    /// Path to the settings file
    #[arg(long, default_value = "config/settings.json")]
    settings: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Settings::load_from_file(&args.settings).unwrap_or_default();
    let client = HttpLedgerClient::new(&settings)?;

    println!("🔍 Checking token {} on {}", args.token_id, settings.rpc_url);

    match client.owner_of(&args.token_id).await {
        Ok(owner) => println!("✅ Owner: {}", owner),
        Err(e) => println!("❌ Owner lookup failed: {}", e),
    }

    match client.data_status(&args.token_id).await {
        Ok(code) => {
            let note = if code == settings.deleted_status_code {
                " (deleted per configured sentinel)"
            } else {
                ""
            };
            println!("✅ dataStatus: {}{}", code, note);
        }
        Err(e) => println!("❌ dataStatus read failed: {}", e),
    }

    match client.token_uri(&args.token_id).await {
        Ok(uri) if uri.is_empty() => println!("ℹ️ tokenURI: (none)"),
        Ok(uri) => println!("✅ tokenURI: {}", uri),
        Err(e) => println!("❌ tokenURI read failed: {}", e),
    }

    Ok(())
}
