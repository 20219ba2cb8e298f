//! Sync a wallet's minted IP tokens and print one page of the result.
//!
//! Usage: cargo run --bin sync -- --owner 0x... [--page 2] [--full]

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use ipsync::bus::RefreshBus;
use ipsync::config::Settings;
use ipsync::sync::Synchronizer;
use ipsync::utils::address;

#[derive(Parser, Debug)]
#[command(about = "Sync minted IP tokens for a wallet and show a page")]
struct Args {
    /// Wallet address to sync (0x...)
    #[arg(long)]
    owner: String,

    /// 1-based page to print
    #[arg(long, default_value_t = 1)]
    page: usize,

    /// Items per page (defaults to the configured page size)
    #[arg(long)]
    page_size: Option<usize>,

    /// Invalidate the cache first, forcing a full chain scan
    #[arg(long)]
    full: bool,

    /// Path to the settings file
    #[arg(long, default_value = "config/settings.json")]
    settings: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let settings = Settings::load_from_file(&args.settings).unwrap_or_else(|e| {
        println!("⚠️ Could not read {} ({e}), using defaults", args.settings);
        Settings::default()
    });
    let page_size = args.page_size.unwrap_or(settings.default_page_size);

    let bus = Arc::new(RefreshBus::new());
    let sync = Synchronizer::from_settings(&settings, bus)?;

    if args.full {
        println!("🧹 Invalidating cache for {}", address::shorten(&args.owner));
        sync.invalidate(&args.owner);
    }

    println!("🔄 Syncing minted IPs for {}...", args.owner);
    let page = sync.get_page(&args.owner, args.page, page_size).await?;

    if page.total_items == 0 {
        println!("No IPs have been minted yet.");
        return Ok(());
    }

    println!(
        "✅ {} token(s) owned - page {} of {}",
        page.total_items, page.page_number, page.total_pages
    );
    for record in &page.items {
        let title = record
            .metadata
            .as_ref()
            .map(|m| m.title.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("Untitled");
        println!(
            "   #{:<12} {:<28} minted in {}",
            record.token_id, title, record.mint_transaction_hash
        );
    }

    Ok(())
}
