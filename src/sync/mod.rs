//! Minted-token synchronizer.
//!
//! Flow:
//! 1. Full sync: chunked mint-event scan from genesis to head, bounded by
//!    the RPC block-range limit
//! 2. Every event re-verified against the ownership oracle (an event only
//!    proves historical minting, not current ownership)
//! 3. Token URI + metadata resolved best effort, never failing the batch
//! 4. Fresh caches take the cheap path: ownership-only reconcile, no log
//!    queries
//!
//! Views read pages through `get_page` and hear about mutations through the
//! refresh bus.

pub mod pager;

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use log::{debug, error, info, warn};
use tokio::sync::Mutex;

use crate::bus::{RefreshBus, RefreshEvent, SubscriptionToken};
use crate::cache::{CacheEntry, CacheStore, FileCacheStore};
use crate::chain::{HttpLedgerClient, LedgerClient, MintEvent, OwnershipOracle};
use crate::config::Settings;
use crate::metadata::{HttpMetadataFetcher, MetadataFetcher};
use crate::types::TokenRecord;
use crate::utils::address;

pub use pager::{page, paginate, total_pages, Page};

/// Caller mistakes caught before any network traffic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid wallet address `{0}`")]
    InvalidAddress(String),

    #[error("page size must be at least 1")]
    InvalidPageSize,

    #[error("page number is 1-based and must be at least 1")]
    InvalidPageNumber,
}

/// Overall sync failure. Per-chunk and per-token failures degrade the
/// result instead of surfacing here.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("failed to read chain head: {0}")]
    ChainHead(#[source] crate::chain::ChainQueryError),

    #[error("all {0} log chunk(s) failed")]
    AllChunksFailed(usize),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Client-observable sync lifecycle, per owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Loading,
    Ready,
}

/// Outcome of a single-token lookup on behalf of a mutation view.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenLookup {
    Owned(TokenRecord),
    NotOwner,
    Deleted,
}

/// Inclusive block ranges covering `[from_block, head]`, aligned to `span`
/// boundaries so no query exceeds the RPC limit.
pub fn chunk_ranges(from_block: u64, head: u64, span: u64) -> Vec<(u64, u64)> {
    let span = span.max(1);
    let mut ranges = Vec::new();
    let mut current = from_block;
    while current <= head {
        let to = head.min((current / span + 1).saturating_mul(span));
        ranges.push((current, to));
        if to == u64::MAX {
            break;
        }
        current = to + 1;
    }
    ranges
}

pub struct Synchronizer {
    ledger: Arc<dyn LedgerClient>,
    oracle: Arc<dyn OwnershipOracle>,
    metadata: Arc<dyn MetadataFetcher>,
    cache: Arc<dyn CacheStore>,
    bus: Arc<RefreshBus>,
    max_block_range: u64,
    deleted_status_code: u8,
    phases: DashMap<String, SyncPhase>,
    /// Per-owner guard so concurrent triggers serialize instead of racing
    /// the cache with duplicate scans.
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl Synchronizer {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        oracle: Arc<dyn OwnershipOracle>,
        metadata: Arc<dyn MetadataFetcher>,
        cache: Arc<dyn CacheStore>,
        bus: Arc<RefreshBus>,
        settings: &Settings,
    ) -> Self {
        Self {
            ledger,
            oracle,
            metadata,
            cache,
            bus,
            max_block_range: settings.max_block_range.max(1),
            deleted_status_code: settings.deleted_status_code,
            phases: DashMap::new(),
            in_flight: DashMap::new(),
        }
    }

    /// Wire up the production collaborators from settings alone. The HTTP
    /// ledger client doubles as the ownership oracle.
    pub fn from_settings(settings: &Settings, bus: Arc<RefreshBus>) -> anyhow::Result<Self> {
        let rpc = Arc::new(HttpLedgerClient::new(settings)?);
        let metadata = Arc::new(HttpMetadataFetcher::new(settings.metadata_timeout_secs));
        let cache = Arc::new(FileCacheStore::new(&settings.cache_dir));
        Ok(Self::new(rpc.clone(), rpc, metadata, cache, bus, settings))
    }

    pub fn phase(&self, owner: &str) -> SyncPhase {
        self.phases
            .get(&address::normalize(owner))
            .map(|p| *p)
            .unwrap_or(SyncPhase::Uninitialized)
    }

    fn set_phase(&self, owner: &str, phase: SyncPhase) {
        self.phases.insert(owner.to_string(), phase);
    }

    /// After a failed operation, land on Ready when a usable cache exists,
    /// Uninitialized otherwise.
    fn settle_phase(&self, owner: &str) {
        let phase = if self.cache.load(owner).is_some() {
            SyncPhase::Ready
        } else {
            SyncPhase::Uninitialized
        };
        self.phases.insert(owner.to_string(), phase);
    }

    /// ------------------------------------------------------------------
    /// Full sync: authoritative rebuild from chain logs.
    /// ------------------------------------------------------------------
    pub async fn full_sync(&self, owner: &str) -> Result<Vec<TokenRecord>, SyncError> {
        let owner = validate_owner(owner)?;
        self.set_phase(&owner, SyncPhase::Loading);

        let head = match self.ledger.get_chain_head().await {
            Ok(head) => head,
            Err(e) => {
                self.settle_phase(&owner);
                return Err(SyncError::ChainHead(e));
            }
        };

        let ranges = chunk_ranges(0, head, self.max_block_range);
        info!(
            "🔄 [SYNC] Full sync for {}: head {}, {} chunk(s)",
            address::shorten(&owner),
            head,
            ranges.len()
        );

        let mut records: Vec<TokenRecord> = Vec::new();
        let mut failed_chunks = 0usize;

        for (from_block, to_block) in &ranges {
            let events = match self
                .ledger
                .get_mint_events(&owner, *from_block, *to_block)
                .await
            {
                Ok(events) => events,
                Err(e) => {
                    warn!(
                        "⚠️ [SYNC] Log query failed for blocks {}-{}: {} - skipping chunk",
                        from_block, to_block, e
                    );
                    failed_chunks += 1;
                    continue;
                }
            };
            if events.is_empty() {
                continue;
            }
            debug!(
                "🔍 [SYNC] Blocks {}-{}: {} mint event(s)",
                from_block,
                to_block,
                events.len()
            );

            // Per-token checks run concurrently; chunks stay sequential so
            // the result list keeps chunk order and outstanding RPC load
            // stays bounded.
            let resolved = join_all(
                events
                    .into_iter()
                    .map(|event| self.resolve_event(&owner, event)),
            )
            .await;
            records.extend(resolved.into_iter().flatten());
        }

        if !ranges.is_empty() && failed_chunks == ranges.len() {
            self.settle_phase(&owner);
            return Err(SyncError::AllChunksFailed(failed_chunks));
        }

        if let Err(e) = self.cache.save(&owner, &CacheEntry::new(records.clone())) {
            error!(
                "❌ [CACHE] Failed to persist {} record(s) for {}: {}",
                records.len(),
                address::shorten(&owner),
                e
            );
        }
        if let Err(e) = self.cache.clear_stale(&owner) {
            warn!("⚠️ [CACHE] Failed to clear staleness flag: {}", e);
        }
        self.set_phase(&owner, SyncPhase::Ready);
        info!(
            "✅ [SYNC] Full sync complete for {}: {} token(s) owned",
            address::shorten(&owner),
            records.len()
        );
        Ok(records)
    }

    /// Verify one mint event still belongs to `owner` and flesh it out into
    /// a record. Any token-scoped failure excludes the token or degrades
    /// the record; it never fails the batch.
    async fn resolve_event(&self, owner: &str, event: MintEvent) -> Option<TokenRecord> {
        match self.oracle.owner_of(&event.token_id).await {
            Ok(current) if current.eq_ignore_ascii_case(owner) => {}
            Ok(_) => {
                debug!(
                    "↪️ [SYNC] Token {} transferred away, excluding",
                    event.token_id
                );
                return None;
            }
            Err(e) => {
                warn!("⚠️ [SYNC] Token {} invalid or deleted: {}", event.token_id, e);
                return None;
            }
        }

        let token_uri = match self.ledger.token_uri(&event.token_id).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!(
                    "⚠️ [SYNC] tokenURI lookup failed for {}: {}",
                    event.token_id, e
                );
                String::new()
            }
        };

        let metadata = if token_uri.is_empty() {
            None
        } else {
            match self.metadata.fetch(&token_uri).await {
                Ok(meta) => Some(meta),
                Err(e) => {
                    warn!(
                        "⚠️ [META] Metadata unavailable for token {}: {}",
                        event.token_id, e
                    );
                    None
                }
            }
        };

        Some(TokenRecord {
            token_id: event.token_id,
            creator: event.creator,
            content_hash: event.content_hash,
            token_uri,
            mint_transaction_hash: event.transaction_hash,
            metadata,
        })
    }

    /// ------------------------------------------------------------------
    /// Incremental reconcile: ownership-filter the cached records.
    /// ------------------------------------------------------------------
    ///
    /// Catches tokens transferred away through other clients (another
    /// device, a marketplace) without re-reading historical logs.
    pub async fn incremental_reconcile(&self, owner: &str) -> Result<Vec<TokenRecord>, SyncError> {
        let owner = validate_owner(owner)?;
        let Some(entry) = self.cache.load(&owner) else {
            debug!(
                "📖 [SYNC] No cache entry for {}, nothing to reconcile",
                address::shorten(&owner)
            );
            return Ok(Vec::new());
        };
        self.set_phase(&owner, SyncPhase::Loading);
        info!(
            "🔍 [SYNC] Reconciling {} cached token(s) for {}",
            entry.records.len(),
            address::shorten(&owner)
        );

        let checks = join_all(
            entry
                .records
                .into_iter()
                .map(|record| self.verify_owned(&owner, record)),
        )
        .await;
        let records: Vec<TokenRecord> = checks.into_iter().flatten().collect();

        if let Err(e) = self.cache.save(&owner, &CacheEntry::new(records.clone())) {
            warn!("⚠️ [CACHE] Failed to persist reconciled records: {}", e);
        }
        self.set_phase(&owner, SyncPhase::Ready);
        Ok(records)
    }

    async fn verify_owned(&self, owner: &str, record: TokenRecord) -> Option<TokenRecord> {
        match self.oracle.owner_of(&record.token_id).await {
            Ok(current) if current.eq_ignore_ascii_case(owner) => Some(record),
            Ok(_) => {
                info!(
                    "↪️ [SYNC] Token {} no longer owned, pruning",
                    record.token_id
                );
                None
            }
            Err(e) => {
                warn!(
                    "⚠️ [SYNC] Ownership check failed for {}: {} - pruning",
                    record.token_id, e
                );
                None
            }
        }
    }

    /// ------------------------------------------------------------------
    /// Upward API used by views.
    /// ------------------------------------------------------------------

    /// Staleness-driven refresh: empty or invalidated cache forces a full
    /// sync, a fresh one gets the cheap reconcile.
    pub async fn trigger_sync(&self, owner: &str) -> Result<Vec<TokenRecord>, SyncError> {
        let owner = validate_owner(owner)?;

        let guard = {
            let slot = self
                .in_flight
                .entry(owner.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(slot.value())
        };
        let _held = guard.lock().await;

        let entry = self.cache.load(&owner);
        let empty = entry.as_ref().map_or(true, |e| e.records.is_empty());
        if empty || self.cache.is_stale(&owner) {
            self.full_sync(&owner).await
        } else {
            self.incremental_reconcile(&owner).await
        }
    }

    /// Refresh per the staleness policy and slice out one page.
    pub async fn get_page(
        &self,
        owner: &str,
        page_number: usize,
        page_size: usize,
    ) -> Result<Page, SyncError> {
        if page_size == 0 {
            return Err(ValidationError::InvalidPageSize.into());
        }
        if page_number == 0 {
            return Err(ValidationError::InvalidPageNumber.into());
        }
        let records = self.trigger_sync(owner).await?;
        Ok(pager::page(&records, page_size, page_number))
    }

    /// Mark the owner's cache stale. Side effect only; the next access
    /// decides whether to refetch.
    pub fn invalidate(&self, owner: &str) {
        let owner = address::normalize(owner);
        if let Err(e) = self.cache.mark_stale(&owner) {
            warn!(
                "⚠️ [CACHE] Failed to mark {} stale: {}",
                address::shorten(&owner),
                e
            );
        }
    }

    /// Cache bookkeeping after a successful mint: invalidate and tell every
    /// mounted view.
    pub fn after_mint(&self, owner: &str) {
        let owner = address::normalize(owner);
        self.invalidate(&owner);
        self.bus.publish(RefreshEvent::Mutated { owner });
    }

    /// Cache bookkeeping after a successful transfer out: prune the record
    /// immediately, invalidate, and tell every mounted view.
    pub fn after_transfer(&self, owner: &str, token_id: &str) {
        let owner = address::normalize(owner);
        if let Err(e) = self.cache.remove_record(&owner, token_id) {
            warn!("⚠️ [CACHE] Failed to prune token {}: {}", token_id, e);
        }
        self.invalidate(&owner);
        self.bus.publish(RefreshEvent::Mutated { owner });
    }

    /// Subscribe a view callback to mutations of `owner`'s token set. The
    /// bus is not address-partitioned, so the owner filter lives here.
    pub fn on_mutation<F>(&self, owner: &str, callback: F) -> SubscriptionToken
    where
        F: Fn() + Send + Sync + 'static,
    {
        let owner = address::normalize(owner);
        self.bus.subscribe(move |event| {
            if event.owner().eq_ignore_ascii_case(&owner) {
                callback();
            }
        })
    }

    pub fn unsubscribe(&self, token: SubscriptionToken) {
        self.bus.unsubscribe(token);
    }

    /// Single-token lookup for mutation views (transfer, license). Cache
    /// hit first; otherwise ownership check, deleted-status check against
    /// the configured sentinel, then URI + metadata resolution.
    pub async fn fetch_token(
        &self,
        owner: &str,
        token_id: &str,
    ) -> Result<TokenLookup, SyncError> {
        let owner = validate_owner(owner)?;

        if let Some(entry) = self.cache.load(&owner) {
            if let Some(record) = entry.records.iter().find(|r| r.token_id == token_id) {
                return Ok(TokenLookup::Owned(record.clone()));
            }
        }

        match self.oracle.owner_of(token_id).await {
            Ok(current) if current.eq_ignore_ascii_case(&owner) => {}
            Ok(_) => return Ok(TokenLookup::NotOwner),
            Err(e) => {
                info!("🔍 [SYNC] Token {} lookup: {}", token_id, e);
                return Ok(TokenLookup::Deleted);
            }
        }

        match self.ledger.data_status(token_id).await {
            Ok(code) if code == self.deleted_status_code => return Ok(TokenLookup::Deleted),
            Ok(_) => {}
            Err(e) => warn!("⚠️ [SYNC] dataStatus read failed for {}: {}", token_id, e),
        }

        let token_uri = match self.ledger.token_uri(token_id).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!("⚠️ [SYNC] tokenURI lookup failed for {}: {}", token_id, e);
                String::new()
            }
        };
        let metadata = if token_uri.is_empty() {
            None
        } else {
            self.metadata.fetch(&token_uri).await.ok()
        };

        // Creator and mint transaction are not recoverable from state reads
        // alone; the owner stands in for the creator here.
        Ok(TokenLookup::Owned(TokenRecord {
            token_id: token_id.to_string(),
            creator: owner.clone(),
            content_hash: "0x".to_string(),
            token_uri,
            mint_transaction_hash: "0x".to_string(),
            metadata,
        }))
    }
}

fn validate_owner(owner: &str) -> Result<String, ValidationError> {
    if !address::is_valid_address(owner) {
        return Err(ValidationError::InvalidAddress(owner.to_string()));
    }
    Ok(address::normalize(owner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{ChainQueryError, OracleError};
    use crate::metadata::MetadataFetchError;
    use crate::types::IpMetadata;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    const OWNER: &str = "0xf90733b9ecda3b49c250b2c3e3e42c96fc93324e";
    const OTHER: &str = "0x1111111111111111111111111111111111111111";

    fn mint_event(token_id: &str, block_number: u64) -> MintEvent {
        MintEvent {
            token_id: token_id.to_string(),
            creator: OWNER.to_string(),
            content_hash: "0x22".to_string(),
            transaction_hash: format!("0xtx{token_id}"),
            block_number,
        }
    }

    fn record(token_id: &str) -> TokenRecord {
        TokenRecord {
            token_id: token_id.to_string(),
            creator: OWNER.to_string(),
            content_hash: "0x22".to_string(),
            token_uri: String::new(),
            mint_transaction_hash: format!("0xtx{token_id}"),
            metadata: None,
        }
    }

    #[derive(Default)]
    struct MockLedger {
        head: u64,
        fail_head: AtomicBool,
        fail_logs: AtomicBool,
        events: StdMutex<Vec<MintEvent>>,
        log_calls: AtomicUsize,
        queried_ranges: StdMutex<Vec<(u64, u64)>>,
        uris: StdMutex<HashMap<String, String>>,
        statuses: StdMutex<HashMap<String, u8>>,
    }

    #[async_trait]
    impl LedgerClient for MockLedger {
        async fn get_chain_head(&self) -> Result<u64, ChainQueryError> {
            if self.fail_head.load(Ordering::SeqCst) {
                return Err(ChainQueryError::Transport("endpoint down".into()));
            }
            Ok(self.head)
        }

        async fn get_mint_events(
            &self,
            creator: &str,
            from_block: u64,
            to_block: u64,
        ) -> Result<Vec<MintEvent>, ChainQueryError> {
            self.log_calls.fetch_add(1, Ordering::SeqCst);
            self.queried_ranges
                .lock()
                .unwrap()
                .push((from_block, to_block));
            if self.fail_logs.load(Ordering::SeqCst) {
                return Err(ChainQueryError::Rpc {
                    code: -32000,
                    message: "block range too wide".into(),
                });
            }
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| {
                    e.creator.eq_ignore_ascii_case(creator)
                        && e.block_number >= from_block
                        && e.block_number <= to_block
                })
                .cloned()
                .collect())
        }

        async fn token_uri(&self, token_id: &str) -> Result<String, ChainQueryError> {
            Ok(self
                .uris
                .lock()
                .unwrap()
                .get(token_id)
                .cloned()
                .unwrap_or_default())
        }

        async fn data_status(&self, token_id: &str) -> Result<u8, ChainQueryError> {
            Ok(self
                .statuses
                .lock()
                .unwrap()
                .get(token_id)
                .copied()
                .unwrap_or(0))
        }
    }

    #[derive(Default)]
    struct MockOracle {
        owners: StdMutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl MockOracle {
        fn set_owner(&self, token_id: &str, owner: &str) {
            self.owners
                .lock()
                .unwrap()
                .insert(token_id.to_string(), owner.to_string());
        }
    }

    #[async_trait]
    impl OwnershipOracle for MockOracle {
        async fn owner_of(&self, token_id: &str) -> Result<String, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.owners
                .lock()
                .unwrap()
                .get(token_id)
                .cloned()
                .ok_or_else(|| OracleError::TokenUnavailable(token_id.to_string()))
        }
    }

    #[derive(Default)]
    struct MockFetcher {
        docs: StdMutex<HashMap<String, IpMetadata>>,
    }

    #[async_trait]
    impl MetadataFetcher for MockFetcher {
        async fn fetch(&self, token_uri: &str) -> Result<IpMetadata, MetadataFetchError> {
            self.docs
                .lock()
                .unwrap()
                .get(token_uri)
                .cloned()
                .ok_or(MetadataFetchError::Status(404))
        }
    }

    #[derive(Default)]
    struct MemoryCache {
        entries: StdMutex<HashMap<String, CacheEntry>>,
        stale: StdMutex<HashMap<String, bool>>,
    }

    impl CacheStore for MemoryCache {
        fn load(&self, owner: &str) -> Option<CacheEntry> {
            self.entries.lock().unwrap().get(owner).cloned()
        }

        fn save(&self, owner: &str, entry: &CacheEntry) -> anyhow::Result<()> {
            self.entries
                .lock()
                .unwrap()
                .insert(owner.to_string(), entry.clone());
            Ok(())
        }

        fn is_stale(&self, owner: &str) -> bool {
            self.stale.lock().unwrap().get(owner).copied().unwrap_or(false)
        }

        fn mark_stale(&self, owner: &str) -> anyhow::Result<()> {
            self.stale.lock().unwrap().insert(owner.to_string(), true);
            Ok(())
        }

        fn clear_stale(&self, owner: &str) -> anyhow::Result<()> {
            self.stale.lock().unwrap().insert(owner.to_string(), false);
            Ok(())
        }

        fn remove_record(&self, owner: &str, token_id: &str) -> anyhow::Result<()> {
            if let Some(entry) = self.entries.lock().unwrap().get_mut(owner) {
                entry.records.retain(|r| r.token_id != token_id);
            }
            Ok(())
        }
    }

    struct Harness {
        ledger: Arc<MockLedger>,
        oracle: Arc<MockOracle>,
        fetcher: Arc<MockFetcher>,
        cache: Arc<MemoryCache>,
        bus: Arc<RefreshBus>,
        sync: Synchronizer,
    }

    fn harness_with_settings(settings: Settings) -> Harness {
        let ledger = Arc::new(MockLedger {
            head: 250_000,
            ..MockLedger::default()
        });
        let oracle = Arc::new(MockOracle::default());
        let fetcher = Arc::new(MockFetcher::default());
        let cache = Arc::new(MemoryCache::default());
        let bus = Arc::new(RefreshBus::new());
        let sync = Synchronizer::new(
            ledger.clone(),
            oracle.clone(),
            fetcher.clone(),
            cache.clone(),
            bus.clone(),
            &settings,
        );
        Harness {
            ledger,
            oracle,
            fetcher,
            cache,
            bus,
            sync,
        }
    }

    fn harness() -> Harness {
        harness_with_settings(Settings::default())
    }

    #[test]
    fn test_chunk_ranges_respect_block_span() {
        assert_eq!(
            chunk_ranges(0, 250_000, 100_000),
            vec![(0, 100_000), (100_001, 200_000), (200_001, 250_000)]
        );
        // Head below one span: single chunk
        assert_eq!(chunk_ranges(0, 42, 100_000), vec![(0, 42)]);
        // Head exactly on a boundary
        assert_eq!(
            chunk_ranges(0, 200_000, 100_000),
            vec![(0, 100_000), (100_001, 200_000)]
        );
        assert_eq!(chunk_ranges(0, 0, 100_000), vec![(0, 0)]);
    }

    #[tokio::test]
    async fn test_full_sync_no_events_is_empty_not_error() {
        let h = harness();
        assert_eq!(h.sync.phase(OWNER), SyncPhase::Uninitialized);

        let records = h.sync.full_sync(OWNER).await.unwrap();
        assert!(records.is_empty());
        assert_eq!(h.sync.phase(OWNER), SyncPhase::Ready);
        // Cache overwritten and fresh
        assert_eq!(h.cache.load(OWNER).unwrap().records.len(), 0);
        assert!(!h.cache.is_stale(OWNER));
    }

    #[tokio::test]
    async fn test_full_sync_issues_exactly_three_chunked_queries() {
        let h = harness();
        h.sync.full_sync(OWNER).await.unwrap();

        let ranges = h.ledger.queried_ranges.lock().unwrap().clone();
        assert_eq!(
            ranges,
            vec![(0, 100_000), (100_001, 200_000), (200_001, 250_000)]
        );
    }

    #[tokio::test]
    async fn test_full_sync_excludes_transferred_and_deleted_tokens() {
        let h = harness();
        h.ledger.events.lock().unwrap().extend([
            mint_event("7", 10),
            mint_event("8", 20),
            mint_event("9", 150_000),
        ]);
        h.oracle.set_owner("7", OWNER);
        h.oracle.set_owner("8", OTHER); // transferred away before sync
                                        // token 9 has no oracle entry: deleted

        let records = h.sync.full_sync(OWNER).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.token_id.as_str()).collect();
        assert_eq!(ids, vec!["7"]);
    }

    #[tokio::test]
    async fn test_full_sync_metadata_is_best_effort() {
        let h = harness();
        h.ledger.events.lock().unwrap().extend([
            mint_event("7", 10),
            mint_event("8", 20),
        ]);
        h.oracle.set_owner("7", OWNER);
        h.oracle.set_owner("8", OWNER);
        h.ledger
            .uris
            .lock()
            .unwrap()
            .insert("7".to_string(), "https://meta.example/7".to_string());
        h.ledger
            .uris
            .lock()
            .unwrap()
            .insert("8".to_string(), "https://meta.example/8".to_string());
        // Only token 7's document resolves; 8's fetch will 404
        h.fetcher.docs.lock().unwrap().insert(
            "https://meta.example/7".to_string(),
            IpMetadata {
                title: "Seven".to_string(),
                description: String::new(),
                category: String::new(),
                attribution: String::new(),
                image: String::new(),
            },
        );

        let records = h.sync.full_sync(OWNER).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata.as_ref().unwrap().title, "Seven");
        assert!(records[1].metadata.is_none());
        assert_eq!(records[1].token_uri, "https://meta.example/8");
    }

    #[tokio::test]
    async fn test_full_sync_fails_when_head_unavailable() {
        let h = harness();
        h.ledger.fail_head.store(true, Ordering::SeqCst);
        assert!(matches!(
            h.sync.full_sync(OWNER).await,
            Err(SyncError::ChainHead(_))
        ));
        assert_eq!(h.sync.phase(OWNER), SyncPhase::Uninitialized);
    }

    #[tokio::test]
    async fn test_full_sync_fails_only_when_every_chunk_fails() {
        let h = harness();
        h.ledger.fail_logs.store(true, Ordering::SeqCst);
        assert!(matches!(
            h.sync.full_sync(OWNER).await,
            Err(SyncError::AllChunksFailed(3))
        ));
    }

    #[tokio::test]
    async fn test_incremental_reconcile_is_idempotent() {
        let h = harness();
        h.cache
            .save(OWNER, &CacheEntry::new(vec![record("7"), record("8")]))
            .unwrap();
        h.oracle.set_owner("7", OWNER);
        h.oracle.set_owner("8", OWNER);

        let first = h.sync.incremental_reconcile(OWNER).await.unwrap();
        let second = h.sync.incremental_reconcile(OWNER).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        // Reconcile never touches historical logs
        assert_eq!(h.ledger.log_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_incremental_reconcile_prunes_transferred_records() {
        let h = harness();
        h.cache
            .save(OWNER, &CacheEntry::new(vec![record("7"), record("8")]))
            .unwrap();
        h.oracle.set_owner("7", OWNER);
        h.oracle.set_owner("8", OTHER);

        let records = h.sync.incremental_reconcile(OWNER).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].token_id, "7");
        // Pruned from the cache too
        assert_eq!(h.cache.load(OWNER).unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_full_sync_on_next_access() {
        let h = harness();
        h.cache
            .save(OWNER, &CacheEntry::new(vec![record("7")]))
            .unwrap();
        h.oracle.set_owner("7", OWNER);

        // Fresh cache: cheap path, no log queries
        h.sync.trigger_sync(OWNER).await.unwrap();
        assert_eq!(h.ledger.log_calls.load(Ordering::SeqCst), 0);

        // Invalidated cache: full scan
        h.ledger.events.lock().unwrap().push(mint_event("7", 10));
        h.sync.invalidate(OWNER);
        h.sync.trigger_sync(OWNER).await.unwrap();
        assert!(h.ledger.log_calls.load(Ordering::SeqCst) > 0);
        assert!(!h.cache.is_stale(OWNER));
    }

    #[tokio::test]
    async fn test_get_page_validates_before_any_network_call() {
        let h = harness();

        let err = h.sync.get_page("not-an-address", 1, 20).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::InvalidAddress(_))
        ));

        let err = h.sync.get_page(OWNER, 1, 0).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::InvalidPageSize)
        ));

        let err = h.sync.get_page(OWNER, 0, 20).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::Validation(ValidationError::InvalidPageNumber)
        ));

        assert_eq!(h.ledger.log_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_token_honors_configured_deleted_sentinel() {
        let h = harness();
        h.oracle.set_owner("5", OWNER);
        h.ledger.statuses.lock().unwrap().insert("5".to_string(), 1);

        // Default sentinel is 1: token reads as deleted
        assert_eq!(
            h.sync.fetch_token(OWNER, "5").await.unwrap(),
            TokenLookup::Deleted
        );

        // Same chain state, sentinel reconfigured to 2: token is owned
        let h2 = harness_with_settings(Settings {
            deleted_status_code: 2,
            ..Settings::default()
        });
        h2.oracle.set_owner("5", OWNER);
        h2.ledger.statuses.lock().unwrap().insert("5".to_string(), 1);
        assert!(matches!(
            h2.sync.fetch_token(OWNER, "5").await.unwrap(),
            TokenLookup::Owned(_)
        ));
    }

    #[tokio::test]
    async fn test_fetch_token_not_owner_and_cache_hit() {
        let h = harness();
        h.oracle.set_owner("5", OTHER);
        assert_eq!(
            h.sync.fetch_token(OWNER, "5").await.unwrap(),
            TokenLookup::NotOwner
        );

        // A cached record short-circuits the chain entirely
        h.cache
            .save(OWNER, &CacheEntry::new(vec![record("6")]))
            .unwrap();
        let calls_before = h.oracle.calls.load(Ordering::SeqCst);
        let looked_up = h.sync.fetch_token(OWNER, "6").await.unwrap();
        assert!(matches!(looked_up, TokenLookup::Owned(r) if r.token_id == "6"));
        assert_eq!(h.oracle.calls.load(Ordering::SeqCst), calls_before);
    }

    #[tokio::test]
    async fn test_after_transfer_prunes_invalidates_and_publishes_once() {
        let h = harness();
        h.cache
            .save(OWNER, &CacheEntry::new(vec![record("7"), record("8")]))
            .unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_in = hits.clone();
        h.sync.on_mutation(OWNER, move || {
            hits_in.fetch_add(1, Ordering::SeqCst);
        });

        h.sync.after_transfer(OWNER, "7");

        let left = h.cache.load(OWNER).unwrap();
        assert_eq!(left.records.len(), 1);
        assert_eq!(left.records[0].token_id, "8");
        assert!(h.cache.is_stale(OWNER));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_mutation_event_reaches_other_mounted_views() {
        let h = harness();
        h.ledger.events.lock().unwrap().push(mint_event("7", 10));
        h.oracle.set_owner("7", OWNER);

        // Two mounted views for OWNER, one for an unrelated owner
        let view_a = Arc::new(AtomicUsize::new(0));
        let view_b = Arc::new(AtomicUsize::new(0));
        let unrelated = Arc::new(AtomicUsize::new(0));
        let (a, b, u) = (view_a.clone(), view_b.clone(), unrelated.clone());
        h.sync.on_mutation(OWNER, move || {
            a.fetch_add(1, Ordering::SeqCst);
        });
        h.sync.on_mutation(OWNER, move || {
            b.fetch_add(1, Ordering::SeqCst);
        });
        let unrelated_token = h.sync.on_mutation(OTHER, move || {
            u.fetch_add(1, Ordering::SeqCst);
        });

        // The mint view reports a fresh mint of token 7
        h.sync.after_mint(OWNER);
        assert_eq!(view_a.load(Ordering::SeqCst), 1);
        assert_eq!(view_b.load(Ordering::SeqCst), 1);
        assert_eq!(unrelated.load(Ordering::SeqCst), 0);

        // Both views re-sync and see the token on page 1
        for _ in 0..2 {
            let page = h.sync.get_page(OWNER, 1, 20).await.unwrap();
            assert!(page.items.iter().any(|r| r.token_id == "7"));
            assert_eq!(page.total_pages, 1);
        }

        h.sync.unsubscribe(unrelated_token);
        assert_eq!(h.bus.listener_count(), 2);
    }
}
