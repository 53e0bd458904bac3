use alloy::providers::RootProvider;

/// The read-only RPC provider used by the indexer. No fillers: it never
/// sends transactions.
pub type ChainProvider = RootProvider;

/// Create an HTTP provider from an RPC URL string.
pub fn create_provider(rpc_url: &str) -> eyre::Result<ChainProvider> {
    let url = rpc_url.parse()?;
    tracing::debug!(%url, "Creating HTTP provider");
    Ok(RootProvider::new_http(url))
}
