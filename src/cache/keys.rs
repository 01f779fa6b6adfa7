//! Cache key derivation

use sha2::{Digest, Sha256};

use crate::data::{MAX_ITEM_COUNT, MIN_ITEM_COUNT};

/// Prefix shared by every events cache key
pub const CACHE_KEY_PREFIX: &str = "events_";

/// Key for the events of `api_url` fetched with `item_count`
///
/// The URL and count are separated by a NUL byte so that `("…/a1", 2)` and
/// `("…/a", 12)` hash differently.
pub fn cache_key(api_url: &str, item_count: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_url.as_bytes());
    hasher.update([0u8]);
    hasher.update(item_count.to_string().as_bytes());
    format!("{CACHE_KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}

/// Every key a URL can occupy, paired with its item count
pub fn keys_for_url(api_url: &str) -> impl Iterator<Item = (u32, String)> + '_ {
    (MIN_ITEM_COUNT..=MAX_ITEM_COUNT)
        .map(move |item_count| (item_count, cache_key(api_url, item_count)))
}
