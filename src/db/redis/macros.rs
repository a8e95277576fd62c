/// Read-through caching over [`crate::db::Cache`].
///
/// Looks the key up first and returns the cached value on a hit. On a miss it
/// awaits `$block`, hands the result to the background writer with the given
/// TTL, and returns it. Cache read failures count as misses so a Redis outage
/// never fails the request.
///
/// # Arguments
/// * `$cache`: a `Cache` (anything with `get_or_miss` and `set_in_background`).
/// * `$key`: the `CacheKey` to read and write.
/// * `$ttl`: time-to-live in seconds.
/// * `$block`: a future yielding `AppResult<T>`, run on a miss.
///
/// # Example
/// ```rust,ignore
/// let results = cached!(state.cache, key, DEFAULT_TTL, async {
///     catalog.search(&query, page).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        if let Some(cached) = $cache.get_or_miss(&$key).await {
            Ok(cached)
        } else {
            match $block.await {
                Ok(value) => {
                    $cache.set_in_background(&$key, &value, $ttl);
                    Ok(value)
                }
                Err(e) => Err(e),
            }
        }
    }};
}
