//! Thread-local compilation cache for regex patterns.
//!
//! Locators and rule targets are compiled once during validation and again
//! when a run starts; the cache makes the second compile free. Patch sets
//! are re-applied many times from the CLI and from long-lived callers, so
//! compiled patterns are kept per thread, capped at 256 entries.

use regex::Regex;
use std::cell::RefCell;
use std::collections::HashMap;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static REGEX_CACHE: RefCell<HashMap<String, Regex>> = RefCell::new(HashMap::new());
}

/// Get a compiled regex from cache, or compile and cache it.
///
/// Compilation errors are never cached. When the cap is reached the cache
/// is cleared and rebuilt on demand. `Regex` clones share the compiled
/// program, so returning an owned value is cheap.
pub fn get_or_compile(pattern: &str) -> Result<Regex, regex::Error> {
    REGEX_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }

        // Evict all if at capacity (simple but effective for batch workloads)
        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), compiled.clone());
        Ok(compiled)
    })
}

/// Clear the regex cache (mainly for testing).
pub fn clear_cache() {
    REGEX_CACHE.with(|cache| {
        cache.borrow_mut().clear();
    });
}

/// Number of compiled patterns held by this thread.
pub fn cache_size() -> usize {
    REGEX_CACHE.with(|cache| cache.borrow().len())
}
