//! Explicit per-run cache.
//!
//! Replaces implicit memoization with an owned slot that is created for one
//! materialization run, populated lazily, and never persisted across runs.
//! Invalidation is explicit so callers can discard a working set when the
//! upstream content it was built from changes mid-run.

pub struct RunCache<T> {
    slot: Option<T>,
}

impl<T> RunCache<T> {
    pub fn new() -> Self {
        Self { slot: None }
    }

    pub fn get(&self) -> Option<&T> {
        self.slot.as_ref()
    }

    pub fn set(&mut self, value: T) -> &T {
        self.slot.insert(value)
    }

    pub fn get_or_try_init<E>(
        &mut self,
        init: impl FnOnce() -> Result<T, E>,
    ) -> Result<&T, E> {
        if self.slot.is_none() {
            self.slot = Some(init()?);
        }
        Ok(self.slot.as_ref().unwrap())
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }

    pub fn is_populated(&self) -> bool {
        self.slot.is_some()
    }
}

impl<T> Default for RunCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initializes_once_until_invalidated() {
        let mut cache: RunCache<u32> = RunCache::new();
        assert!(!cache.is_populated());

        let mut calls = 0;
        let v = *cache
            .get_or_try_init(|| -> Result<u32, ()> {
                calls += 1;
                Ok(10)
            })
            .unwrap();
        assert_eq!(v, 10);

        let v = *cache
            .get_or_try_init(|| -> Result<u32, ()> {
                calls += 1;
                Ok(20)
            })
            .unwrap();
        assert_eq!(v, 10);
        assert_eq!(calls, 1);

        cache.invalidate();
        assert!(!cache.is_populated());
        let v = *cache
            .get_or_try_init(|| -> Result<u32, ()> {
                calls += 1;
                Ok(20)
            })
            .unwrap();
        assert_eq!(v, 20);
        assert_eq!(calls, 2);
    }

    #[test]
    fn failed_init_leaves_cache_empty() {
        let mut cache: RunCache<u32> = RunCache::new();
        let err = cache.get_or_try_init(|| Err::<u32, &str>("nope"));
        assert!(err.is_err());
        assert!(!cache.is_populated());
    }
}
