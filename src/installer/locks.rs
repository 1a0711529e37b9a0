use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Lock table keyed by module name.
///
/// The existence check for a module directory and the extraction into it
/// are separate steps; holding the name's lock across both keeps two
/// concurrent installs of the same module from racing past the check.
/// This only covers installs within one process.
#[derive(Default)]
pub struct NameLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get (or create) the lock for a name. Callers hold the returned
    /// mutex for the duration of the guarded section.
    pub fn acquire(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.inner.lock().unwrap();
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_same_name_shares_a_lock() {
        let locks = NameLocks::new();
        let a = locks.acquire("blog");
        let b = locks.acquire("blog");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_different_names_do_not_share() {
        let locks = NameLocks::new();
        let a = locks.acquire("blog");
        let b = locks.acquire("shop");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_lock_serializes_critical_sections() {
        let locks = Arc::new(NameLocks::new());
        let counter = Arc::new(Mutex::new(0u32));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let counter = counter.clone();
                thread::spawn(move || {
                    let lock = locks.acquire("blog");
                    let _guard = lock.lock().unwrap();
                    let mut count = counter.lock().unwrap();
                    *count += 1;
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(*counter.lock().unwrap(), 8);
    }
}
