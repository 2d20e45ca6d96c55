//! Sortable entity identifiers
//!
//! IDs are ULIDs in their 26-character Crockford base32 form. A shared
//! monotonic generator keeps IDs minted within one millisecond in creation
//! order.

use std::sync::{LazyLock, Mutex};
use ulid::{Generator, Ulid};

static GENERATOR: LazyLock<Mutex<Generator>> = LazyLock::new(|| Mutex::new(Generator::new()));

/// Generate a new identifier
pub fn new_id() -> String {
    let mut generator = GENERATOR.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    // Overflow needs 2^80 IDs in one millisecond; a fresh random ULID is fine then
    generator.generate().unwrap_or_else(|_| Ulid::new()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_shape() {
        let id = new_id();
        assert_eq!(id.len(), 26);
        assert!(Ulid::from_string(&id).is_ok());
    }

    #[test]
    fn test_ids_are_strictly_increasing() {
        let ids: Vec<String> = (0..1000).map(|_| new_id()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_ids_sort_by_time() {
        let earlier = new_id();
        std::thread::sleep(std::time::Duration::from_millis(3));
        let later = new_id();
        assert!(earlier < later);
    }
}
