use anyhow::Result;

use crate::storage::{keys, LocalStore};

/// ETF ids the visitor is following, in insertion order.
pub fn list(store: &LocalStore) -> Result<Vec<String>> {
    store.get_or_default(keys::WATCHLIST)
}

/// Returns `false` when the id was already present.
pub fn add(store: &mut LocalStore, etf_id: &str) -> Result<bool> {
    let mut ids = list(store)?;
    if ids.iter().any(|id| id == etf_id) {
        return Ok(false);
    }
    ids.push(etf_id.to_string());
    store.set_json(keys::WATCHLIST, &ids)?;
    Ok(true)
}

pub fn remove(store: &mut LocalStore, etf_id: &str) -> Result<bool> {
    let mut ids = list(store)?;
    let before = ids.len();
    ids.retain(|id| id != etf_id);
    if ids.len() == before {
        return Ok(false);
    }
    store.set_json(keys::WATCHLIST, &ids)?;
    Ok(true)
}

pub fn contains(store: &LocalStore, etf_id: &str) -> Result<bool> {
    Ok(list(store)?.iter().any(|id| id == etf_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let mut store = LocalStore::in_memory().unwrap();
        assert!(add(&mut store, "vwce").unwrap());
        assert!(!add(&mut store, "vwce").unwrap());
        assert!(add(&mut store, "cspx").unwrap());
        assert_eq!(list(&store).unwrap(), vec!["vwce", "cspx"]);
        assert!(contains(&store, "cspx").unwrap());
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut store = LocalStore::in_memory().unwrap();
        add(&mut store, "vwce").unwrap();
        assert!(!remove(&mut store, "cspx").unwrap());
        assert!(remove(&mut store, "vwce").unwrap());
        assert!(list(&store).unwrap().is_empty());
    }
}
