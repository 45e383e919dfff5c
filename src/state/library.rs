use tracing::{info, warn};

use super::kv::{KeyValueStore, WriteBatch};
use crate::error::{Error, Result};
use crate::media::compress::CompressedPhoto;

/// The PhotoLibrary keeps an ordered list of compressed profile photos.
///
/// Entries live under dense keys `<prefix>_0 .. <prefix>_{n-1}` with no gaps.
/// `load_all` stops at the first missing key, so a gap would silently hide
/// everything after it. Every mutation therefore rewrites the whole range
/// from 0 in a single atomic batch and removes the now-unused tail keys.
pub struct PhotoLibrary<S> {
    store: S,
    prefix: String,
}

impl<S: KeyValueStore> PhotoLibrary<S> {
    pub fn new(store: S, prefix: impl Into<String>) -> Self {
        PhotoLibrary {
            store,
            prefix: prefix.into(),
        }
    }

    /// Storage key for an index
    pub fn key(&self, index: usize) -> String {
        format!("{}_{}", self.prefix, index)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the contiguous run of photos starting at index 0.
    /// A missing `<prefix>_0` yields an empty library.
    pub fn load_all(&self) -> Result<Vec<CompressedPhoto>> {
        let mut photos = Vec::new();
        while let Some(value) = self.store.get(&self.key(photos.len()))? {
            photos.push(CompressedPhoto::from_data_uri(value));
        }
        Ok(photos)
    }

    /// Number of photos currently stored
    pub fn len(&self) -> Result<usize> {
        Ok(self.load_all()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.store.get(&self.key(0))?.is_none())
    }

    /// Fetch one photo by index
    pub fn get(&self, index: usize) -> Result<Option<CompressedPhoto>> {
        // Only indices inside the contiguous run count as stored
        let photos = self.load_all()?;
        Ok(photos.get(index).cloned())
    }

    /// Append photos after the current contents
    pub fn append_batch(&mut self, photos: Vec<CompressedPhoto>) -> Result<Vec<CompressedPhoto>> {
        let mut all = self.load_all()?;
        let old_len = all.len();
        let added = photos.len();
        all.extend(photos);

        self.rewrite(old_len, &all)?;
        info!("➕ Added {} photo(s), library now holds {}", added, all.len());
        Ok(all)
    }

    /// Remove the photo at `index` and shift every later photo down by one
    pub fn delete_at(&mut self, index: usize) -> Result<Vec<CompressedPhoto>> {
        let mut all = self.load_all()?;
        let old_len = all.len();
        if index >= old_len {
            return Err(Error::IndexOutOfRange { index, len: old_len });
        }
        all.remove(index);

        self.rewrite(old_len, &all)?;
        info!("🗑️  Deleted photo {}, library now holds {}", index, all.len());
        Ok(all)
    }

    /// Write `photos` to keys `0..photos.len()` and drop keys up to `old_len`.
    /// One batch, so a refused write leaves the previous contents intact.
    fn rewrite(&mut self, old_len: usize, photos: &[CompressedPhoto]) -> Result<()> {
        let mut batch = WriteBatch::new();
        for index in photos.len()..old_len {
            batch.remove(self.key(index));
        }
        for (index, photo) in photos.iter().enumerate() {
            batch.put(self.key(index), photo.as_str());
        }

        self.store.commit(batch).map_err(|e| {
            if e.is_quota_exceeded() {
                warn!("Library write refused, store left unchanged: {}", e);
            }
            e
        })
    }
}

// Implement Debug for better error messages
impl<S> std::fmt::Debug for PhotoLibrary<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoLibrary")
            .field("prefix", &self.prefix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::kv::{MemoryStore, SqliteStore};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn photo(tag: &str) -> CompressedPhoto {
        CompressedPhoto::from_data_uri(format!("data:image/jpeg;base64,{}", tag))
    }

    fn library() -> PhotoLibrary<MemoryStore> {
        PhotoLibrary::new(MemoryStore::new(1024 * 1024), "dpsaver")
    }

    #[test]
    fn test_empty_library() {
        let lib = library();
        assert!(lib.load_all().unwrap().is_empty());
        assert!(lib.is_empty().unwrap());
    }

    #[test]
    fn test_delete_resequences_keys() {
        let mut lib = library();
        lib.append_batch(vec![photo("A"), photo("B"), photo("C")]).unwrap();

        let remaining = lib.delete_at(1).unwrap();

        assert_eq!(remaining, vec![photo("A"), photo("C")]);
        assert_eq!(lib.store().get("dpsaver_0").unwrap().as_deref(), Some(photo("A").as_str()));
        assert_eq!(lib.store().get("dpsaver_1").unwrap().as_deref(), Some(photo("C").as_str()));
        assert_eq!(lib.store().get("dpsaver_2").unwrap(), None);
    }

    #[test]
    fn test_append_keeps_existing_order() {
        let mut lib = library();
        lib.append_batch(vec![photo("A")]).unwrap();
        lib.append_batch(vec![photo("B"), photo("C")]).unwrap();

        assert_eq!(lib.load_all().unwrap(), vec![photo("A"), photo("B"), photo("C")]);
        assert_eq!(lib.get(2).unwrap(), Some(photo("C")));
        assert_eq!(lib.get(3).unwrap(), None);
    }

    #[test]
    fn test_delete_out_of_range_writes_nothing() {
        let mut lib = library();
        lib.append_batch(vec![photo("A")]).unwrap();
        let commits = lib.store().commit_count();

        let err = lib.delete_at(5).unwrap_err();

        assert!(matches!(err, Error::IndexOutOfRange { index: 5, len: 1 }));
        assert_eq!(lib.store().commit_count(), commits);
    }

    #[test]
    fn test_quota_failure_leaves_library_intact() {
        let mut lib = PhotoLibrary::new(MemoryStore::new(120), "dpsaver");
        lib.append_batch(vec![photo("A"), photo("B")]).unwrap();

        let big = CompressedPhoto::from_data_uri("x".repeat(200));
        let err = lib.append_batch(vec![big]).unwrap_err();

        assert!(err.is_quota_exceeded());
        assert_eq!(lib.load_all().unwrap(), vec![photo("A"), photo("B")]);
    }

    #[test]
    fn test_random_operations_match_reference_list() {
        let mut lib = library();
        let mut reference: Vec<CompressedPhoto> = Vec::new();
        let mut rng = StdRng::seed_from_u64(7);

        for step in 0..200 {
            if reference.is_empty() || rng.gen_bool(0.6) {
                let count = rng.gen_range(1..=3);
                let batch: Vec<_> = (0..count).map(|i| photo(&format!("{}-{}", step, i))).collect();
                reference.extend(batch.iter().cloned());
                lib.append_batch(batch).unwrap();
            } else {
                let index = rng.gen_range(0..reference.len());
                reference.remove(index);
                lib.delete_at(index).unwrap();
            }

            let first = lib.load_all().unwrap();
            let second = lib.load_all().unwrap();
            assert_eq!(first, reference);
            assert_eq!(first, second);

            // No key beyond the contiguous run may survive
            let expected_keys = reference.len();
            assert_eq!(lib.store().keys().len(), expected_keys);
        }
    }

    #[test]
    fn test_sqlite_backed_library() {
        let store = SqliteStore::open_in_memory(1024 * 1024).unwrap();
        let mut lib = PhotoLibrary::new(store, "dpsaver");

        lib.append_batch(vec![photo("A"), photo("B"), photo("C")]).unwrap();
        lib.delete_at(0).unwrap();

        assert_eq!(lib.load_all().unwrap(), vec![photo("B"), photo("C")]);
        assert_eq!(lib.store().get("dpsaver_2").unwrap(), None);
    }
}
