use std::collections::HashMap;
use std::path::PathBuf;

use super::walker::WalkedFile;

/// The reconciliation diff between the index snapshot and the filesystem
/// snapshot. The four sets are pairwise disjoint and cover the union of
/// both key spaces.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// On disk, not in the index.
    pub add: Vec<PathBuf>,
    /// In both, disk mtime is newer.
    pub update: Vec<PathBuf>,
    /// In the index, gone from disk.
    pub delete: Vec<String>,
    /// In both, unchanged by mtime.
    pub skip: usize,
}

impl ReconcilePlan {
    pub fn pending(&self) -> usize {
        self.add.len() + self.update.len()
    }
}

/// Computes the diff. Runs before any content extraction; the
/// content-hash check happens later, per file, during processing.
pub fn reconcile(index_snapshot: &HashMap<String, i64>, fs_snapshot: &[WalkedFile]) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let mut seen_on_disk: std::collections::HashSet<String> =
        std::collections::HashSet::with_capacity(fs_snapshot.len());

    for file in fs_snapshot {
        let key = file.path.to_string_lossy().into_owned();
        match index_snapshot.get(&key) {
            None => plan.add.push(file.path.clone()),
            Some(&indexed_mtime) if file.modified_ms > indexed_mtime => {
                plan.update.push(file.path.clone())
            }
            Some(_) => plan.skip += 1,
        }
        seen_on_disk.insert(key);
    }

    for path in index_snapshot.keys() {
        if !seen_on_disk.contains(path) {
            plan.delete.push(path.clone());
        }
    }
    plan.delete.sort();
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walked(path: &str, modified_ms: i64) -> WalkedFile {
        WalkedFile {
            path: PathBuf::from(path),
            modified_ms,
            size: 1,
        }
    }

    #[test]
    fn four_sets_partition_the_key_union() {
        let index: HashMap<String, i64> = [
            ("/kept.txt".to_string(), 100),
            ("/stale.txt".to_string(), 100),
            ("/gone.txt".to_string(), 100),
        ]
        .into();
        let fs = vec![
            walked("/kept.txt", 100),
            walked("/stale.txt", 200),
            walked("/new.txt", 50),
        ];

        let plan = reconcile(&index, &fs);
        assert_eq!(plan.add, vec![PathBuf::from("/new.txt")]);
        assert_eq!(plan.update, vec![PathBuf::from("/stale.txt")]);
        assert_eq!(plan.delete, vec!["/gone.txt".to_string()]);
        assert_eq!(plan.skip, 1);
        assert_eq!(
            plan.add.len() + plan.update.len() + plan.delete.len() + plan.skip,
            4
        );
    }

    #[test]
    fn older_disk_mtime_is_a_skip_not_an_update() {
        let index: HashMap<String, i64> = [("/doc.txt".to_string(), 500)].into();
        let plan = reconcile(&index, &[walked("/doc.txt", 100)]);
        assert_eq!(plan.skip, 1);
        assert!(plan.update.is_empty());
    }

    #[test]
    fn empty_index_means_everything_adds() {
        let plan = reconcile(&HashMap::new(), &[walked("/a", 1), walked("/b", 1)]);
        assert_eq!(plan.add.len(), 2);
        assert_eq!(plan.pending(), 2);
        assert!(plan.delete.is_empty());
    }

    #[test]
    fn empty_disk_means_everything_deletes() {
        let index: HashMap<String, i64> = [("/a".to_string(), 1)].into();
        let plan = reconcile(&index, &[]);
        assert_eq!(plan.delete, vec!["/a".to_string()]);
    }
}
