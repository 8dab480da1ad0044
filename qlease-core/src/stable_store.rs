use crate::error::StartupError;
use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
};

/// An append-only sink the layer above the lease core may use for durable records.
///
/// The lease core itself never reads this back and makes no durability claim about lease state
/// across restarts (leases are always reacquired from scratch, per the Non-goals) — it only
/// needs a place to hand off bytes the consensus layer above considers worth persisting.
pub trait StableStore: Write + Send {}

impl<T: Write + Send> StableStore for T {}

/// Opens `stable-store-replica{id}` in the given directory for appending, creating it if absent.
///
/// Per §7, failure to create the stable-store file is fatal at startup.
pub fn open_stable_store(dir: &Path, replica_id: u32) -> Result<File, StartupError> {
    let path = dir.join(format!("stable-store-replica{replica_id}"));
    OpenOptions::new().create(true).append(true).open(path).map_err(StartupError::StableStore)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_stable_store_creates_the_file_if_absent() {
        let dir = std::env::temp_dir().join(format!("qlease-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let file = open_stable_store(&dir, 0);
        assert!(file.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }
}
