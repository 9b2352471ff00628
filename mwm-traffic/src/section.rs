//! # Local key sections
//!
//! Keys can ship alongside the map data, saving a round trip to the traffic server.

use crate::remote::{KEYS_FILE_SUFFIX, MwmId, TRAFFIC_FILE_EXTENSION};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// A read-only source of encoded traffic keys for an mwm.
pub trait KeysSection {
    /// Reads the encoded keys, if this source has them.
    ///
    /// # Errors
    ///
    /// Returns an error only when the section exists but can't be read.
    fn read_keys(&self, mwm: &MwmId) -> std::io::Result<Option<Vec<u8>>>;
}

/// A source without any keys; they will always be fetched remotely.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoKeysSection;

impl KeysSection for NoKeysSection {
    fn read_keys(&self, _mwm: &MwmId) -> std::io::Result<Option<Vec<u8>>> {
        Ok(None)
    }
}

/// Reads keys from `<dir>/<region>.traffic.keys` files.
#[derive(Clone, Debug)]
pub struct DirectoryKeysSection {
    dir: PathBuf,
}

impl DirectoryKeysSection {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// The path where the keys for `mwm` would be found.
    pub fn path_for(&self, mwm: &MwmId) -> PathBuf {
        self.dir.join(format!(
            "{}{TRAFFIC_FILE_EXTENSION}{KEYS_FILE_SUFFIX}",
            mwm.region()
        ))
    }
}

impl KeysSection for DirectoryKeysSection {
    fn read_keys(&self, mwm: &MwmId) -> std::io::Result<Option<Vec<u8>>> {
        match std::fs::read(self.path_for(mwm)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_section() {
        let dir = std::env::temp_dir().join(format!("mwm-traffic-section-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let section = DirectoryKeysSection::new(&dir);
        let present = MwmId::new("Monaco", 1);
        let absent = MwmId::new("Andorra", 1);
        std::fs::write(section.path_for(&present), [0, 0]).unwrap();

        assert_eq!(section.read_keys(&present).unwrap(), Some(vec![0, 0]));
        assert_eq!(section.read_keys(&absent).unwrap(), None);
        assert!(section.path_for(&present).ends_with("Monaco.traffic.keys"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
