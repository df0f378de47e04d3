//! Serialization of MOUNT v3 call arguments.

use std::io::{self, Write};

use crate::mount3::MNTPATHLEN;
use crate::serializer::string_max_size;

/// Serializes the `dirpath` argument shared by `MNT` and `UMNT`.
pub fn dirpath_args(dest: &mut impl Write, export_path: &str) -> io::Result<()> {
    string_max_size(dest, export_path, MNTPATHLEN)
}

#[cfg(test)]
mod tests {
    use super::dirpath_args;

    #[test]
    fn test_dirpath() {
        let mut dest = Vec::new();
        dirpath_args(&mut dest, "/srv/share").unwrap();
        assert_eq!(
            dest,
            [
                0x00, 0x00, 0x00, 0x0a, b'/', b's', b'r', b'v', b'/', b's', b'h', b'a', b'r',
                b'e', 0x00, 0x00,
            ]
        );
    }
}
