//! Serializes `READ3args`.

use std::io::{self, Write};

use crate::nfs3::Handle;
use crate::serializer::nfs3::file::handle;
use crate::serializer::{u32, u64};

pub fn args(dest: &mut impl Write, file: &Handle, offset: u64, count: u32) -> io::Result<()> {
    handle(dest, file)?;
    u64(dest, offset)?;
    u32(dest, count)
}

#[cfg(test)]
mod tests {
    use super::args;
    use crate::nfs3::Handle;

    #[test]
    fn test_read_args() {
        let mut dest = Vec::new();
        args(&mut dest, &Handle(vec![0x01]), 1024, 32768).unwrap();
        #[rustfmt::skip]
        const EXPECTED: &[u8] = &[
            0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, // handle
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x04, 0x00, // offset 1024
            0x00, 0x00, 0x80, 0x00, // count 32768
        ];
        assert_eq!(dest, EXPECTED);
    }
}
