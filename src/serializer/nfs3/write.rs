//! Serializes `WRITE3args`.

use std::io::{self, Write};

use crate::nfs3::{Handle, StableHow};
use crate::serializer::nfs3::file::handle;
use crate::serializer::{u32, u64, variant, vector};

pub fn args(
    dest: &mut impl Write,
    file: &Handle,
    offset: u64,
    stable: StableHow,
    data: &[u8],
) -> io::Result<()> {
    handle(dest, file)?;
    u64(dest, offset)?;
    u32(dest, data.len() as u32)?;
    variant(dest, stable as u32)?;
    vector(dest, data)
}

#[cfg(test)]
mod tests {
    use super::args;
    use crate::nfs3::{Handle, StableHow};

    #[test]
    fn test_write_args_unstable() {
        let mut dest = Vec::new();
        args(&mut dest, &Handle(vec![0x01]), 0, StableHow::Unstable, b"hi").unwrap();
        #[rustfmt::skip]
        const EXPECTED: &[u8] = &[
            0x00, 0x00, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00, // handle
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // offset 0
            0x00, 0x00, 0x00, 0x02, // count 2
            0x00, 0x00, 0x00, 0x00, // UNSTABLE
            0x00, 0x00, 0x00, 0x02, b'h', b'i', 0x00, 0x00, // data
        ];
        assert_eq!(dest, EXPECTED);
    }
}
