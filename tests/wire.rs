//! Wire-format round trips through the public parser/serializer API.

mod rpc {
    use std::io::Cursor;

    use ampm::parser;
    use ampm::rpc::AuthSys;
    use ampm::serializer;

    #[test]
    fn call_header_then_accepted_reply() {
        let mut call = Vec::new();
        serializer::rpc::call_header(&mut call, 77, 100003, 3, 6, Some(&AuthSys::default()))
            .unwrap();
        assert_eq!(&call[0..4], &77u32.to_be_bytes());

        // A matching minimal server reply.
        let mut reply = Vec::new();
        for word in [77u32, 1, 0, 0, 0, 0] {
            reply.extend_from_slice(&word.to_be_bytes());
        }
        parser::rpc::reply_header(&mut Cursor::new(reply), 77).unwrap();
    }

    #[test]
    fn getport_round_trip() {
        let mut args = Vec::new();
        serializer::rpc::getport_args(&mut args, 100003, 3).unwrap();
        assert_eq!(args.len(), 16);

        let mut reply = Cursor::new(2049u32.to_be_bytes().to_vec());
        assert_eq!(parser::rpc::getport_result(&mut reply).unwrap(), 2049);
    }
}

mod nfs3 {
    use std::io::Cursor;

    use ampm::nfs3::{Handle, StableHow};
    use ampm::parser::nfs3::{read_dir_plus, NfsResult};
    use ampm::serializer::nfs3::{read_dir_plus as read_dir_plus_args, write as write_args};

    #[test]
    fn write_args_layout() {
        let mut args = Vec::new();
        write_args::args(&mut args, &Handle(vec![9; 8]), 512, StableHow::Unstable, b"data")
            .unwrap();

        // handle (4 + 8) + offset (8) + count (4) + stable (4) + data (4 + 4)
        assert_eq!(args.len(), 36);
        assert_eq!(&args[12..20], &512u64.to_be_bytes());
    }

    #[test]
    fn readdirplus_reply_with_typed_entries() {
        let mut args = Vec::new();
        read_dir_plus_args::args(&mut args, &Handle(vec![1]), 0, [0; 8], 8192, 32768).unwrap();

        let mut reply = Vec::new();
        reply.extend_from_slice(&0u32.to_be_bytes()); // NFS3_OK
        reply.extend_from_slice(&0u32.to_be_bytes()); // no dir attrs
        reply.extend_from_slice(&[7u8; 8]); // cookieverf

        reply.extend_from_slice(&1u32.to_be_bytes()); // entry follows
        reply.extend_from_slice(&42u64.to_be_bytes()); // fileid
        reply.extend_from_slice(&8u32.to_be_bytes()); // name length
        reply.extend_from_slice(b"file.bin");
        reply.extend_from_slice(&3u64.to_be_bytes()); // cookie
        reply.extend_from_slice(&0u32.to_be_bytes()); // no attrs
        reply.extend_from_slice(&0u32.to_be_bytes()); // no handle

        reply.extend_from_slice(&0u32.to_be_bytes()); // end of entries
        reply.extend_from_slice(&1u32.to_be_bytes()); // eof

        match read_dir_plus::result(&mut Cursor::new(reply)).unwrap() {
            NfsResult::Resok(ok) => {
                assert_eq!(ok.cookieverf, [7; 8]);
                assert_eq!(ok.entries.len(), 1);
                assert_eq!(ok.entries[0].name, "file.bin");
                assert_eq!(ok.entries[0].cookie, 3);
                assert!(ok.eof);
            }
            NfsResult::Resfail(code) => panic!("unexpected failure: {code}"),
        }
    }
}
