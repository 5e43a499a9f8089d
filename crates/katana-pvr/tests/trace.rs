use pretty_assertions::assert_eq;
use proptest::prelude::*;

use katana_pvr::trace::{parse_trace, ContextRegs, TraceCmd, TraceError, TraceWriter};
use katana_pvr::{IspTsp, Tcw, Tsp};

#[test]
fn texture_and_context_round_trip() {
    let mut w = TraceWriter::new();
    w.write_texture(Tsp(0x11), Tcw(0x22), &[1, 2, 3], &[4, 5, 6, 7]);

    let regs = ContextRegs {
        autosort: true,
        stride: 320,
        pal_pxl_format: 2,
        video_width: 640,
        video_height: 480,
        bg_isp: IspTsp(0x1234),
        bg_tsp: Tsp(0x5678),
        bg_tcw: Tcw(0x9abc),
        bg_depth: 0.5,
        pt_alpha_ref: 0x40,
    };
    w.write_context(&regs, &[9; 16], &[8; 64]);

    let cmds = parse_trace(&w.finish()).unwrap();
    assert_eq!(cmds.len(), 2);

    match &cmds[0] {
        TraceCmd::Texture(t) => {
            assert_eq!(t.tsp, Tsp(0x11));
            assert_eq!(t.tcw, Tcw(0x22));
            assert_eq!(t.palette, vec![1, 2, 3]);
            assert_eq!(t.texture, vec![4, 5, 6, 7]);
        }
        other => panic!("expected texture, got {other:?}"),
    }

    match &cmds[1] {
        TraceCmd::Context(c) => {
            assert_eq!(c.regs, regs);
            assert_eq!(c.bg_vertices, vec![9; 16]);
            assert_eq!(c.params, vec![8; 64]);
        }
        other => panic!("expected context, got {other:?}"),
    }
}

#[test]
fn unknown_command_is_an_error() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&99u32.to_le_bytes());
    bytes.extend_from_slice(&8u32.to_le_bytes());
    assert_eq!(parse_trace(&bytes), Err(TraceError::UnknownCommand(99)));
}

#[test]
fn truncated_record_is_an_error() {
    let mut w = TraceWriter::new();
    w.write_texture(Tsp(1), Tcw(2), &[], &[0; 32]);
    let bytes = w.finish();
    assert!(matches!(
        parse_trace(&bytes[..bytes.len() - 4]),
        Err(TraceError::BadSize { .. })
    ));
}

proptest! {
    /// A reader over writer output always reproduces the payload bytes.
    #[test]
    fn texture_payload_round_trips(
        tsp: u32,
        tcw: u32,
        palette in proptest::collection::vec(any::<u8>(), 0..64),
        texture in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let mut w = TraceWriter::new();
        w.write_texture(Tsp(tsp), Tcw(tcw), &palette, &texture);
        let cmds = parse_trace(&w.finish()).unwrap();
        prop_assert_eq!(cmds.len(), 1);
        match &cmds[0] {
            TraceCmd::Texture(t) => {
                prop_assert_eq!(t.tsp.0, tsp);
                prop_assert_eq!(t.tcw.0, tcw);
                prop_assert_eq!(&t.palette, &palette);
                prop_assert_eq!(&t.texture, &texture);
            }
            _ => prop_assert!(false),
        }
    }
}
