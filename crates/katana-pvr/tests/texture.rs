use pretty_assertions::assert_eq;

use katana_pvr::pixel::twiddled_index;
use katana_pvr::ta::texture_key;
use katana_pvr::{
    FilterMode, IspTsp, TextureBackend, TextureCache, TextureDesc, TextureHandle, TileContext,
    Tcw, Tsp, WrapMode, BG_VERTEX_SIZE,
};

#[derive(Default)]
struct RecordingBackend {
    created: Vec<(TextureDesc, Vec<u8>)>,
    destroyed: Vec<TextureHandle>,
}

impl TextureBackend for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> TextureHandle {
        self.created.push((*desc, rgba.to_vec()));
        self.created.len() as TextureHandle
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.destroyed.push(handle);
    }
}

fn tile_ctx<'a>(vram: &'a [u8], palette: &'a [u8], bg: &'a [u8]) -> TileContext<'a> {
    TileContext {
        autosort: false,
        stride: 0,
        pal_pxl_format: 0,
        video_width: 640,
        video_height: 480,
        bg_isp: IspTsp(0),
        bg_tsp: Tsp(0),
        bg_tcw: Tcw(0),
        bg_depth: 0.0,
        bg_vertices: bg,
        pt_alpha_ref: 0,
        params: &[],
        vram,
        palette,
    }
}

// tsp for an 8x8 texture, bilinear
fn tsp_8x8() -> Tsp {
    Tsp(1 << 13)
}

// twiddled ARGB1555
fn tcw_1555() -> Tcw {
    Tcw(0)
}

#[test]
fn twiddled_1555_decodes_to_rgba() {
    let mut vram = vec![0u8; 0x1000];
    // opaque white at (0, 0), opaque red at (1, 0)
    let white: u16 = 0xffff;
    let red: u16 = 0x8000 | (0x1f << 10);
    let i0 = twiddled_index(0, 0, 8, 8) * 2;
    let i1 = twiddled_index(1, 0, 8, 8) * 2;
    vram[i0..i0 + 2].copy_from_slice(&white.to_le_bytes());
    vram[i1..i1 + 2].copy_from_slice(&red.to_le_bytes());

    let palette = [0u8; 0x1000];
    let bg = [0u8; BG_VERTEX_SIZE];
    let ctx = tile_ctx(&vram, &palette, &bg);

    let mut cache = TextureCache::new();
    let mut backend = RecordingBackend::default();
    let handle = cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw_1555());

    assert_eq!(handle, 1);
    let (desc, rgba) = &backend.created[0];
    assert_eq!((desc.width, desc.height), (8, 8));
    assert_eq!(desc.filter, FilterMode::Bilinear);
    assert_eq!(desc.wrap_u, WrapMode::Repeat);

    assert_eq!(&rgba[0..4], &[0xff, 0xff, 0xff, 0xff]);
    assert_eq!(&rgba[4..8], &[0xff, 0x00, 0x00, 0xff]);
}

#[test]
fn entries_are_cached_until_invalidated() {
    let vram = vec![0u8; 0x1000];
    let palette = [0u8; 0x1000];
    let bg = [0u8; BG_VERTEX_SIZE];
    let ctx = tile_ctx(&vram, &palette, &bg);

    let mut cache = TextureCache::new();
    let mut backend = RecordingBackend::default();

    let h1 = cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw_1555());
    let h2 = cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw_1555());
    assert_eq!(h1, h2);
    assert_eq!(backend.created.len(), 1);

    // a guest write flips dirty; the old handle is destroyed and a new
    // texture decoded
    cache.invalidate(texture_key(tsp_8x8(), tcw_1555()), 2);
    let h3 = cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw_1555());
    assert_eq!(backend.created.len(), 2);
    assert_eq!(backend.destroyed, vec![h1]);
    assert_ne!(h3, h1);
}

#[test]
fn distinct_keys_get_distinct_entries() {
    let vram = vec![0u8; 0x1000];
    let palette = [0u8; 0x1000];
    let bg = [0u8; BG_VERTEX_SIZE];
    let ctx = tile_ctx(&vram, &palette, &bg);

    let mut cache = TextureCache::new();
    let mut backend = RecordingBackend::default();

    cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw_1555());
    // same backing address, different sampling state
    cache.demand_texture(&ctx, &mut backend, Tsp(tsp_8x8().0 | (1 << 16)), tcw_1555());
    assert_eq!(cache.len(), 2);
    assert_eq!(backend.created.len(), 2);
}

#[test]
fn clamp_and_flip_map_to_wrap_modes() {
    let vram = vec![0u8; 0x1000];
    let palette = [0u8; 0x1000];
    let bg = [0u8; BG_VERTEX_SIZE];
    let ctx = tile_ctx(&vram, &palette, &bg);

    let mut cache = TextureCache::new();
    let mut backend = RecordingBackend::default();

    // clamp_u + flip_v
    let tsp = Tsp((1 << 16) | (1 << 17));
    cache.demand_texture(&ctx, &mut backend, tsp, tcw_1555());

    let (desc, _) = &backend.created[0];
    assert_eq!(desc.filter, FilterMode::Nearest);
    assert_eq!(desc.wrap_u, WrapMode::ClampToEdge);
    assert_eq!(desc.wrap_v, WrapMode::MirroredRepeat);
}

#[test]
fn pal8_uses_the_palette_format() {
    let mut vram = vec![0u8; 0x1000];
    let mut palette = vec![0u8; 0x1000];

    // palette entry 3 = opaque blue in ARGB8888
    palette[12..16].copy_from_slice(&0xff00_00ffu32.to_le_bytes());
    vram[twiddled_index(0, 0, 8, 8)] = 3;

    let bg = [0u8; BG_VERTEX_SIZE];
    let mut ctx = tile_ctx(&vram, &palette, &bg);
    ctx.pal_pxl_format = 3; // TA_PAL_ARGB8888

    let mut cache = TextureCache::new();
    let mut backend = RecordingBackend::default();

    // 8bpp paletted tcw
    let tcw = Tcw(6 << 27);
    cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw);

    let (_, rgba) = &backend.created[0];
    assert_eq!(&rgba[0..4], &[0x00, 0x00, 0xff, 0xff]);
}

#[test]
fn vq_codebook_blocks_expand() {
    let mut vram = vec![0u8; 0x4000];
    // codebook entry 0: four texels of opaque green (RGB565)
    let green: u16 = 0x07e0;
    for t in 0..4 {
        vram[t * 2..t * 2 + 2].copy_from_slice(&green.to_le_bytes());
    }
    // index bytes all reference entry 0 (they follow the codebook)

    let palette = [0u8; 0x1000];
    let bg = [0u8; BG_VERTEX_SIZE];
    let ctx = tile_ctx(&vram, &palette, &bg);

    let mut cache = TextureCache::new();
    let mut backend = RecordingBackend::default();

    // vq compressed, RGB565
    let tcw = Tcw((1 << 30) | (1 << 27));
    cache.demand_texture(&ctx, &mut backend, tsp_8x8(), tcw);

    let (_, rgba) = &backend.created[0];
    for texel in rgba.chunks(4) {
        assert_eq!(texel, &[0x00, 0xff, 0x00, 0xff]);
    }
}
