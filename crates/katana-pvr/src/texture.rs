//! On-demand texture conversion and caching.
//!
//! Entries are keyed by the packed (TSP, TCW) pair. A VRAM/palette watch
//! (owned by the embedder) flips `dirty` when the guest writes the backing
//! bytes; the next demand re-decodes and re-creates the backend object.

use std::collections::HashMap;

use crate::pixel;
use crate::ta::{self, Tcw, Tsp};
use crate::tr::TileContext;

pub type TextureHandle = u64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FilterMode {
    Nearest,
    Bilinear,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Clone, Copy, Debug)]
pub struct TextureDesc {
    pub filter: FilterMode,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub mipmaps: bool,
    pub width: usize,
    pub height: usize,
}

/// The render backend's texture object factory. Creation happens on the
/// render thread's behalf; handles are opaque here.
pub trait TextureBackend {
    fn create_texture(&mut self, desc: &TextureDesc, rgba: &[u8]) -> TextureHandle;
    fn destroy_texture(&mut self, handle: TextureHandle);
}

#[derive(Clone, Debug, Default)]
pub struct TrTexture {
    pub handle: TextureHandle,
    pub dirty: bool,
    /// Frame number of the last guest write to the backing bytes.
    pub frame: u32,
    pub filter: Option<FilterMode>,
    pub wrap_u: Option<WrapMode>,
    pub wrap_v: Option<WrapMode>,
    pub mipmaps: bool,
    pub width: usize,
    pub height: usize,
}

/// Per-format byte offsets of the highest-resolution mip level, indexed by
/// `texture_u_size`. The level data for 1x1 up to the full size precedes it;
/// VQ offsets only cover the index bytes since the codebook is shared
/// across levels.
static COMPRESSED_MIPMAP_OFFSETS: [usize; 8] = [
    0x00006, 0x00016, 0x00056, 0x00156, 0x00556, 0x01556, 0x05556, 0x15556,
];

static PALETTED_4BPP_MIPMAP_OFFSETS: [usize; 8] = [
    0x0000c, 0x0002c, 0x000ac, 0x002ac, 0x00aac, 0x02aac, 0x0aaac, 0x2aaac,
];

static PALETTED_8BPP_MIPMAP_OFFSETS: [usize; 8] = [
    0x00018, 0x00058, 0x00158, 0x00558, 0x01558, 0x05558, 0x15558, 0x55558,
];

static NONPALETTED_MIPMAP_OFFSETS: [usize; 8] = [
    0x00030, 0x000b0, 0x002b0, 0x00ab0, 0x02ab0, 0x0aab0, 0x2aab0, 0xaaab0,
];

const SCRATCH_TEXELS: usize = 1024 * 1024;

pub struct TextureCache {
    entries: HashMap<u64, TrTexture>,
    converted: Box<[u32]>,
}

impl Default for TextureCache {
    fn default() -> Self {
        TextureCache {
            entries: HashMap::new(),
            converted: vec![0u32; SCRATCH_TEXELS].into_boxed_slice(),
        }
    }
}

impl TextureCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, tsp: Tsp, tcw: Tcw) -> Option<&TrTexture> {
        self.entries.get(&ta::texture_key(tsp, tcw))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Called by the VRAM / palette watch when the guest writes the backing
    /// bytes of a cached texture.
    pub fn invalidate(&mut self, key: u64, frame: u32) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.dirty = true;
            entry.frame = frame;
        }
    }

    pub fn clear(&mut self, backend: &mut dyn TextureBackend) {
        for entry in self.entries.values_mut() {
            if entry.handle != 0 {
                backend.destroy_texture(entry.handle);
            }
        }
        self.entries.clear();
    }

    /// Return a live backend handle for (tsp, tcw), decoding the texture
    /// from VRAM if the entry is missing, dirty, or was never created.
    pub fn demand_texture(
        &mut self,
        ctx: &TileContext,
        backend: &mut dyn TextureBackend,
        tsp: Tsp,
        tcw: Tcw,
    ) -> TextureHandle {
        let key = ta::texture_key(tsp, tcw);
        let entry = self.entries.entry(key).or_default();

        if entry.handle != 0 && !entry.dirty {
            return entry.handle;
        }

        if entry.handle != 0 && entry.dirty {
            backend.destroy_texture(entry.handle);
            entry.handle = 0;
        }

        let twiddled = ta::texture_twiddled(tcw);
        let compressed = ta::texture_compressed(tcw);
        let mipmaps = ta::texture_mipmaps(tcw);

        let width = ta::texture_width(tsp);
        let height = ta::texture_height(tsp, tcw);
        assert!(
            width <= 1024 && height <= 1024,
            "texture {}x{} exceeds the scratch buffer",
            width,
            height
        );
        let stride = if !twiddled && tcw.stride_select() {
            ctx.stride
        } else {
            width
        };

        let texture = &ctx.vram[tcw.texture_addr()..];
        let palette = ctx.palette;

        // mipmapped textures hold every level from 1x1 up; skip to the
        // highest resolution and let the backend generate its own chain
        let mut input = texture;
        if mipmaps {
            let u = tsp.texture_u_size() as usize;
            let offset = if compressed {
                COMPRESSED_MIPMAP_OFFSETS[u]
            } else if tcw.pixel_format() == ta::TA_PIXEL_4BPP {
                PALETTED_4BPP_MIPMAP_OFFSETS[u]
            } else if tcw.pixel_format() == ta::TA_PIXEL_8BPP {
                PALETTED_8BPP_MIPMAP_OFFSETS[u]
            } else {
                NONPALETTED_MIPMAP_OFFSETS[u]
            };
            input = &input[offset..];
        }

        let codebook = texture;
        let index = if compressed {
            &input[ta::TA_CODEBOOK_SIZE..]
        } else {
            &[][..]
        };

        let out = &mut self.converted[..width * height];
        match tcw.pixel_format() {
            ta::TA_PIXEL_1555 | ta::TA_PIXEL_RESERVED => {
                if compressed {
                    pixel::convert_vq_16(pixel::argb1555_to_rgba, codebook, index, out, width, height);
                } else if twiddled {
                    pixel::convert_twiddled_16(pixel::argb1555_to_rgba, input, out, width, height);
                } else {
                    pixel::convert_planar_16(pixel::argb1555_to_rgba, input, out, width, height, stride);
                }
            }

            ta::TA_PIXEL_565 => {
                if compressed {
                    pixel::convert_vq_16(pixel::rgb565_to_rgba, codebook, index, out, width, height);
                } else if twiddled {
                    pixel::convert_twiddled_16(pixel::rgb565_to_rgba, input, out, width, height);
                } else {
                    pixel::convert_planar_16(pixel::rgb565_to_rgba, input, out, width, height, stride);
                }
            }

            ta::TA_PIXEL_4444 => {
                if compressed {
                    pixel::convert_vq_16(pixel::argb4444_to_rgba, codebook, index, out, width, height);
                } else if twiddled {
                    pixel::convert_twiddled_16(pixel::argb4444_to_rgba, input, out, width, height);
                } else {
                    pixel::convert_planar_16(pixel::argb4444_to_rgba, input, out, width, height, stride);
                }
            }

            ta::TA_PIXEL_YUV422 => {
                assert!(!compressed, "VQ YUV textures unsupported");
                if twiddled {
                    pixel::convert_twiddled_uyvy422(input, out, width, height);
                } else {
                    pixel::convert_planar_uyvy422(input, out, width, height, stride);
                }
            }

            ta::TA_PIXEL_4BPP => {
                assert!(!compressed);
                let convert = palette_convert(ctx.pal_pxl_format);
                pixel::convert_pal4(convert, input, palette, out, width, height);
            }

            ta::TA_PIXEL_8BPP => {
                assert!(!compressed);
                let convert = palette_convert(ctx.pal_pxl_format);
                pixel::convert_pal8(convert, input, palette, out, width, height);
            }

            format => panic!("unsupported tcw pixel format {}", format),
        }

        // trilinear filtering is ignored
        let filter = if tsp.filter_mode() == 0 {
            FilterMode::Nearest
        } else {
            FilterMode::Bilinear
        };
        let wrap_u = wrap_mode(tsp.clamp_u(), tsp.flip_u());
        let wrap_v = wrap_mode(tsp.clamp_v(), tsp.flip_v());

        let desc = TextureDesc {
            filter,
            wrap_u,
            wrap_v,
            mipmaps,
            width,
            height,
        };
        let rgba = bytemuck::cast_slice(&self.converted[..width * height]);
        let handle = backend.create_texture(&desc, rgba);

        tracing::debug!(key = format_args!("{key:#018x}"), width, height, "texture converted");

        let entry = self.entries.get_mut(&key).unwrap();
        entry.handle = handle;
        entry.filter = Some(filter);
        entry.wrap_u = Some(wrap_u);
        entry.wrap_v = Some(wrap_v);
        entry.mipmaps = mipmaps;
        entry.width = width;
        entry.height = height;
        entry.dirty = false;

        handle
    }
}

fn wrap_mode(clamp: bool, flip: bool) -> WrapMode {
    if clamp {
        WrapMode::ClampToEdge
    } else if flip {
        WrapMode::MirroredRepeat
    } else {
        WrapMode::Repeat
    }
}

fn palette_convert(pal_pxl_format: u32) -> fn(u32) -> u32 {
    match pal_pxl_format {
        ta::TA_PAL_ARGB1555 => |v| pixel::argb1555_to_rgba(v as u16),
        ta::TA_PAL_RGB565 => |v| pixel::rgb565_to_rgba(v as u16),
        ta::TA_PAL_ARGB4444 => |v| pixel::argb4444_to_rgba(v as u16),
        ta::TA_PAL_ARGB8888 => pixel::argb8888_to_rgba,
        format => panic!("unsupported palette pixel format {}", format),
    }
}
