//! Tile-accelerator parameter words and stream layout rules.
//!
//! Every display-list parameter opens with a 32-bit parameter control word.
//! The PCW, together with the latched vertex type, determines how many bytes
//! the parameter occupies (32 or 64) and how its payload is laid out.

// para_type values
pub const TA_PARAM_END_OF_LIST: u32 = 0;
pub const TA_PARAM_USER_TILE_CLIP: u32 = 1;
pub const TA_PARAM_OBJ_LIST_SET: u32 = 2;
pub const TA_PARAM_POLY_OR_VOL: u32 = 4;
pub const TA_PARAM_SPRITE: u32 = 5;
pub const TA_PARAM_VERTEX: u32 = 7;

// list_type values
pub const TA_LIST_OPAQUE: usize = 0;
pub const TA_LIST_OPAQUE_MODVOL: usize = 1;
pub const TA_LIST_TRANSLUCENT: usize = 2;
pub const TA_LIST_TRANSLUCENT_MODVOL: usize = 3;
pub const TA_LIST_PUNCH_THROUGH: usize = 4;
pub const TA_NUM_LISTS: usize = 5;

/// Sentinel for "no list latched".
pub const TA_LIST_NONE: usize = TA_NUM_LISTS;

pub const TA_NUM_VERT_TYPES: usize = 18;
pub const TA_VERT_NONE: usize = TA_NUM_VERT_TYPES;

// tcw pixel formats
pub const TA_PIXEL_1555: u32 = 0;
pub const TA_PIXEL_565: u32 = 1;
pub const TA_PIXEL_4444: u32 = 2;
pub const TA_PIXEL_YUV422: u32 = 3;
pub const TA_PIXEL_BUMPMAP: u32 = 4;
pub const TA_PIXEL_4BPP: u32 = 5;
pub const TA_PIXEL_8BPP: u32 = 6;
pub const TA_PIXEL_RESERVED: u32 = 7;

// palette ram formats
pub const TA_PAL_ARGB1555: u32 = 0;
pub const TA_PAL_RGB565: u32 = 1;
pub const TA_PAL_ARGB4444: u32 = 2;
pub const TA_PAL_ARGB8888: u32 = 3;

/// VQ codebook: 256 entries of 8 bytes, shared across mip levels.
pub const TA_CODEBOOK_SIZE: usize = 256 * 8;

fn bits(v: u32, lo: u32, len: u32) -> u32 {
    (v >> lo) & ((1 << len) - 1)
}

/// Parameter control word.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Pcw(pub u32);

impl Pcw {
    pub fn para_type(self) -> u32 {
        bits(self.0, 29, 3)
    }

    pub fn end_of_strip(self) -> bool {
        bits(self.0, 28, 1) != 0
    }

    pub fn list_type(self) -> usize {
        bits(self.0, 24, 3) as usize
    }

    pub fn group_en(self) -> bool {
        bits(self.0, 23, 1) != 0
    }

    pub fn strip_len(self) -> u32 {
        bits(self.0, 18, 2)
    }

    pub fn user_clip(self) -> u32 {
        bits(self.0, 16, 2)
    }

    pub fn shadow(self) -> bool {
        bits(self.0, 7, 1) != 0
    }

    pub fn volume(self) -> bool {
        bits(self.0, 6, 1) != 0
    }

    pub fn col_type(self) -> u32 {
        bits(self.0, 4, 2)
    }

    pub fn texture(self) -> bool {
        bits(self.0, 3, 1) != 0
    }

    pub fn offset(self) -> bool {
        bits(self.0, 2, 1) != 0
    }

    pub fn gouraud(self) -> bool {
        bits(self.0, 1, 1) != 0
    }

    pub fn uv_16bit(self) -> bool {
        bits(self.0, 0, 1) != 0
    }
}

/// Per-polygon depth / cull / shade state.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct IspTsp(pub u32);

impl IspTsp {
    pub fn depth_compare_mode(self) -> u32 {
        bits(self.0, 29, 3)
    }

    pub fn culling_mode(self) -> u32 {
        bits(self.0, 27, 2)
    }

    pub fn z_write_disable(self) -> bool {
        bits(self.0, 26, 1) != 0
    }

    pub fn texture(self) -> bool {
        bits(self.0, 25, 1) != 0
    }

    pub fn offset(self) -> bool {
        bits(self.0, 24, 1) != 0
    }

    pub fn gouraud_shading(self) -> bool {
        bits(self.0, 23, 1) != 0
    }

    pub fn uv_16bit(self) -> bool {
        bits(self.0, 22, 1) != 0
    }
}

/// Texture and shading processor word.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Tsp(pub u32);

impl Tsp {
    pub fn src_alpha_instr(self) -> u32 {
        bits(self.0, 29, 3)
    }

    pub fn dst_alpha_instr(self) -> u32 {
        bits(self.0, 26, 3)
    }

    pub fn fog_control(self) -> u32 {
        bits(self.0, 22, 2)
    }

    pub fn color_clamp(self) -> bool {
        bits(self.0, 21, 1) != 0
    }

    pub fn use_alpha(self) -> bool {
        bits(self.0, 20, 1) != 0
    }

    pub fn ignore_tex_alpha(self) -> bool {
        bits(self.0, 19, 1) != 0
    }

    pub fn flip_u(self) -> bool {
        bits(self.0, 18, 1) != 0
    }

    pub fn flip_v(self) -> bool {
        bits(self.0, 17, 1) != 0
    }

    pub fn clamp_u(self) -> bool {
        bits(self.0, 16, 1) != 0
    }

    pub fn clamp_v(self) -> bool {
        bits(self.0, 15, 1) != 0
    }

    pub fn filter_mode(self) -> u32 {
        bits(self.0, 13, 2)
    }

    pub fn texture_shading_instr(self) -> u32 {
        bits(self.0, 6, 2)
    }

    pub fn texture_u_size(self) -> u32 {
        bits(self.0, 3, 3)
    }

    pub fn texture_v_size(self) -> u32 {
        bits(self.0, 0, 3)
    }
}

/// Texture control word.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Tcw(pub u32);

impl Tcw {
    pub fn mip_mapped(self) -> bool {
        bits(self.0, 31, 1) != 0
    }

    pub fn vq_compressed(self) -> bool {
        bits(self.0, 30, 1) != 0
    }

    pub fn pixel_format(self) -> u32 {
        bits(self.0, 27, 3)
    }

    pub fn scan_order(self) -> u32 {
        bits(self.0, 26, 1)
    }

    pub fn stride_select(self) -> bool {
        bits(self.0, 25, 1) != 0
    }

    pub fn palette_selector(self) -> u32 {
        bits(self.0, 21, 6)
    }

    /// Byte address of the texel data in VRAM (stored in 8-byte units).
    pub fn texture_addr(self) -> usize {
        (bits(self.0, 0, 21) as usize) << 3
    }
}

/// 64-bit texture cache key.
pub fn texture_key(tsp: Tsp, tcw: Tcw) -> u64 {
    ((tsp.0 as u64) << 32) | tcw.0 as u64
}

pub fn texture_twiddled(tcw: Tcw) -> bool {
    tcw.scan_order() == 0
}

pub fn texture_compressed(tcw: Tcw) -> bool {
    tcw.vq_compressed()
}

pub fn texture_mipmaps(tcw: Tcw) -> bool {
    tcw.scan_order() == 0 && tcw.mip_mapped()
}

pub fn texture_width(tsp: Tsp) -> usize {
    8 << tsp.texture_u_size()
}

pub fn texture_height(tsp: Tsp, tcw: Tcw) -> usize {
    if texture_mipmaps(tcw) {
        // mipmapped textures are square
        texture_width(tsp)
    } else {
        8 << tsp.texture_v_size()
    }
}

/// Polygon parameter layout id (0..=6) for a global parameter PCW.
pub fn poly_type(pcw: Pcw) -> usize {
    if pcw.list_type() == TA_LIST_OPAQUE_MODVOL || pcw.list_type() == TA_LIST_TRANSLUCENT_MODVOL {
        return 6;
    }
    if pcw.para_type() == TA_PARAM_SPRITE {
        return 5;
    }
    if pcw.volume() {
        return match pcw.col_type() {
            0 | 3 => 3,
            2 => 4,
            _ => 3,
        };
    }
    match pcw.col_type() {
        2 if pcw.texture() && pcw.offset() => 2,
        2 if pcw.texture() => 1,
        2 => 1,
        _ => 0,
    }
}

/// Vertex parameter layout id (0..=17) for a global parameter PCW.
pub fn vert_type(pcw: Pcw) -> usize {
    if pcw.list_type() == TA_LIST_OPAQUE_MODVOL || pcw.list_type() == TA_LIST_TRANSLUCENT_MODVOL {
        return 17;
    }
    if pcw.para_type() == TA_PARAM_SPRITE {
        return if pcw.texture() { 16 } else { 15 };
    }
    if pcw.volume() {
        return if pcw.texture() {
            match pcw.col_type() {
                0 => {
                    if pcw.uv_16bit() {
                        12
                    } else {
                        11
                    }
                }
                _ => {
                    if pcw.uv_16bit() {
                        14
                    } else {
                        13
                    }
                }
            }
        } else {
            match pcw.col_type() {
                0 => 9,
                _ => 10,
            }
        };
    }
    if pcw.texture() {
        match pcw.col_type() {
            0 => {
                if pcw.uv_16bit() {
                    4
                } else {
                    3
                }
            }
            1 => {
                if pcw.uv_16bit() {
                    6
                } else {
                    5
                }
            }
            _ => {
                if pcw.uv_16bit() {
                    8
                } else {
                    7
                }
            }
        }
    } else {
        match pcw.col_type() {
            0 => 0,
            1 => 1,
            _ => 2,
        }
    }
}

/// Size in bytes of the parameter beginning with `pcw`, given the vertex
/// type latched by the most recent global parameter.
pub fn param_size(pcw: Pcw, vertex_type: usize) -> usize {
    match pcw.para_type() {
        TA_PARAM_VERTEX => match vertex_type {
            5 | 6 | 11 | 12 | 13 | 14 | 15 | 16 | 17 => 64,
            _ => 32,
        },
        TA_PARAM_POLY_OR_VOL | TA_PARAM_SPRITE => match poly_type(pcw) {
            2 | 4 => 64,
            _ => 32,
        },
        _ => 32,
    }
}

/// A list type latches when no list is open; once open it persists until
/// END_OF_LIST.
pub fn list_type_valid(pcw: Pcw, current: usize) -> bool {
    current == TA_LIST_NONE && pcw.para_type() != TA_PARAM_END_OF_LIST
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcw(para_type: u32, bits: u32) -> Pcw {
        Pcw((para_type << 29) | bits)
    }

    #[test]
    fn texture_key_orders_tsp_above_tcw() {
        let a = texture_key(Tsp(1), Tcw(2));
        let b = texture_key(Tsp(2), Tcw(1));
        assert_eq!(a, 0x0000_0001_0000_0002);
        assert_eq!(b, 0x0000_0002_0000_0001);
        assert_ne!(a, b);
    }

    #[test]
    fn packed_color_vertex_types() {
        // untextured packed color
        assert_eq!(vert_type(pcw(TA_PARAM_POLY_OR_VOL, 0)), 0);
        // textured, packed color, 32-bit uv
        assert_eq!(vert_type(pcw(TA_PARAM_POLY_OR_VOL, 1 << 3)), 3);
        // textured, packed color, 16-bit uv
        assert_eq!(vert_type(pcw(TA_PARAM_POLY_OR_VOL, (1 << 3) | 1)), 4);
        // sprites
        assert_eq!(vert_type(pcw(TA_PARAM_SPRITE, 0)), 15);
        assert_eq!(vert_type(pcw(TA_PARAM_SPRITE, 1 << 3)), 16);
    }

    #[test]
    fn poly_sizes() {
        // intensity with offset color carries two float quads
        let intensity = pcw(TA_PARAM_POLY_OR_VOL, (2 << 4) | (1 << 3) | (1 << 2));
        assert_eq!(poly_type(intensity), 2);
        assert_eq!(param_size(intensity, TA_VERT_NONE), 64);

        let packed = pcw(TA_PARAM_POLY_OR_VOL, 0);
        assert_eq!(poly_type(packed), 0);
        assert_eq!(param_size(packed, TA_VERT_NONE), 32);
    }

    #[test]
    fn vertex_sizes_follow_latched_type() {
        let v = pcw(TA_PARAM_VERTEX, 0);
        assert_eq!(param_size(v, 3), 32);
        assert_eq!(param_size(v, 5), 64);
        assert_eq!(param_size(v, 15), 64);
    }

    #[test]
    fn mipmapped_textures_are_square() {
        let tsp = Tsp((5 << 3) | 2); // u size 256, v size 32
        assert_eq!(texture_width(tsp), 256);
        assert_eq!(texture_height(tsp, Tcw(1 << 31)), 256);
        assert_eq!(texture_height(tsp, Tcw(0)), 32);
    }
}
