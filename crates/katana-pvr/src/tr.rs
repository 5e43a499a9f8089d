//! Display-list to render-context translation.
//!
//! Walks the raw parameter stream the TA assembled, producing neutral
//! surfaces, vertices and a triangle index list, plus per-list draw order.
//! Triangle strips are converted to independent triangles at reserve time
//! (two extra over-emitted triangles are trimmed when the surface commits),
//! and a committed surface whose GPU state matches the previous one is
//! merged into it so each strip does not become its own draw call.

use crate::ta::{
    self, IspTsp, Pcw, Tcw, Tsp, TA_LIST_NONE, TA_LIST_PUNCH_THROUGH, TA_LIST_TRANSLUCENT,
    TA_LIST_TRANSLUCENT_MODVOL, TA_NUM_LISTS, TA_PARAM_END_OF_LIST, TA_PARAM_OBJ_LIST_SET,
    TA_PARAM_POLY_OR_VOL, TA_PARAM_SPRITE, TA_PARAM_USER_TILE_CLIP, TA_PARAM_VERTEX, TA_VERT_NONE,
};
use crate::texture::{TextureBackend, TextureCache, TextureHandle};

/// Worst-case background vertex payload, see the ISP_BACKGND_T skip field.
pub const BG_VERTEX_SIZE: usize = (0b111 * 2 + 3) * 4 * 3;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum DepthFunc {
    Never,
    Greater,
    Equal,
    Gequal,
    Less,
    Nequal,
    #[default]
    Lequal,
    Always,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CullFace {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BlendFunc {
    #[default]
    None,
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ShadeMode {
    #[default]
    Decal,
    Modulate,
    DecalAlpha,
    ModulateAlpha,
}

fn translate_depth_func(depth_func: u32) -> DepthFunc {
    [
        DepthFunc::Never,
        DepthFunc::Greater,
        DepthFunc::Equal,
        DepthFunc::Gequal,
        DepthFunc::Less,
        DepthFunc::Nequal,
        DepthFunc::Lequal,
        DepthFunc::Always,
    ][depth_func as usize]
}

fn translate_cull(cull_mode: u32) -> CullFace {
    [CullFace::None, CullFace::None, CullFace::Back, CullFace::Front][cull_mode as usize]
}

fn translate_src_blend_func(blend_func: u32) -> BlendFunc {
    [
        BlendFunc::Zero,
        BlendFunc::One,
        BlendFunc::DstColor,
        BlendFunc::OneMinusDstColor,
        BlendFunc::SrcAlpha,
        BlendFunc::OneMinusSrcAlpha,
        BlendFunc::DstAlpha,
        BlendFunc::OneMinusDstAlpha,
    ][blend_func as usize]
}

fn translate_dst_blend_func(blend_func: u32) -> BlendFunc {
    [
        BlendFunc::Zero,
        BlendFunc::One,
        BlendFunc::SrcColor,
        BlendFunc::OneMinusSrcColor,
        BlendFunc::SrcAlpha,
        BlendFunc::OneMinusSrcAlpha,
        BlendFunc::DstAlpha,
        BlendFunc::OneMinusDstAlpha,
    ][blend_func as usize]
}

fn translate_shade_mode(shade_mode: u32) -> ShadeMode {
    [
        ShadeMode::Decal,
        ShadeMode::Modulate,
        ShadeMode::DecalAlpha,
        ShadeMode::ModulateAlpha,
    ][shade_mode as usize]
}

fn abgr_to_rgba(v: u32) -> u32 {
    (v & 0xff00_0000) | ((v & 0xff) << 16) | (v & 0xff00) | ((v & 0xff_0000) >> 16)
}

fn float_to_u8(x: f32) -> u32 {
    ((x * 255.0) as u32).min(255)
}

fn float_to_rgba(r: f32, g: f32, b: f32, a: f32) -> u32 {
    (float_to_u8(a) << 24) | (float_to_u8(b) << 16) | (float_to_u8(g) << 8) | float_to_u8(r)
}

/// Renderer-agnostic per-surface state.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Surface {
    pub texture: TextureHandle,
    pub depth_write: bool,
    pub depth_func: DepthFunc,
    pub cull: CullFace,
    pub src_blend: BlendFunc,
    pub dst_blend: BlendFunc,
    pub shade: ShadeMode,
    pub ignore_alpha: bool,
    pub ignore_texture_alpha: bool,
    pub offset_color: bool,
    pub pt_alpha_test: bool,
    pub pt_alpha_ref: f32,
    /// Index of this surface's first entry in the index list.
    pub first_vert: usize,
    /// Number of index entries, always a multiple of 3.
    pub num_verts: usize,
}

impl Surface {
    fn same_state(&self, other: &Surface) -> bool {
        self.texture == other.texture
            && self.depth_write == other.depth_write
            && self.depth_func == other.depth_func
            && self.cull == other.cull
            && self.src_blend == other.src_blend
            && self.dst_blend == other.dst_blend
            && self.shade == other.shade
            && self.ignore_alpha == other.ignore_alpha
            && self.ignore_texture_alpha == other.ignore_texture_alpha
            && self.offset_color == other.offset_color
            && self.pt_alpha_test == other.pt_alpha_test
            && self.pt_alpha_ref == other.pt_alpha_ref
    }
}

/// z is 1/w straight from the guest; smaller values are further away.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Vertex {
    pub xyz: [f32; 3],
    pub uv: [f32; 2],
    pub color: u32,
    pub offset_color: u32,
}

/// Parse-state snapshot per source parameter, for the tracer's debug view.
#[derive(Clone, Copy, Debug)]
pub struct TrParam {
    /// Byte offset of the parameter in the source buffer.
    pub offset: usize,
    pub list_type: usize,
    pub vertex_type: usize,
    pub last_surf: Option<usize>,
    pub last_vert: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct TrList {
    /// Surface indices in draw order.
    pub surfs: Vec<usize>,
}

/// One frame's translated output, owned by the renderer until the next
/// frame's conversion begins.
#[derive(Clone, Debug, Default)]
pub struct TrContext {
    pub width: u32,
    pub height: u32,
    pub surfs: Vec<Surface>,
    pub verts: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub lists: [TrList; TA_NUM_LISTS],
    pub params: Vec<TrParam>,
}

/// Input to a conversion: the assembled parameter stream plus the register
/// state captured when the guest started the render.
pub struct TileContext<'a> {
    pub autosort: bool,
    pub stride: usize,
    pub pal_pxl_format: u32,
    pub video_width: u32,
    pub video_height: u32,
    pub bg_isp: IspTsp,
    pub bg_tsp: Tsp,
    pub bg_tcw: Tcw,
    pub bg_depth: f32,
    pub bg_vertices: &'a [u8],
    pub pt_alpha_ref: u32,
    pub params: &'a [u8],
    pub vram: &'a [u8],
    pub palette: &'a [u8],
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn read_f32(data: &[u8], offset: usize) -> f32 {
    f32::from_bits(read_u32(data, offset))
}

fn set_at<T: Clone + Default>(v: &mut Vec<T>, idx: usize, val: T) {
    if idx == v.len() {
        v.push(val);
    } else {
        if idx >= v.len() {
            v.resize(idx + 1, T::default());
        }
        v[idx] = val;
    }
}

struct Tr<'a, 'c> {
    ctx: &'c TileContext<'a>,
    textures: &'c mut TextureCache,
    backend: &'c mut dyn TextureBackend,

    // current global state
    list_type: usize,
    vertex_type: usize,
    last_vertex: Option<Pcw>,
    face_color: [f32; 4],
    face_offset_color: [f32; 4],
    merged_surfs: usize,

    // committed counts; the surface/vert/index arrays may hold an
    // uncommitted tail beyond these
    num_surfs: usize,
    num_verts: usize,
    num_indices: usize,
}

impl Tr<'_, '_> {
    fn reserve_surf(&mut self, rc: &mut TrContext, copy_from_prev: bool) {
        let surf = if copy_from_prev {
            assert!(self.num_surfs > 0);
            let mut s = rc.surfs[self.num_surfs - 1];
            s.first_vert = self.num_indices;
            s.num_verts = 0;
            s
        } else {
            Surface {
                first_vert: self.num_indices,
                ..Surface::default()
            }
        };
        set_at(&mut rc.surfs, self.num_surfs, surf);
    }

    fn reserve_vert<'a>(&mut self, rc: &'a mut TrContext) -> &'a mut Vertex {
        let curr_surf_vert = rc.surfs[self.num_surfs].num_verts / 3;
        let vert_index = self.num_verts + curr_surf_vert;
        let index = self.num_indices + rc.surfs[self.num_surfs].num_verts;

        assert!(vert_index <= u16::MAX as usize, "vertex capacity exceeded");

        // strips come in CW; emit independent triangles, flipping the
        // winding of even strip positions so everything ends up CCW
        let tri: [u16; 3] = if curr_surf_vert & 1 != 0 {
            [
                vert_index as u16,
                (vert_index + 1) as u16,
                (vert_index + 2) as u16,
            ]
        } else {
            [
                vert_index as u16,
                (vert_index + 2) as u16,
                (vert_index + 1) as u16,
            ]
        };
        for (k, idx) in tri.into_iter().enumerate() {
            set_at(&mut rc.indices, index + k, idx);
        }

        rc.surfs[self.num_surfs].num_verts += 3;

        set_at(&mut rc.verts, vert_index, Vertex::default());
        &mut rc.verts[vert_index]
    }

    fn commit_surf(&mut self, rc: &mut TrContext) {
        // reserve_vert preemptively indexes the next two vertices while
        // converting strips to triangles; the first two vertices of the
        // strip therefore added six indices that don't exist
        rc.surfs[self.num_surfs].num_verts -= 6;
        let new_surf = rc.surfs[self.num_surfs];

        let merged = self.num_surfs > 0 && rc.surfs[self.num_surfs - 1].same_state(&new_surf);
        if merged {
            rc.surfs[self.num_surfs - 1].num_verts += new_surf.num_verts;
            self.merged_surfs += 1;
        } else {
            rc.lists[self.list_type].surfs.push(self.num_surfs);
            self.num_surfs += 1;
        }

        self.num_verts += (new_surf.num_verts + 6) / 3;
        self.num_indices += new_surf.num_verts;
    }

    fn parse_color(&self, base_color: u32) -> u32 {
        abgr_to_rgba(base_color)
    }

    fn parse_color_rgba(&self, r: f32, g: f32, b: f32, a: f32) -> u32 {
        float_to_rgba(r, g, b, a)
    }

    fn parse_color_intensity(&self, intensity: f32) -> u32 {
        float_to_rgba(
            self.face_color[0] * intensity,
            self.face_color[1] * intensity,
            self.face_color[2] * intensity,
            self.face_color[3],
        )
    }

    fn parse_offset_color_intensity(&self, intensity: f32) -> u32 {
        float_to_rgba(
            self.face_offset_color[0] * intensity,
            self.face_offset_color[1] * intensity,
            self.face_offset_color[2] * intensity,
            self.face_offset_color[3],
        )
    }

    fn parse_bg_vert(&self, offset: usize, v: &mut Vertex) -> usize {
        let bg = self.ctx.bg_vertices;
        v.xyz = [
            read_f32(bg, offset),
            read_f32(bg, offset + 4),
            read_f32(bg, offset + 8),
        ];
        let mut offset = offset + 12;

        if self.ctx.bg_isp.texture() {
            panic!("textured background unsupported");
        }

        v.color = abgr_to_rgba(read_u32(bg, offset));
        offset += 4;

        if self.ctx.bg_isp.offset() {
            panic!("background offset color unsupported");
        }

        offset
    }

    /// Emit the background quad covering the raster target. The xyz values
    /// supplied through ISP_BACKGND_T are overridden; they are not reliable
    /// in practice.
    fn parse_bg(&mut self, rc: &mut TrContext) {
        self.list_type = ta::TA_LIST_OPAQUE;

        self.reserve_surf(rc, false);
        {
            let surf = &mut rc.surfs[self.num_surfs];
            surf.texture = 0;
            surf.depth_write = !self.ctx.bg_isp.z_write_disable();
            surf.depth_func = translate_depth_func(self.ctx.bg_isp.depth_compare_mode());
            surf.cull = translate_cull(self.ctx.bg_isp.culling_mode());
            surf.src_blend = BlendFunc::None;
            surf.dst_blend = BlendFunc::None;
        }

        let w = self.ctx.video_width as f32;
        let h = self.ctx.video_height as f32;
        let depth = self.ctx.bg_depth;

        let base = self.num_verts;
        for _ in 0..4 {
            self.reserve_vert(rc);
        }

        // translate the first 3 vertices from the register payload
        let mut offset = 0;
        for k in 0..3 {
            let mut parsed = Vertex::default();
            offset = self.parse_bg_vert(offset, &mut parsed);
            rc.verts[base + k] = parsed;
        }

        rc.verts[base].xyz = [0.0, h, depth];
        rc.verts[base + 1].xyz = [0.0, 0.0, depth];
        rc.verts[base + 2].xyz = [w, h, depth];

        // the 4th vertex isn't supplied, synthesize it from the others
        let v0 = rc.verts[base];
        let v1 = rc.verts[base + 1];
        let v2 = rc.verts[base + 2];
        let v3 = &mut rc.verts[base + 3];
        v3.xyz = [v2.xyz[0], v1.xyz[1], depth];
        v3.color = v0.color;
        v3.offset_color = v0.offset_color;
        v3.uv = [v2.uv[0], v1.uv[1]];

        self.commit_surf(rc);

        self.list_type = TA_LIST_NONE;
    }

    fn parse_poly_param(&mut self, rc: &mut TrContext, data: &[u8]) {
        let pcw = Pcw(read_u32(data, 0));
        let isp_tsp = IspTsp(read_u32(data, 4));
        let tsp = Tsp(read_u32(data, 8));
        let tcw = Tcw(read_u32(data, 12));

        // reset state
        self.last_vertex = None;
        self.vertex_type = ta::vert_type(pcw);

        let poly_type = ta::poly_type(pcw);

        if poly_type == 6 {
            // modifier volumes are accepted but not translated
            return;
        }

        match poly_type {
            0 => {}
            1 => {
                self.face_color = [
                    read_f32(data, 20),
                    read_f32(data, 24),
                    read_f32(data, 28),
                    read_f32(data, 16),
                ];
            }
            2 => {
                self.face_color = [
                    read_f32(data, 36),
                    read_f32(data, 40),
                    read_f32(data, 44),
                    read_f32(data, 32),
                ];
                self.face_offset_color = [
                    read_f32(data, 52),
                    read_f32(data, 56),
                    read_f32(data, 60),
                    read_f32(data, 48),
                ];
            }
            5 => {
                let base = read_u32(data, 16);
                let offset = read_u32(data, 20);
                self.face_color = [
                    ((base >> 16) & 0xff) as f32 / 255.0,
                    ((base >> 8) & 0xff) as f32 / 255.0,
                    (base & 0xff) as f32 / 255.0,
                    ((base >> 24) & 0xff) as f32 / 255.0,
                ];
                self.face_offset_color = [
                    ((offset >> 16) & 0xff) as f32 / 255.0,
                    ((offset >> 8) & 0xff) as f32 / 255.0,
                    (offset & 0xff) as f32 / 255.0,
                    ((offset >> 24) & 0xff) as f32 / 255.0,
                ];
            }
            ty => panic!("unsupported poly type {}", ty),
        }

        // set up the new surface
        self.reserve_surf(rc, false);
        let texture = if pcw.texture() {
            self.textures
                .demand_texture(self.ctx, self.backend, tsp, tcw)
        } else {
            0
        };

        let surf = &mut rc.surfs[self.num_surfs];
        surf.depth_write = !isp_tsp.z_write_disable();
        surf.depth_func = translate_depth_func(isp_tsp.depth_compare_mode());
        surf.cull = translate_cull(isp_tsp.culling_mode());
        surf.src_blend = translate_src_blend_func(tsp.src_alpha_instr());
        surf.dst_blend = translate_dst_blend_func(tsp.dst_alpha_instr());
        surf.shade = translate_shade_mode(tsp.texture_shading_instr());
        surf.ignore_alpha = !tsp.use_alpha();
        surf.ignore_texture_alpha = tsp.ignore_tex_alpha();
        surf.offset_color = isp_tsp.offset();
        surf.pt_alpha_test = self.list_type == TA_LIST_PUNCH_THROUGH;
        surf.pt_alpha_ref = self.ctx.pt_alpha_ref as f32 / 255.0;
        surf.texture = texture;

        // override a few parameters based on the list type
        if self.list_type != TA_LIST_TRANSLUCENT && self.list_type != TA_LIST_TRANSLUCENT_MODVOL {
            surf.src_blend = BlendFunc::None;
            surf.dst_blend = BlendFunc::None;
        } else if self.ctx.autosort {
            surf.depth_func = DepthFunc::Lequal;
        }
        if self.list_type == TA_LIST_PUNCH_THROUGH {
            surf.depth_func = DepthFunc::Gequal;
        }
    }

    fn parse_vert_param(&mut self, rc: &mut TrContext, data: &[u8]) {
        let pcw = Pcw(read_u32(data, 0));

        if self.vertex_type == 17 {
            // modifier volume geometry is skipped with its poly param
            return;
        }

        // a vertex parameter for the next polygon may follow directly after
        // an end-of-strip vertex without a new global parameter
        if self.last_vertex.map(|p| p.end_of_strip()).unwrap_or(false) {
            self.reserve_surf(rc, true);
        }
        self.last_vertex = Some(pcw);

        let xyz = [
            read_f32(data, 4),
            read_f32(data, 8),
            read_f32(data, 12),
        ];

        match self.vertex_type {
            0 => {
                let color = self.parse_color(read_u32(data, 24));
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
            }
            1 => {
                let color = self.parse_color_rgba(
                    read_f32(data, 20),
                    read_f32(data, 24),
                    read_f32(data, 28),
                    read_f32(data, 16),
                );
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
            }
            2 => {
                let color = self.parse_color_intensity(read_f32(data, 24));
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
            }
            3 => {
                let color = self.parse_color(read_u32(data, 24));
                let offset_color = abgr_to_rgba(read_u32(data, 28));
                let uv = [read_f32(data, 16), read_f32(data, 20)];
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
                vert.offset_color = offset_color;
                vert.uv = uv;
            }
            4 => {
                let color = self.parse_color(read_u32(data, 24));
                let offset_color = abgr_to_rgba(read_u32(data, 28));
                let uv = uv_from_16bit(read_u32(data, 16));
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
                vert.offset_color = offset_color;
                vert.uv = uv;
            }
            5 => {
                let color = self.parse_color_rgba(
                    read_f32(data, 36),
                    read_f32(data, 40),
                    read_f32(data, 44),
                    read_f32(data, 32),
                );
                let offset_color = float_to_rgba(
                    read_f32(data, 52),
                    read_f32(data, 56),
                    read_f32(data, 60),
                    read_f32(data, 48),
                );
                let uv = [read_f32(data, 16), read_f32(data, 20)];
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
                vert.offset_color = offset_color;
                vert.uv = uv;
            }
            6 => {
                let color = self.parse_color_rgba(
                    read_f32(data, 36),
                    read_f32(data, 40),
                    read_f32(data, 44),
                    read_f32(data, 32),
                );
                let offset_color = float_to_rgba(
                    read_f32(data, 52),
                    read_f32(data, 56),
                    read_f32(data, 60),
                    read_f32(data, 48),
                );
                let uv = uv_from_16bit(read_u32(data, 16));
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
                vert.offset_color = offset_color;
                vert.uv = uv;
            }
            7 => {
                let color = self.parse_color_intensity(read_f32(data, 24));
                let offset_color = self.parse_offset_color_intensity(read_f32(data, 28));
                let uv = [read_f32(data, 16), read_f32(data, 20)];
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
                vert.offset_color = offset_color;
                vert.uv = uv;
            }
            8 => {
                let color = self.parse_color_intensity(read_f32(data, 24));
                let offset_color = self.parse_offset_color_intensity(read_f32(data, 28));
                let uv = uv_from_16bit(read_u32(data, 16));
                let vert = self.reserve_vert(rc);
                vert.xyz = xyz;
                vert.color = color;
                vert.offset_color = offset_color;
                vert.uv = uv;
            }
            15 => {
                assert!(pcw.end_of_strip());
                // the guest's zigzag quad becomes a CCW strip pair
                for idx in [0usize, 1, 3, 2] {
                    let xyz = [
                        read_f32(data, 4 + idx * 12),
                        read_f32(data, 8 + idx * 12),
                        // z isn't specified for the 4th vertex
                        read_f32(data, 12),
                    ];
                    let color = self.parse_color_rgba(
                        self.face_color[0],
                        self.face_color[1],
                        self.face_color[2],
                        self.face_color[3],
                    );
                    let offset_color = float_to_rgba(
                        self.face_offset_color[0],
                        self.face_offset_color[1],
                        self.face_offset_color[2],
                        self.face_offset_color[3],
                    );
                    let vert = self.reserve_vert(rc);
                    vert.xyz = xyz;
                    vert.color = color;
                    vert.offset_color = offset_color;
                }
            }
            16 => {
                assert!(pcw.end_of_strip());
                for idx in [0usize, 1, 3, 2] {
                    let xyz = [
                        read_f32(data, 4 + idx * 12),
                        read_f32(data, 8 + idx * 12),
                        read_f32(data, 12),
                    ];
                    let color = self.parse_color_rgba(
                        self.face_color[0],
                        self.face_color[1],
                        self.face_color[2],
                        self.face_color[3],
                    );
                    let offset_color = float_to_rgba(
                        self.face_offset_color[0],
                        self.face_offset_color[1],
                        self.face_offset_color[2],
                        self.face_offset_color[3],
                    );
                    // three packed uv words cover the quad; the 4th vertex
                    // recombines u of the first and v of the third
                    let (u, v) = if idx == 3 {
                        (
                            read_u32(data, 52) & 0xffff_0000,
                            (read_u32(data, 60) & 0xffff) << 16,
                        )
                    } else {
                        let word = read_u32(data, 52 + idx * 4);
                        (word & 0xffff_0000, (word & 0xffff) << 16)
                    };
                    let vert = self.reserve_vert(rc);
                    vert.xyz = xyz;
                    vert.color = color;
                    vert.offset_color = offset_color;
                    vert.uv = [f32::from_bits(u), f32::from_bits(v)];
                }
            }
            ty => panic!("unsupported vertex type {}", ty),
        }

        if pcw.end_of_strip() {
            self.commit_surf(rc);
        }
    }

    fn parse_eol(&mut self) {
        self.last_vertex = None;
        self.list_type = TA_LIST_NONE;
        self.vertex_type = TA_VERT_NONE;
    }

    /// Stable back-to-front order by each surface's minimum z.
    fn sort_render_list(&mut self, rc: &mut TrContext, list_type: usize) {
        let mut minz = vec![f32::MAX; rc.surfs.len()];
        for &surf_index in &rc.lists[list_type].surfs {
            let surf = &rc.surfs[surf_index];
            let mz = &mut minz[surf_index];
            for j in 0..surf.num_verts {
                let vert_index = rc.indices[surf.first_vert + j] as usize;
                *mz = mz.min(rc.verts[vert_index].xyz[2]);
            }
        }

        rc.lists[list_type].surfs.sort_by(|&i, &j| {
            minz[i]
                .partial_cmp(&minz[j])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

fn uv_from_16bit(word: u32) -> [f32; 2] {
    // the packed 16-bit u/v halves are the high 16 bits of a f32 pattern
    let u = word & 0xffff_0000;
    let v = (word & 0xffff) << 16;
    [f32::from_bits(u), f32::from_bits(v)]
}

/// Translate one guest frame's parameter stream into `rc`.
pub fn convert_context(
    ctx: &TileContext,
    textures: &mut TextureCache,
    backend: &mut dyn TextureBackend,
    rc: &mut TrContext,
) {
    let mut tr = Tr {
        ctx,
        textures,
        backend,
        list_type: TA_LIST_NONE,
        vertex_type: TA_VERT_NONE,
        last_vertex: None,
        face_color: [0.0; 4],
        face_offset_color: [0.0; 4],
        merged_surfs: 0,
        num_surfs: 0,
        num_verts: 0,
        num_indices: 0,
    };

    rc.width = ctx.video_width;
    rc.height = ctx.video_height;
    rc.surfs.clear();
    rc.verts.clear();
    rc.indices.clear();
    rc.params.clear();
    for list in &mut rc.lists {
        list.surfs.clear();
    }

    tr.parse_bg(rc);

    let mut data = 0usize;
    let end = ctx.params.len();
    while data < end {
        let pcw = Pcw(read_u32(ctx.params, data));

        if ta::list_type_valid(pcw, tr.list_type) {
            tr.list_type = pcw.list_type();
        }

        match pcw.para_type() {
            // control params
            TA_PARAM_END_OF_LIST => tr.parse_eol(),
            TA_PARAM_USER_TILE_CLIP => {}
            TA_PARAM_OBJ_LIST_SET => panic!("OBJ_LIST_SET unsupported"),

            // global params
            TA_PARAM_POLY_OR_VOL | TA_PARAM_SPRITE => {
                tr.parse_poly_param(rc, &ctx.params[data..]);
            }

            // vertex params
            TA_PARAM_VERTEX => tr.parse_vert_param(rc, &ctx.params[data..]),

            other => {
                tracing::warn!(para_type = other, "ignoring unknown parameter type");
            }
        }

        // track the parse state at each parameter offset for the tracer
        rc.params.push(TrParam {
            offset: data,
            list_type: tr.list_type,
            vertex_type: tr.vertex_type,
            last_surf: tr.num_surfs.checked_sub(1),
            last_vert: tr.num_verts.checked_sub(1),
        });

        data += ta::param_size(pcw, tr.vertex_type);
    }

    // sort blended surface lists if requested
    if ctx.autosort {
        tr.sort_render_list(rc, TA_LIST_TRANSLUCENT);
        tr.sort_render_list(rc, TA_LIST_PUNCH_THROUGH);
    }

    tracing::debug!(
        merged = tr.merged_surfs,
        surfs = tr.num_surfs,
        "convert_context"
    );

    // drop any uncommitted tail
    let (num_surfs, num_verts, num_indices) = (tr.num_surfs, tr.num_verts, tr.num_indices);
    rc.surfs.truncate(num_surfs);
    rc.verts.truncate(num_verts);
    rc.indices.truncate(num_indices);
}
