//! PowerVR2 tile-accelerator display-list translation.
//!
//! Consumes the parameter stream assembled by the TA plus a snapshot of the
//! relevant PVR registers and produces a renderer-agnostic draw list:
//! surfaces with per-surface state, vertices, a triangle index list and a
//! per-list draw order. Textures are decoded from VRAM on demand and cached
//! by their (TSP, TCW) key.

pub mod pixel;
pub mod ta;
pub mod texture;
pub mod tr;
pub mod trace;

pub use ta::{texture_key, IspTsp, Pcw, Tcw, Tsp};
pub use texture::{
    FilterMode, TextureBackend, TextureCache, TextureDesc, TextureHandle, TrTexture, WrapMode,
};
pub use tr::{
    convert_context, BlendFunc, CullFace, DepthFunc, ShadeMode, Surface, TileContext, TrContext,
    TrList, TrParam, Vertex, BG_VERTEX_SIZE,
};
pub use trace::{parse_trace, ContextCmd, ContextRegs, TextureCmd, TraceCmd, TraceWriter};
