//! Render trace serialization.
//!
//! A trace is a flat sequence of `{type, size}` command records; `size`
//! covers the whole record including the 8-byte header, so a reader can skip
//! unknown commands. Two commands exist: TEXTURE snapshots the palette and
//! texel bytes a conversion consumed, CONTEXT snapshots the register state,
//! background vertices and raw parameter stream of one frame. The layout is
//! stable so traces recorded by older builds keep replaying.

use thiserror::Error;

use crate::ta::{IspTsp, Tcw, Tsp};

pub const TRACE_CMD_TEXTURE: u32 = 1;
pub const TRACE_CMD_CONTEXT: u32 = 2;

const HEADER_SIZE: usize = 8;

#[derive(Debug, Error, PartialEq)]
pub enum TraceError {
    #[error("trace truncated at offset {0}")]
    Truncated(usize),
    #[error("unknown trace command type {0}")]
    UnknownCommand(u32),
    #[error("trace command at offset {offset} has bad size {size}")]
    BadSize { offset: usize, size: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextureCmd {
    pub tsp: Tsp,
    pub tcw: Tcw,
    pub palette: Vec<u8>,
    pub texture: Vec<u8>,
}

/// PVR register snapshot captured with a context.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ContextRegs {
    pub autosort: bool,
    pub stride: u32,
    pub pal_pxl_format: u32,
    pub video_width: u32,
    pub video_height: u32,
    pub bg_isp: IspTsp,
    pub bg_tsp: Tsp,
    pub bg_tcw: Tcw,
    pub bg_depth: f32,
    pub pt_alpha_ref: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextCmd {
    pub regs: ContextRegs,
    pub bg_vertices: Vec<u8>,
    pub params: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TraceCmd {
    Texture(TextureCmd),
    Context(ContextCmd),
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        data.get(offset..offset + 4)?.try_into().ok()?,
    ))
}

#[derive(Default)]
pub struct TraceWriter {
    out: Vec<u8>,
}

impl TraceWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_cmd(&mut self, ty: u32) -> usize {
        let start = self.out.len();
        push_u32(&mut self.out, ty);
        push_u32(&mut self.out, 0); // size, patched by end_cmd
        start
    }

    fn end_cmd(&mut self, start: usize) {
        let size = (self.out.len() - start) as u32;
        self.out[start + 4..start + 8].copy_from_slice(&size.to_le_bytes());
    }

    pub fn write_texture(&mut self, tsp: Tsp, tcw: Tcw, palette: &[u8], texture: &[u8]) {
        let start = self.begin_cmd(TRACE_CMD_TEXTURE);
        push_u32(&mut self.out, tsp.0);
        push_u32(&mut self.out, tcw.0);
        push_u32(&mut self.out, palette.len() as u32);
        push_u32(&mut self.out, texture.len() as u32);
        self.out.extend_from_slice(palette);
        self.out.extend_from_slice(texture);
        self.end_cmd(start);
    }

    pub fn write_context(&mut self, regs: &ContextRegs, bg_vertices: &[u8], params: &[u8]) {
        let start = self.begin_cmd(TRACE_CMD_CONTEXT);
        push_u32(&mut self.out, regs.autosort as u32);
        push_u32(&mut self.out, regs.stride);
        push_u32(&mut self.out, regs.pal_pxl_format);
        push_u32(&mut self.out, regs.video_width);
        push_u32(&mut self.out, regs.video_height);
        push_u32(&mut self.out, regs.bg_isp.0);
        push_u32(&mut self.out, regs.bg_tsp.0);
        push_u32(&mut self.out, regs.bg_tcw.0);
        push_u32(&mut self.out, regs.bg_depth.to_bits());
        push_u32(&mut self.out, regs.pt_alpha_ref);
        push_u32(&mut self.out, bg_vertices.len() as u32);
        push_u32(&mut self.out, params.len() as u32);
        self.out.extend_from_slice(bg_vertices);
        self.out.extend_from_slice(params);
        self.end_cmd(start);
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }

    pub fn bytes(&self) -> &[u8] {
        &self.out
    }
}

/// Parse a complete trace byte stream.
pub fn parse_trace(data: &[u8]) -> Result<Vec<TraceCmd>, TraceError> {
    let mut cmds = Vec::new();
    let mut offset = 0usize;

    while offset < data.len() {
        let ty = read_u32(data, offset).ok_or(TraceError::Truncated(offset))?;
        let size = read_u32(data, offset + 4).ok_or(TraceError::Truncated(offset))? as usize;
        if size < HEADER_SIZE || offset + size > data.len() {
            return Err(TraceError::BadSize {
                offset,
                size: size as u32,
            });
        }
        let payload = &data[offset + HEADER_SIZE..offset + size];

        match ty {
            TRACE_CMD_TEXTURE => {
                let tsp = read_u32(payload, 0).ok_or(TraceError::Truncated(offset))?;
                let tcw = read_u32(payload, 4).ok_or(TraceError::Truncated(offset))?;
                let palette_size =
                    read_u32(payload, 8).ok_or(TraceError::Truncated(offset))? as usize;
                let texture_size =
                    read_u32(payload, 12).ok_or(TraceError::Truncated(offset))? as usize;
                let bytes = payload
                    .get(16..16 + palette_size + texture_size)
                    .ok_or(TraceError::Truncated(offset))?;
                cmds.push(TraceCmd::Texture(TextureCmd {
                    tsp: Tsp(tsp),
                    tcw: Tcw(tcw),
                    palette: bytes[..palette_size].to_vec(),
                    texture: bytes[palette_size..].to_vec(),
                }));
            }

            TRACE_CMD_CONTEXT => {
                let word = |i: usize| read_u32(payload, i * 4).ok_or(TraceError::Truncated(offset));
                let regs = ContextRegs {
                    autosort: word(0)? != 0,
                    stride: word(1)?,
                    pal_pxl_format: word(2)?,
                    video_width: word(3)?,
                    video_height: word(4)?,
                    bg_isp: IspTsp(word(5)?),
                    bg_tsp: Tsp(word(6)?),
                    bg_tcw: Tcw(word(7)?),
                    bg_depth: f32::from_bits(word(8)?),
                    pt_alpha_ref: word(9)?,
                };
                let bg_size = word(10)? as usize;
                let params_size = word(11)? as usize;
                let bytes = payload
                    .get(48..48 + bg_size + params_size)
                    .ok_or(TraceError::Truncated(offset))?;
                cmds.push(TraceCmd::Context(ContextCmd {
                    regs,
                    bg_vertices: bytes[..bg_size].to_vec(),
                    params: bytes[bg_size..].to_vec(),
                }));
            }

            other => return Err(TraceError::UnknownCommand(other)),
        }

        offset += size;
    }

    Ok(cmds)
}
