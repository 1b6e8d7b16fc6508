// Vertex data and GPU buffers for the quad
//
// The quad is four interleaved position + color vertices drawn as two
// triangles through a six-entry index buffer.

use std::mem::{offset_of, size_of};

use anyhow::{Context, Result};
use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::driver::{BufferTarget, GlDriver};
use super::program::Program;

/// Attribute bound by name in the vertex shader
pub const POSITION_ATTRIB: &str = "position";
/// Attribute bound by `layout (location = 1)` in the vertex shader
pub const COLOR_LOCATION: u32 = 1;

/// Interleaved vertex: position then color
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexPosColor {
    pub position: Vec3,
    pub color: Vec3,
}

impl VertexPosColor {
    pub const fn new(position: Vec3, color: Vec3) -> Self {
        Self { position, color }
    }
}

pub const QUAD_VERTICES: [VertexPosColor; 4] = [
    VertexPosColor::new(Vec3::new(-0.5, 0.5, 0.5), Vec3::new(1.0, 0.0, 0.0)), // top-left, red
    VertexPosColor::new(Vec3::new(0.5, 0.5, 0.5), Vec3::new(0.0, 1.0, 0.0)),  // top-right, green
    VertexPosColor::new(Vec3::new(0.5, -0.5, 0.5), Vec3::new(0.0, 0.0, 1.0)), // bottom-right, blue
    VertexPosColor::new(Vec3::new(-0.5, -0.5, 0.5), Vec3::new(1.0, 1.0, 1.0)), // bottom-left, white
];

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Vertex array + vertex buffer + index buffer for the static quad
pub struct QuadMesh<D: GlDriver> {
    vertex_array: D::VertexArray,
    vertex_buffer: D::Buffer,
    index_buffer: D::Buffer,
    index_count: i32,
}

impl<D: GlDriver> QuadMesh<D> {
    /// Upload the quad and wire its attributes against `program`.
    pub fn upload(driver: &D, program: &Program<D>) -> Result<Self> {
        let vertex_array = driver
            .create_vertex_array()
            .map_err(anyhow::Error::msg)
            .context("Failed to create vertex array")?;
        driver.bind_vertex_array(Some(vertex_array));

        let (vertex_buffer, index_buffer) = match create_buffer_pair(driver) {
            Ok(buffers) => buffers,
            Err(e) => {
                driver.bind_vertex_array(None);
                driver.delete_vertex_array(vertex_array);
                return Err(e);
            }
        };
        driver.upload_buffer(BufferTarget::Vertex, vertex_buffer, bytemuck::cast_slice(&QUAD_VERTICES));
        driver.upload_buffer(BufferTarget::Index, index_buffer, bytemuck::cast_slice(&QUAD_INDICES));

        let stride = size_of::<VertexPosColor>() as i32;

        // Position by name; a broken or optimised-out program may not have it
        match program.attrib_location(driver, POSITION_ATTRIB) {
            Some(index) => {
                driver.vertex_attrib_f32(index, 3, stride, offset_of!(VertexPosColor, position) as i32)
            }
            None => log::warn!("Program has no active '{}' attribute", POSITION_ATTRIB),
        }

        // Color by layout location
        driver.vertex_attrib_f32(COLOR_LOCATION, 3, stride, offset_of!(VertexPosColor, color) as i32);

        driver.bind_vertex_array(None);

        log::info!(
            "Uploaded quad: {} vertices ({} bytes), {} indices",
            QUAD_VERTICES.len(),
            size_of::<[VertexPosColor; 4]>(),
            QUAD_INDICES.len()
        );

        Ok(Self {
            vertex_array,
            vertex_buffer,
            index_buffer,
            index_count: QUAD_INDICES.len() as i32,
        })
    }

    pub fn draw(&self, driver: &D) {
        driver.bind_vertex_array(Some(self.vertex_array));
        driver.draw_indexed_triangles(self.index_count);
    }

    pub fn delete(self, driver: &D) {
        driver.delete_buffer(self.index_buffer);
        driver.delete_buffer(self.vertex_buffer);
        driver.delete_vertex_array(self.vertex_array);
    }
}

/// One frame's GL work: clear, bind the program, draw the quad.
pub fn draw_frame<D: GlDriver>(driver: &D, clear_color: [f32; 4], program: &Program<D>, mesh: &QuadMesh<D>) {
    driver.clear(clear_color);
    program.bind(driver);
    mesh.draw(driver);
}

/// Vertex + index buffer; the first is released again if the second fails.
fn create_buffer_pair<D: GlDriver>(driver: &D) -> Result<(D::Buffer, D::Buffer)> {
    let vertex_buffer = driver
        .create_buffer()
        .map_err(anyhow::Error::msg)
        .context("Failed to create vertex buffer")?;

    match driver.create_buffer() {
        Ok(index_buffer) => Ok((vertex_buffer, index_buffer)),
        Err(e) => {
            driver.delete_buffer(vertex_buffer);
            Err(anyhow::Error::msg(e).context("Failed to create index buffer"))
        }
    }
}
