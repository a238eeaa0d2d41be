use bytemuck::{Pod, Zeroable};

/// Window dimensions as shader-ready floats.
#[repr(C)]
#[derive(Pod, Zeroable, Clone, Copy, Debug)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn of(size: winit::dpi::PhysicalSize<u32>) -> Self {
        Size {
            width: size.width as f32,
            height: size.height as f32,
        }
    }
}
