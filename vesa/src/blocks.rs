//! Layout of the structures returned by VBE functions 00h and 01h.

use core::mem;

use crate::{Result, VesaError};

/// Size of the buffer filled by VBE function 00h.
pub const VBE_INFO_SIZE: usize = 512;
/// Size of the buffer filled by VBE function 01h.
pub const MODE_INFO_SIZE: usize = 256;

#[repr(C, packed)]
#[derive(Copy, Clone)]
#[allow(dead_code)]
struct RawVbeInfoBlock {
    signature: [u8; 4],
    version: u16,
    oem_string_ptr: u32,
    capabilities: u32,
    video_mode_ptr: u32,
    /// In units of 64 KiB.
    total_memory: u16,
    oem_software_rev: u16,
    oem_vendor_name_ptr: u32,
    oem_product_name_ptr: u32,
    oem_product_rev_ptr: u32,
    reserved: [u8; 222],
    oem_data: [u8; 256],
}

assert_eq_size!(RawVbeInfoBlock, [u8; VBE_INFO_SIZE]);

#[repr(C, packed)]
#[derive(Copy, Clone)]
#[allow(dead_code)]
struct RawModeInfoBlock {
    mode_attributes: u16,
    win_a_attributes: u8,
    win_b_attributes: u8,
    win_granularity: u16,
    win_size: u16,
    win_a_segment: u16,
    win_b_segment: u16,
    win_func_ptr: u32,
    bytes_per_scan_line: u16,
    x_resolution: u16,
    y_resolution: u16,
    x_char_size: u8,
    y_char_size: u8,
    number_of_planes: u8,
    bits_per_pixel: u8,
    number_of_banks: u8,
    memory_model: u8,
    bank_size: u8,
    number_of_image_pages: u8,
    reserved1: u8,
    direct_color: [u8; 9],
    phys_base_ptr: u32,
    off_screen_mem_offset: u32,
    off_screen_mem_size: u16,
    reserved2: [u8; 206],
}

assert_eq_size!(RawModeInfoBlock, [u8; MODE_INFO_SIZE]);

/// Read a `T` from the start of `bytes`, which the BIOS filled without caring about alignment.
fn read_block<T: Copy>(bytes: &[u8]) -> Result<T> {
    let expected = mem::size_of::<T>();
    if bytes.len() < expected {
        return Err(VesaError::Truncated { expected, actual: bytes.len() });
    }
    Ok(unsafe { (bytes.as_ptr() as *const T).read_unaligned() })
}

bitflags! {
    /// Attributes of a video mode.
    pub struct ModeAttributes : u16 {
        const SUPPORTED    = 1 << 0;
        const TTY_OUTPUT   = 1 << 2;
        const COLOR        = 1 << 3;
        const GRAPHICS     = 1 << 4;
        const NOT_VGA      = 1 << 5;
        const NO_WINDOWED  = 1 << 6;
        const LINEAR_FB    = 1 << 7;
    }
}

/// Controller information as reported by VBE function 00h.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct VbeInfo {
    signature: [u8; 4],
    version: u16,
    total_memory: u16,
}

impl VbeInfo {
    pub const SIGNATURE: &'static [u8; 4] = b"VESA";

    pub fn parse(bytes: &[u8]) -> Result<VbeInfo> {
        let raw: RawVbeInfoBlock = read_block(bytes)?;
        Ok(VbeInfo {
            signature: raw.signature,
            version: raw.version,
            total_memory: raw.total_memory,
        })
    }

    pub fn is_valid(&self) -> bool {
        &self.signature == Self::SIGNATURE
    }

    /// BCD encoded major and minor version.
    pub fn version(&self) -> (u8, u8) {
        ((self.version >> 8) as u8, self.version as u8)
    }

    /// Installed video memory in bytes.
    pub fn vram_size(&self) -> u32 {
        (self.total_memory as u32) << 16
    }
}

/// The parts of a mode descriptor returned by VBE function 01h that we care about.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct ModeInfo {
    pub attributes: ModeAttributes,
    pub width: u16,
    pub height: u16,
    pub bits_per_pixel: u8,
    /// Physical address of the linear frame buffer, zero if there is none.
    pub phys_base: u32,
}

impl ModeInfo {
    pub fn parse(bytes: &[u8]) -> Result<ModeInfo> {
        let raw: RawModeInfoBlock = read_block(bytes)?;
        Ok(ModeInfo {
            attributes: ModeAttributes::from_bits_truncate(raw.mode_attributes),
            width: raw.x_resolution,
            height: raw.y_resolution,
            bits_per_pixel: raw.bits_per_pixel,
            phys_base: raw.phys_base_ptr,
        })
    }

    pub fn has_lfb(&self) -> bool {
        self.attributes.contains(ModeAttributes::LINEAR_FB) && self.phys_base != 0
    }

    pub fn lfb_address(&self) -> Option<u32> {
        if self.has_lfb() {
            Some(self.phys_base)
        } else {
            None
        }
    }
}
