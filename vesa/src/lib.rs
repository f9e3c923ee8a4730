//! VESA BIOS Extensions data.
//!
//! The BIOS can only be called from real mode, so the loader queries the controller
//! information and every mode descriptor before handing over and passes the raw
//! blocks along. This crate decodes them and exposes them through [`VesaBios`].

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;
#[macro_use]
extern crate static_assertions;

mod blocks;

pub use self::blocks::*;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, VesaError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VesaError {
    #[error("VBE block truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("no VESA mode with index {0}")]
    NoSuchMode(usize),
}

/// Read access to the VESA BIOS of the primary display adapter.
pub trait VesaBios {
    /// Controller information, `None` if the BIOS did not answer.
    fn info(&self) -> Option<&VbeInfo>;

    fn mode_count(&self) -> usize;

    fn mode_info(&self, index: usize) -> Result<ModeInfo>;

    fn is_valid(&self) -> bool {
        self.info().map_or(false, VbeInfo::is_valid)
    }

    /// Installed video memory in bytes, zero without a valid BIOS.
    fn vram_size(&self) -> u32 {
        match self.info() {
            Some(info) if info.is_valid() => info.vram_size(),
            _ => 0,
        }
    }
}

/// [`VesaBios`] over blocks captured by the real mode loader: one controller
/// information block and the mode descriptors back to back.
#[derive(Clone, Debug)]
pub struct CapturedBios<'a> {
    info: Option<VbeInfo>,
    modes: &'a [u8],
}

impl<'a> CapturedBios<'a> {
    /// An empty `info_block` means the BIOS call failed.
    pub fn new(info_block: &[u8], mode_blocks: &'a [u8]) -> CapturedBios<'a> {
        let info = if info_block.is_empty() {
            None
        } else {
            match VbeInfo::parse(info_block) {
                Ok(info) => Some(info),
                Err(err) => {
                    warn!("[vesa] ignoring controller information: {}", err);
                    None
                }
            }
        };

        if mode_blocks.len() % MODE_INFO_SIZE != 0 {
            warn!("[vesa] {} trailing bytes after the mode descriptors", mode_blocks.len() % MODE_INFO_SIZE);
        }

        CapturedBios { info, modes: mode_blocks }
    }

    /// A machine without a VESA BIOS.
    pub fn absent() -> CapturedBios<'static> {
        CapturedBios { info: None, modes: &[] }
    }
}

impl<'a> VesaBios for CapturedBios<'a> {
    fn info(&self) -> Option<&VbeInfo> {
        self.info.as_ref()
    }

    fn mode_count(&self) -> usize {
        if self.is_valid() {
            self.modes.len() / MODE_INFO_SIZE
        } else {
            0
        }
    }

    fn mode_info(&self, index: usize) -> Result<ModeInfo> {
        if index >= self.mode_count() {
            return Err(VesaError::NoSuchMode(index));
        }
        let start = index * MODE_INFO_SIZE;
        ModeInfo::parse(&self.modes[start..start + MODE_INFO_SIZE])
    }
}
