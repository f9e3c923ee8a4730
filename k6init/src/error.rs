use chipset::ChipsetError;
use k6::{CpuError, MtrrError};
use pci::PciError;
use thiserror::Error;

use crate::params::ParamError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("command line: {0}")]
    Params(#[from] ParamError),
    #[error("{0}")]
    Cpu(#[from] CpuError),
    #[error("{0}")]
    Mtrr(#[from] MtrrError),
    #[error("{0}")]
    Chipset(#[from] ChipsetError),
    #[error("PCI access failed: {0}")]
    Pci(#[from] PciError),
    #[error("{0} not supported on this processor")]
    Unsupported(&'static str),
    #[error("unable to access the PCI bus")]
    BusInaccessible,
    #[error("some actions failed")]
    ActionsFailed,
    #[error("can't run in V86 mode")]
    V86Mode,
    #[error("cannot run on Windows")]
    Windows,
}

impl Error {
    /// Status handed back to the loader.
    pub fn exit_status(&self) -> i32 {
        match self {
            Error::Params(ParamError::NoArguments) => 1,
            _ => -1,
        }
    }
}
