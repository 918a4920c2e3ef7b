//! MAX1464 programming protocol implementation.

pub mod config;
pub mod constants;
pub mod device;
pub mod flashing;
pub mod format;
pub mod protocol;
pub mod registers;
pub mod transport;

pub use self::device::Max1464;
pub use self::format::{HexLineError, HexRecord};
pub use self::protocol::{Command, CpuPort, InterfaceMode, Irsa, ModuleRegister, Partition};
pub use self::transport::Transport;
