//! Serialization of weft `gpu.module`s to device binaries.
//!
//! Each module is translated to a lowered, LLVM-style IR ([`llvm`]),
//! linked against the device library, optimized, emitted as PTX and
//! assembled by an external `ptxas`. The resulting blob is attached to
//! the module as the `gpu.binary` attribute.

pub mod assembler;
pub mod emit;
pub mod errors;
pub mod llvm;
pub mod lower;
pub mod optimize;
pub mod options;
pub mod serialize;
pub mod target;
pub mod translate;

pub use errors::{SerializeError, SerializeErrorKind, SerializeResult};
pub use options::SerializeOptions;
pub use serialize::SerializeToCubin;
