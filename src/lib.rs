//! Reading, patching and self-linking of GameCube/Wii REL modules.

pub mod address;
pub mod cli;
pub mod codec;
pub mod error;
pub mod header;
pub mod linker;
pub mod logging;
pub mod module;
pub mod relocation;
pub mod scanner;
pub mod store;

pub use error::{RelError, Result};
pub use linker::{apply_self_relocations, link_bytes, link_to_file, LinkStats};
pub use module::{ModuleOptions, RelModule};
pub use scanner::PointerMatch;
pub use store::{open_store, ByteStore};
