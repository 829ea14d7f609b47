mod builder;
mod file;
mod info;
mod source;

pub use builder::*;
pub use file::*;
pub use info::*;
pub use source::*;
