pub mod archive;
pub mod chunk;
pub mod descriptor;
pub mod sparse;
