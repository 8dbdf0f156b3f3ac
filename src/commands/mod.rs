pub mod graph;
pub mod makefile;
pub mod status;
pub mod sync;
