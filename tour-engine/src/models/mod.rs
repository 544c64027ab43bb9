pub mod flags;
pub mod screen;
pub mod step;
