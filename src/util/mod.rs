pub mod bss;
pub mod file;
pub mod folder;
pub mod map;
pub mod sizes;
