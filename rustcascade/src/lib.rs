// src/lib.rs
pub mod data {
    pub mod raw;
    pub mod pad;
    pub mod tof;
    pub mod loader;
    pub mod contrast;
}
