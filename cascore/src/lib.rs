pub mod error;
pub mod config;

// layout module
pub mod layout {
    pub mod pad;
    pub mod tof;
}

// algorithm module
pub mod algorithm {
    pub mod guess;
    pub mod sinus_fit;
}

// data module
pub mod data {
    pub mod histogram;
}
