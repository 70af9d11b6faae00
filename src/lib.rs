pub mod checkpoint;
pub mod config;
pub mod gf2;
pub mod memory;
pub mod paged;
pub mod progress;
pub mod puddle;
pub mod sieve;
pub mod store;
