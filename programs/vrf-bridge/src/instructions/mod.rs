#![allow(ambiguous_glob_reexports)]

pub mod initialize;
pub mod reconfigure;
pub mod bind_coordinator;
pub mod request_randomness;
pub mod fulfill_random_words;

pub use initialize::*;
pub use reconfigure::*;
pub use bind_coordinator::*;
pub use request_randomness::*;
pub use fulfill_random_words::*;
