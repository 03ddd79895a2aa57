pub mod prescribed;

pub use prescribed::{prescribed_aif_from_reader, prescribed_aif_from_str, read_prescribed_aif};
