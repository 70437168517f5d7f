pub mod frame;
pub mod stream;
