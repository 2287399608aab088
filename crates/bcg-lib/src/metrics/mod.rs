pub mod agreement;
pub mod rate;
